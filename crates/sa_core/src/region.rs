//! Discrete region tags driving client-side audio cues.

use serde::{Deserialize, Serialize};

/// Region identifier as carried on the wire. 0 is the undefined region.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegionId(pub u16);

pub const REGION_UNDEFINED: RegionId = RegionId(0);

/// Well-known region ids used by world genesis. Content may define more.
pub mod known {
    use super::RegionId;

    pub const EARTH_CLOSE: RegionId = RegionId(1);
    pub const EARTH_NEAR: RegionId = RegionId(2);
    pub const EARTH_DISTANT: RegionId = RegionId(3);
    pub const MOON_NEAR: RegionId = RegionId(4);
    pub const SPACE: RegionId = RegionId(5);
    pub const MARS_CLOSE: RegionId = RegionId(6);
    pub const MARS_NEAR: RegionId = RegionId(7);
    pub const MARS_DISTANT: RegionId = RegionId(8);
    pub const VENUS_CLOSE: RegionId = RegionId(9);
    pub const VENUS_NEAR: RegionId = RegionId(10);
    pub const VENUS_DISTANT: RegionId = RegionId(11);
    pub const MERCURY_CLOSE: RegionId = RegionId(12);
    pub const MERCURY_NEAR: RegionId = RegionId(13);
    pub const MERCURY_DISTANT: RegionId = RegionId(14);
    pub const ASTEROID_BELT: RegionId = RegionId(15);
    pub const JUPITER_CLOSE: RegionId = RegionId(16);
    pub const JUPITER_NEAR: RegionId = RegionId(17);
    pub const JUPITER_DISTANT: RegionId = RegionId(18);
    pub const SATURN_CLOSE: RegionId = RegionId(19);
    pub const SATURN_NEAR: RegionId = RegionId(20);
    pub const SATURN_DISTANT: RegionId = RegionId(21);
    pub const URANUS_CLOSE: RegionId = RegionId(22);
    pub const URANUS_NEAR: RegionId = RegionId(23);
    pub const URANUS_DISTANT: RegionId = RegionId(24);
    pub const NEPTUNE_CLOSE: RegionId = RegionId(25);
    pub const NEPTUNE_NEAR: RegionId = RegionId(26);
    pub const NEPTUNE_DISTANT: RegionId = RegionId(27);
    pub const TRANS_NEPTUNIAN: RegionId = RegionId(28);
    pub const KUIPER_BELT: RegionId = RegionId(29);
}
