//! Per-payload upgrade trees.
//!
//! Each payload kind has a fixed tree; a vessel keeps one unlocked set per
//! payload id, so swapping the payload swaps the active set. Tier gates come
//! from agency attributes at unlock time (see `Vessel::unlockable_upgrades`).

use crate::ids::UpgradeId;

pub const PING1: UpgradeId = UpgradeId(0x0000);
pub const PING2: UpgradeId = UpgradeId(0x0001);
pub const NETWORKING1: UpgradeId = UpgradeId(0x0002);
pub const NETWORKING2: UpgradeId = UpgradeId(0x0003);
pub const EXPOSURE1: UpgradeId = UpgradeId(0x0004);
pub const FOCUS1: UpgradeId = UpgradeId(0x0005);
pub const RESOLUTION1: UpgradeId = UpgradeId(0x0006);
pub const ZOOM1: UpgradeId = UpgradeId(0x0007);
pub const FOCUS2: UpgradeId = UpgradeId(0x0008);
pub const PLANET_IMAGE: UpgradeId = UpgradeId(0x0009);
pub const FLYBY1: UpgradeId = UpgradeId(0x000A);
pub const FLYBY2: UpgradeId = UpgradeId(0x000B);
pub const PERIJOVE: UpgradeId = UpgradeId(0x000C);
pub const AACS: UpgradeId = UpgradeId(0x000D);
pub const ZOOM2: UpgradeId = UpgradeId(0x000E);

#[derive(Debug, Clone, Copy)]
pub struct UpgradeNode {
    pub id: UpgradeId,
    pub tier: u32,
    pub requires: &'static [UpgradeId],
    pub cost_money: i64,
}

const COMMS_TREE: &[UpgradeNode] = &[
    UpgradeNode {
        id: PING1,
        tier: 1,
        requires: &[],
        cost_money: 5_000,
    },
    UpgradeNode {
        id: NETWORKING1,
        tier: 1,
        requires: &[],
        cost_money: 15_000,
    },
    UpgradeNode {
        id: PING2,
        tier: 2,
        requires: &[PING1],
        cost_money: 20_000,
    },
    UpgradeNode {
        id: NETWORKING2,
        tier: 2,
        requires: &[NETWORKING1],
        cost_money: 45_000,
    },
];

const TELESCOPE_TREE: &[UpgradeNode] = &[
    UpgradeNode {
        id: EXPOSURE1,
        tier: 1,
        requires: &[],
        cost_money: 15_000,
    },
    UpgradeNode {
        id: FOCUS1,
        tier: 1,
        requires: &[],
        cost_money: 20_000,
    },
    UpgradeNode {
        id: RESOLUTION1,
        tier: 1,
        requires: &[],
        cost_money: 25_000,
    },
    UpgradeNode {
        id: ZOOM1,
        tier: 1,
        requires: &[EXPOSURE1],
        cost_money: 75_000,
    },
    UpgradeNode {
        id: ZOOM2,
        tier: 2,
        requires: &[ZOOM1],
        cost_money: 150_000,
    },
    UpgradeNode {
        id: FOCUS2,
        tier: 1,
        requires: &[FOCUS1],
        cost_money: 35_000,
    },
    UpgradeNode {
        id: PLANET_IMAGE,
        tier: 1,
        requires: &[RESOLUTION1],
        cost_money: 55_000,
    },
];

const PROBE_TREE: &[UpgradeNode] = &[
    UpgradeNode {
        id: FLYBY1,
        tier: 1,
        requires: &[],
        cost_money: 10_000,
    },
    UpgradeNode {
        id: FLYBY2,
        tier: 2,
        requires: &[FLYBY1],
        cost_money: 30_000,
    },
    UpgradeNode {
        id: PERIJOVE,
        tier: 1,
        requires: &[],
        cost_money: 100_000,
    },
    UpgradeNode {
        id: AACS,
        tier: 1,
        requires: &[],
        cost_money: 125_000,
    },
];

/// The upgrade tree for a payload kind; empty for payloads without one.
pub fn tree_for_payload(payload: crate::ids::ComponentTypeId) -> &'static [UpgradeNode] {
    use crate::payload::kinds;
    match payload {
        kinds::COMMS_SATELLITE => COMMS_TREE,
        kinds::SPACE_TELESCOPE => TELESCOPE_TREE,
        kinds::PROBE => PROBE_TREE,
        _ => &[],
    }
}

pub fn node(payload: crate::ids::ComponentTypeId, id: UpgradeId) -> Option<&'static UpgradeNode> {
    tree_for_payload(payload).iter().find(|n| n.id == id)
}
