//! Identifier newtypes.
//!
//! World entities carry monotonic u64 ids unique for the server lifetime;
//! the allocator lives on [`crate::World`] and its high-water mark is restored
//! from persisted state on load.

use serde::{Deserialize, Serialize};

macro_rules! u64_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! u16_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        pub struct $name(pub u16);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

u64_id!(ObjectId);
u64_id!(PlayerId);
u64_id!(AgencyId);

u16_id!(ComponentTypeId);
u16_id!(BuildingTypeId);
u16_id!(ResourceId);
u16_id!(UpgradeId);

/// Random, non-zero 32-bit astronaut identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AstronautId(pub u32);

impl std::fmt::Display for AstronautId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AstronautId {
    /// Draw a fresh non-zero id.
    pub fn generate(rng: &mut impl rand::Rng) -> Self {
        loop {
            let v: u32 = rng.gen();
            if v != 0 {
                return Self(v);
            }
        }
    }
}
