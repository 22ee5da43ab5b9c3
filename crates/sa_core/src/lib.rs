//! Authoritative world engine for the space-agency server.
//!
//! Pure simulation: no sockets, no filesystem, no async. The daemon owns the
//! lock and the wire; everything here mutates a [`World`] and pushes outbound
//! frames into an [`Outbox`] that the daemon drains after the tick.

pub mod agency;
pub mod astronaut;
pub mod body;
pub mod chunk;
pub mod chunk_manager;
pub mod content;
pub mod ids;
pub mod math;
pub mod object;
pub mod outbox;
pub mod payload;
pub mod player;
pub mod region;
pub mod upgrades;
pub mod vessel;
pub mod wire;
pub mod world;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use agency::{Agency, AgencyAttributes, Building, GamestateSnapshot};
pub use astronaut::Astronaut;
pub use body::{Body, BodyKind, OrbitLink, RegionBand};
pub use chunk::{BodySnap, Chunk, ChunkBodies, ChunkKey, ChunkTickReport, PeerVessel};
pub use chunk_manager::{ChunkManager, MapPoint};
pub use content::{
    BuildingDef, BuildingRole, ComponentAttributes, ComponentDef, ContentCatalog, LevelUnlocks,
    ResourceDef, ServerTuning, ThrusterAttrs,
};
pub use ids::{
    AgencyId, AstronautId, BuildingTypeId, ComponentTypeId, ObjectId, PlayerId, ResourceId,
    UpgradeId,
};
pub use math::Vec2;
pub use object::{Debris, GameObject};
pub use outbox::{Audience, Channel, Outbox, OutFrame};
pub use player::Player;
pub use region::RegionId;
pub use vessel::{
    AttachedComponent, ConstructError, ControlBit, ElectricalSystem, SystemKind, Vessel,
    VesselControl, VesselRequest,
};
pub use world::{ControlAux, Directory, RejectReason, World};

/// Gravitational constant in km³ / (kg · s²).
pub const G: f64 = 6.674e-20;

/// Speed of light in km/s. Vessel speed never exceeds this outside warp.
pub const C_KM_S: f64 = 299_792.458;

/// One astronomical unit in km.
pub const AU_KM: f64 = 149_597_870.7;
