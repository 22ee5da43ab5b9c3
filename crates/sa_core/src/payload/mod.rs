//! Payload behaviors.
//!
//! The stage-0 component defines what a vessel *does*. Each payload kind maps
//! to one strategy behind a narrow interface; an instance is created when the
//! vessel deploys to stage 0 (or on load) and carries only its own per-vessel
//! state, borrowing the vessel for the duration of each call.

mod comms;
mod crewed;
mod probe;
mod rover;
mod solar;
mod telescope;

pub use comms::CommsSatellite;
pub use crewed::Crewed;
pub use probe::Probe;
pub use rover::Rover;
pub use solar::SolarOrbiter;
pub use telescope::SpaceTelescope;

use crate::chunk::BodySnap;
use crate::ids::{ComponentTypeId, ObjectId};
use crate::vessel::{Vessel, VesselCtx};

/// Well-known payload component ids. World genesis and the content catalog
/// agree on these.
pub mod kinds {
    use crate::ids::ComponentTypeId;

    pub const COMMS_SATELLITE: ComponentTypeId = ComponentTypeId(10);
    pub const SPACE_TELESCOPE: ComponentTypeId = ComponentTypeId(11);
    pub const PROBE: ComponentTypeId = ComponentTypeId(12);
    pub const SOLAR_ORBITER: ComponentTypeId = ComponentTypeId(13);
    pub const LUNAR_LANDER: ComponentTypeId = ComponentTypeId(14);
    pub const SPACE_SHUTTLE: ComponentTypeId = ComponentTypeId(15);
    pub const ROVER: ComponentTypeId = ComponentTypeId(16);
}

pub trait PayloadBehavior: Send + std::fmt::Debug {
    /// The payload kind this instance was built for; a mismatch with the
    /// vessel's current payload retires the instance.
    fn payload_id(&self) -> ComponentTypeId;

    fn on_attach(&mut self, _vessel: &mut Vessel, _ctx: &mut VesselCtx) {}
    fn on_detach(&mut self, _vessel: &mut Vessel, _ctx: &mut VesselCtx) {}
    fn on_tick(&mut self, _vessel: &mut Vessel, _ctx: &mut VesselCtx, _dt: f64) {}
    fn on_land(
        &mut self,
        _vessel: &mut Vessel,
        _ctx: &mut VesselCtx,
        _body: &BodySnap,
        _prev_body: Option<ObjectId>,
    ) {
    }
    fn on_unland(&mut self, _vessel: &mut Vessel, _ctx: &mut VesselCtx, _body: &BodySnap) {}
}

/// A payload kind with no special behavior.
#[derive(Debug)]
pub struct InertPayload {
    payload: ComponentTypeId,
}

impl PayloadBehavior for InertPayload {
    fn payload_id(&self) -> ComponentTypeId {
        self.payload
    }
}

/// Behavior factory keyed by payload component id. `None` only for payload 0.
pub fn make_behavior(payload: ComponentTypeId) -> Option<Box<dyn PayloadBehavior>> {
    if payload.0 == 0 {
        return None;
    }
    Some(match payload {
        kinds::COMMS_SATELLITE => Box::new(CommsSatellite::default()),
        kinds::SPACE_TELESCOPE => Box::new(SpaceTelescope::default()),
        kinds::PROBE => Box::new(Probe::default()),
        kinds::SOLAR_ORBITER => Box::new(SolarOrbiter::default()),
        kinds::LUNAR_LANDER => Box::new(Crewed::new(kinds::LUNAR_LANDER)),
        kinds::SPACE_SHUTTLE => Box::new(Crewed::new(kinds::SPACE_SHUTTLE)),
        kinds::ROVER => Box::new(Rover::default()),
        other => Box::new(InertPayload { payload: other }),
    })
}

/// Distribute a fractional payout to the vessel's agency and credit the
/// vessel's lifetime revenue. Shared by every earning behavior.
pub(crate) fn pay_out(vessel: &mut Vessel, ctx: &mut VesselCtx, amount: f64) {
    if amount <= 0.0 {
        return;
    }
    let dir = &mut *ctx.dir;
    if let Some(agency) = dir.agencies.get_mut(&vessel.agency) {
        agency.distribute_fractional(amount, &mut dir.players);
    }
    vessel.credit_income(amount);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_matches_kinds() {
        let b = make_behavior(kinds::PROBE).unwrap();
        assert_eq!(b.payload_id(), kinds::PROBE);
        let b = make_behavior(kinds::SPACE_SHUTTLE).unwrap();
        assert_eq!(b.payload_id(), kinds::SPACE_SHUTTLE);
        assert!(make_behavior(ComponentTypeId(0)).is_none());
        // Unknown payloads get the inert behavior with their own id.
        let b = make_behavior(ComponentTypeId(999)).unwrap();
        assert_eq!(b.payload_id(), ComponentTypeId(999));
    }
}
