//! Probe: income per unique non-moon planet visited, with flyby, perijove,
//! and attitude-control multipliers.

use crate::ids::{ComponentTypeId, ObjectId};
use crate::math::shortest_delta_deg;
use crate::outbox::Audience;
use crate::payload::{kinds, pay_out, PayloadBehavior};
use crate::upgrades;
use crate::vessel::{Vessel, VesselCtx};
use crate::wire;

#[derive(Debug, Default)]
pub struct Probe {
    did_initial_inspect: bool,
}

impl Probe {
    /// Visit threshold in body radii: 4 by default, 6 with FLYBY1, 10 with
    /// FLYBY2 (which takes precedence).
    fn visit_threshold_radii(vessel: &Vessel) -> f64 {
        if vessel.has_upgrade(upgrades::FLYBY2) {
            10.0
        } else if vessel.has_upgrade(upgrades::FLYBY1) {
            6.0
        } else {
            4.0
        }
    }

    fn mark_visited(vessel: &mut Vessel, ctx: &mut VesselCtx, planet: ObjectId, name: &str) {
        if vessel.planets_visited.contains(&planet) {
            return;
        }
        vessel.planets_visited.push(planet);
        ctx.outbox.datagram(
            Audience::Agency(vessel.agency),
            wire::notification(wire::NOTIFY_SUCCESS, &format!("Probe inspected {name}.")),
        );
    }

    fn maybe_mark_visit(vessel: &mut Vessel, ctx: &mut VesselCtx) {
        let Some(source) = vessel.strongest_source else {
            return;
        };
        let Some(snap) = ctx.bodies.get(source).cloned() else {
            return;
        };
        if !snap.is_planet() {
            return;
        }

        // Close-approach discovery includes moons; the visit list does not.
        if let Some(agency) = ctx.dir.agencies.get_mut(&vessel.agency) {
            agency.discover_planet(snap.id);
        }
        if snap.is_moon {
            return;
        }
        if snap.radius_km <= 0.0 {
            return;
        }

        let dist = vessel.position.distance(snap.position);
        if dist > Self::visit_threshold_radii(vessel) * snap.radius_km {
            return;
        }
        Self::mark_visited(vessel, ctx, snap.id, &snap.name);
    }

    /// ×1.3 while within 4 R of a gas-giant strongest puller.
    fn perijove_multiplier(vessel: &Vessel, ctx: &VesselCtx) -> f64 {
        if !vessel.has_upgrade(upgrades::PERIJOVE) {
            return 1.0;
        }
        let Some(snap) = vessel.strongest_source.and_then(|id| ctx.bodies.get(id)) else {
            return 1.0;
        };
        if !snap.is_gas_giant || snap.radius_km <= 0.0 {
            return 1.0;
        }
        if vessel.position.distance(snap.position) <= 4.0 * snap.radius_km {
            1.3
        } else {
            1.0
        }
    }

    /// ×1.4 while pointing within 5° of the home planet.
    fn aacs_multiplier(vessel: &Vessel, ctx: &VesselCtx) -> f64 {
        if !vessel.has_upgrade(upgrades::AACS) {
            return 1.0;
        }
        let Some(home) = vessel.home_body.and_then(|id| ctx.bodies.get(id)) else {
            return 1.0;
        };
        let aim = -vessel.rotation_deg;
        let diff = home.position - vessel.position;
        let bearing = diff.y.atan2(diff.x).to_degrees();
        if shortest_delta_deg(aim, bearing).abs() <= 5.0 {
            1.4
        } else {
            1.0
        }
    }
}

impl PayloadBehavior for Probe {
    fn payload_id(&self) -> ComponentTypeId {
        kinds::PROBE
    }

    /// The home planet counts as visited the moment the probe deploys.
    fn on_attach(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx) {
        if self.did_initial_inspect {
            return;
        }
        self.did_initial_inspect = true;
        let home = vessel.home_body.or(vessel.launch_body);
        let Some(snap) = home.and_then(|id| ctx.bodies.get(id)).cloned() else {
            return;
        };
        if snap.is_planet() && !snap.is_moon {
            Self::mark_visited(vessel, ctx, snap.id, &snap.name);
        }
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 {
            return;
        }

        Self::maybe_mark_visit(vessel, ctx);

        if !ctx.dir.agencies.contains_key(&vessel.agency) {
            return;
        }
        let base = vessel.stats.income_base;
        if base <= 0.0 {
            return;
        }
        let visited: std::collections::BTreeSet<ObjectId> =
            vessel.planets_visited.iter().copied().collect();
        if visited.is_empty() {
            return;
        }

        let seconds = ctx.tuning.real_seconds(dt);
        let global = ctx.tuning.global_cash_multiplier;
        let regional = vessel.planet_income_multiplier(ctx.dir);
        let situational = Self::perijove_multiplier(vessel, ctx) * Self::aacs_multiplier(vessel, ctx);

        let payout = base * visited.len() as f64 * situational * global * regional * seconds;
        pay_out(vessel, ctx, payout);
    }
}
