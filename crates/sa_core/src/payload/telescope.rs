//! Space telescope: RCS pointing, sight computation, discovery reporting,
//! and sight pushes to the controller.

use crate::ids::{ComponentTypeId, ObjectId};
use crate::math::shortest_delta_deg;
use crate::outbox::Audience;
use crate::payload::{kinds, pay_out, PayloadBehavior};
use crate::upgrades;
use crate::vessel::{Vessel, VesselCtx};
use crate::wire;

#[derive(Debug, Default)]
pub struct SpaceTelescope;

impl PayloadBehavior for SpaceTelescope {
    fn payload_id(&self) -> ComponentTypeId {
        kinds::SPACE_TELESCOPE
    }

    fn on_attach(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx) {
        vessel.apply_stats(ctx.catalog);
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 {
            return;
        }
        if !ctx.dir.agencies.contains_key(&vessel.agency) {
            return;
        }

        let seconds = ctx.tuning.real_seconds(dt);
        let global = ctx.tuning.global_cash_multiplier;
        let regional = vessel.planet_income_multiplier(ctx.dir);

        // (1) Base income. RESOLUTION1's additive is already folded into the
        // stats snapshot.
        let payout = vessel.stats.income_base * global * regional * seconds;
        pay_out(vessel, ctx, payout);

        // (2) RCS pointing toward the target angle, fuel-free and rate-bound.
        let current_aim = -vessel.rotation_deg;
        let delta = shortest_delta_deg(current_aim, vessel.telescope_target_deg);
        if delta.abs() > 1e-6 {
            let max_step = vessel.stats.telescope_max_rate_deg_s * seconds;
            let step = delta.clamp(-max_step, max_step);
            vessel.rotation_deg -= step;
        }

        // (3) Sight list: non-moon planets within range whose bearing lies
        // inside the (upgrade-expanded) field of view. The boundary counts.
        let half_fov = (vessel.stats.telescope_fov_deg * 0.5).max(0.0);
        let range_km = vessel.stats.telescope_range_km;
        let aim_deg = -vessel.rotation_deg;

        vessel.sight.clear();
        for planet in ctx.bodies.planets().filter(|p| !p.is_moon) {
            let diff = planet.position - vessel.position;
            if diff.length() > range_km {
                continue;
            }
            let bearing = diff.y.atan2(diff.x).to_degrees();
            if shortest_delta_deg(aim_deg, bearing).abs() <= half_fov {
                vessel.sight.push(planet.id);
            }
        }

        if vessel.sight.is_empty() {
            vessel.throttles.last_sight = None;
            vessel.throttles.sight_s = 0.0;
            return;
        }

        // (3b) Discovery is idempotent per agency.
        if let Some(agency) = ctx.dir.agencies.get_mut(&vessel.agency) {
            for id in &vessel.sight {
                agency.discover_planet(*id);
            }
        }

        // (4) PLANET_IMAGE pays per target currently in sight.
        if vessel.has_upgrade(upgrades::PLANET_IMAGE) {
            let n = vessel.sight.len() as f64;
            pay_out(vessel, ctx, 100.0 * n * global * regional * seconds);
        }

        // (5) Push to the controller on change, at most ~4 Hz.
        if vessel.is_controlled() {
            vessel.throttles.sight_s += seconds;
            let mut ids: Vec<ObjectId> = vessel.sight.clone();
            ids.sort();
            let changed = vessel.throttles.last_sight.as_ref() != Some(&ids);
            if changed || vessel.throttles.sight_s >= 0.25 {
                vessel.throttles.sight_s = 0.0;
                let frame = wire::telescope_sight(
                    vessel.id,
                    vessel.stats.telescope_fov_deg as f32,
                    &ids,
                );
                ctx.outbox
                    .datagram(Audience::Player(vessel.controlled_by), frame);
                vessel.throttles.last_sight = Some(ids);
            }
        } else {
            vessel.throttles.last_sight = None;
            vessel.throttles.sight_s = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};
    use crate::wire::Datagram;

    fn aim_at(vessel: &mut Vessel, bearing_deg: f64) {
        vessel.rotation_deg = -bearing_deg;
        vessel.telescope_target_deg = bearing_deg;
    }

    #[test]
    fn sights_planet_dead_ahead_and_discovers_it() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_telescope(&catalog);

        // Earth sits along +x from the vessel fixture position.
        let earth = parts.bodies.get(test_fixtures::EARTH).unwrap();
        let bearing = {
            let d = earth.position - vessel.position;
            d.y.atan2(d.x).to_degrees()
        };
        aim_at(&mut vessel, bearing);

        let mut ctx = make_ctx(&catalog, &mut parts);
        SpaceTelescope.on_tick(&mut vessel, &mut ctx, 1.0);

        assert!(vessel.sight.contains(&test_fixtures::EARTH));
        assert!(parts.dir.agencies[&test_fixtures::AGENCY]
            .discovered_planets
            .contains(&test_fixtures::EARTH));
    }

    #[test]
    fn bearing_exactly_at_half_fov_is_included() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_telescope(&catalog);

        let earth = parts.bodies.get(test_fixtures::EARTH).unwrap();
        let bearing = {
            let d = earth.position - vessel.position;
            d.y.atan2(d.x).to_degrees()
        };
        // Point exactly half the FOV away from the planet.
        let half_fov = vessel.stats.telescope_fov_deg * 0.5;
        aim_at(&mut vessel, bearing + half_fov);

        let mut ctx = make_ctx(&catalog, &mut parts);
        SpaceTelescope.on_tick(&mut vessel, &mut ctx, 1.0);
        assert!(
            vessel.sight.contains(&test_fixtures::EARTH),
            "the FOV boundary is inclusive"
        );
    }

    #[test]
    fn moons_are_never_sighted() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_telescope(&catalog);

        let moon = parts.bodies.get(test_fixtures::MOON).unwrap();
        let bearing = {
            let d = moon.position - vessel.position;
            d.y.atan2(d.x).to_degrees()
        };
        aim_at(&mut vessel, bearing);

        let mut ctx = make_ctx(&catalog, &mut parts);
        SpaceTelescope.on_tick(&mut vessel, &mut ctx, 1.0);
        assert!(!vessel.sight.contains(&test_fixtures::MOON));
    }

    #[test]
    fn rcs_slews_toward_target_at_bounded_rate() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_telescope(&catalog);
        vessel.rotation_deg = 0.0;
        vessel.telescope_target_deg = 90.0;

        let rate = vessel.stats.telescope_max_rate_deg_s;
        let mut ctx = make_ctx(&catalog, &mut parts);
        SpaceTelescope.on_tick(&mut vessel, &mut ctx, 1.0);
        let aim = -vessel.rotation_deg;
        assert!((aim - rate).abs() < 1e-6, "one second slews {rate}°, got {aim}");
    }

    #[test]
    fn controlled_sight_push_is_throttled_but_sent_on_change() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_telescope(&catalog);
        vessel.controlled_by = test_fixtures::PLAYER;

        let earth = parts.bodies.get(test_fixtures::EARTH).unwrap();
        let bearing = {
            let d = earth.position - vessel.position;
            d.y.atan2(d.x).to_degrees()
        };
        aim_at(&mut vessel, bearing);

        // First tick pushes (change from None).
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            SpaceTelescope.on_tick(&mut vessel, &mut ctx, 0.01);
        }
        let pushes = parts
            .outbox
            .frames()
            .iter()
            .filter(|f| f.bytes.first() == Some(&(Datagram::TelescopeSight as u8)))
            .count();
        assert_eq!(pushes, 1);

        // Unchanged sight within the throttle window: no second push.
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            SpaceTelescope.on_tick(&mut vessel, &mut ctx, 0.01);
        }
        let pushes = parts
            .outbox
            .frames()
            .iter()
            .filter(|f| f.bytes.first() == Some(&(Datagram::TelescopeSight as u8)))
            .count();
        assert_eq!(pushes, 1, "unchanged sight must be throttled");
    }
}
