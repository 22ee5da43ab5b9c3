//! Rover: periodic surface mining rolls and slow surface driving, all gated
//! by a single 10-second accumulator.

use rand::Rng;

use crate::ids::{ComponentTypeId, ResourceId};
use crate::math::wrap_deg;
use crate::outbox::Audience;
use crate::payload::{kinds, PayloadBehavior};
use crate::vessel::{Vessel, VesselCtx};
use crate::wire;

const ROLL_PERIOD_S: f64 = 10.0;
const MINING_ODDS_RANGE: u32 = 2000;

#[derive(Debug, Default)]
pub struct Rover {
    accum_s: f64,
    notified_full: bool,
}

impl Rover {
    fn weighted_draw(
        yields: &std::collections::BTreeMap<ResourceId, f64>,
        rng: &mut dyn rand::RngCore,
    ) -> Option<ResourceId> {
        let total: f64 = yields.values().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = rng.gen_range(0.0..total);
        for (resource, weight) in yields {
            if *weight <= 0.0 {
                continue;
            }
            if roll < *weight {
                return Some(*resource);
            }
            roll -= weight;
        }
        yields.keys().next_back().copied()
    }
}

impl PayloadBehavior for Rover {
    fn payload_id(&self) -> ComponentTypeId {
        kinds::ROVER
    }

    fn on_attach(&mut self, _vessel: &mut Vessel, _ctx: &mut VesselCtx) {
        self.accum_s = 0.0;
        self.notified_full = false;
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 || !vessel.landed {
            self.accum_s = 0.0;
            self.notified_full = false;
            return;
        }
        let Some(home) = vessel.home_body.and_then(|id| ctx.bodies.get(id)).cloned() else {
            return;
        };

        self.accum_s += dt.max(0.0);
        if self.accum_s < ROLL_PERIOD_S {
            return;
        }
        self.accum_s -= ROLL_PERIOD_S;

        // Mining roll: 2-in-2000 per period, weighted by the body's yields.
        if !home.resource_yield.is_empty() {
            let odds = ctx.rng.gen_range(0..MINING_ODDS_RANGE);
            if odds <= 1 {
                if let Some(resource) = Self::weighted_draw(&home.resource_yield, ctx.rng) {
                    let added = vessel.add_cargo(resource, 1);
                    if added == 0 {
                        if !self.notified_full && vessel.is_controlled() {
                            ctx.outbox.datagram(
                                Audience::Player(vessel.controlled_by),
                                wire::notification(wire::NOTIFY_FAILURE, "Rover cargo is full."),
                            );
                            self.notified_full = true;
                        }
                    } else {
                        self.notified_full = false;
                        if vessel.is_controlled() {
                            let cargo: Vec<(ResourceId, u32)> =
                                vessel.cargo.iter().map(|(r, c)| (*r, *c)).collect();
                            ctx.outbox.datagram(
                                Audience::Player(vessel.controlled_by),
                                wire::cargo_state(vessel.id, home.id, cargo),
                            );
                        }
                    }
                }
            }
        }

        // Surface drive: attitude keys walk the landing longitude at a rate
        // derived from the speed attribute and the body circumference.
        if vessel.is_controlled() {
            let direction = match (vessel.control.ccw, vessel.control.cw) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            };
            if direction != 0.0 {
                let km_per_sec = ctx.catalog.attrs(vessel.payload).rover_km_per_sec * 0.1;
                let circumference = 2.0 * std::f64::consts::PI * home.radius_km.max(1e-6);
                let deg_per_sec = km_per_sec / circumference * 360.0;
                vessel.landed_angle_offset = wrap_deg(
                    vessel.landed_angle_offset + deg_per_sec * direction * ROLL_PERIOD_S,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};
    use std::collections::BTreeMap;

    #[test]
    fn weighted_draw_respects_weights() {
        let yields: BTreeMap<ResourceId, f64> =
            BTreeMap::from([(ResourceId(1), 0.0), (ResourceId(2), 5.0)]);
        let mut rng = test_fixtures::rng();
        for _ in 0..50 {
            assert_eq!(Rover::weighted_draw(&yields, &mut rng), Some(ResourceId(2)));
        }
        assert_eq!(Rover::weighted_draw(&BTreeMap::new(), &mut rng), None);
    }

    #[test]
    fn nothing_happens_before_the_ten_second_mark() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::landed_rover(&catalog);
        let mut rover = Rover::default();
        let angle = vessel.landed_angle_offset;
        vessel.control.ccw = true;
        vessel.controlled_by = test_fixtures::PLAYER;

        for _ in 0..9 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            rover.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        assert_eq!(vessel.landed_angle_offset, angle, "motion waits for the guard");
        assert_eq!(vessel.cargo_total(), 0);
    }

    #[test]
    fn surface_drive_moves_longitude_inside_the_guard() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::landed_rover(&catalog);
        let mut rover = Rover::default();
        vessel.control.ccw = true;
        vessel.controlled_by = test_fixtures::PLAYER;
        let angle = vessel.landed_angle_offset;

        for _ in 0..10 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            rover.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        assert!(
            vessel.landed_angle_offset != angle,
            "ten accumulated seconds must move the rover"
        );
    }

    #[test]
    fn airborne_rover_resets_its_accumulator() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::landed_rover(&catalog);
        let mut rover = Rover::default();

        for _ in 0..9 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            rover.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        vessel.landed = false;
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            rover.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        assert_eq!(rover.accum_s, 0.0);
    }

    #[test]
    fn mining_eventually_fills_cargo_and_respects_capacity() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::landed_rover(&catalog);
        vessel.cargo_capacity = 2;
        vessel.controlled_by = test_fixtures::PLAYER;
        let mut rover = Rover::default();

        // Enough periods that the 1/1000 roll all but surely fires.
        for _ in 0..200_000 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            rover.on_tick(&mut vessel, &mut ctx, 10.0);
        }
        assert!(vessel.cargo_total() > 0, "mining never fired in 200k periods");
        assert!(vessel.cargo_total() <= 2, "cargo must respect capacity");
    }
}
