//! Communications relay: passive income plus the PING neighbor bonus.

use crate::ids::ComponentTypeId;
use crate::payload::{kinds, pay_out, PayloadBehavior};
use crate::upgrades;
use crate::vessel::{Vessel, VesselCtx};

#[derive(Debug, Default)]
pub struct CommsSatellite;

impl CommsSatellite {
    fn ping_radius_km(vessel: &Vessel) -> f64 {
        if vessel.has_upgrade(upgrades::PING2) {
            5000.0
        } else if vessel.has_upgrade(upgrades::PING1) {
            3000.0
        } else {
            0.0
        }
    }
}

impl PayloadBehavior for CommsSatellite {
    fn payload_id(&self) -> ComponentTypeId {
        kinds::COMMS_SATELLITE
    }

    fn on_attach(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx) {
        vessel.apply_stats(ctx.catalog);
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 {
            return;
        }
        let Some(agency) = ctx.dir.agencies.get(&vessel.agency) else {
            return;
        };

        let seconds = ctx.tuning.real_seconds(dt);
        let base = vessel.stats.income_base;
        let sat_bonus = agency.attributes.satellite_bonus_income;
        let global = ctx.tuning.global_cash_multiplier;
        let regional = vessel.planet_income_multiplier(ctx.dir);

        let payout = (base + sat_bonus) * global * seconds * regional;
        pay_out(vessel, ctx, payout);

        // PING: add the base income of every friendly deployed payload in
        // range, unscaled by the regional multiplier.
        let radius = Self::ping_radius_km(vessel);
        if radius <= 0.0 {
            return;
        }
        let extra: f64 = ctx
            .peers
            .iter()
            .filter(|peer| {
                peer.id != vessel.id
                    && peer.agency == vessel.agency
                    && peer.stage == 0
                    && peer.position.distance(vessel.position) <= radius
            })
            .map(|peer| peer.payload_base_income.max(0.0))
            .sum();
        if extra > 0.0 {
            pay_out(vessel, ctx, extra * global * seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::PeerVessel;
    use crate::math::Vec2;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};

    #[test]
    fn deployed_satellite_earns_and_distributes() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_comms_sat(&catalog);
        let mut behavior = CommsSatellite;

        // 100 seconds of income at sim rate 1.
        for _ in 0..100 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            behavior.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        assert!(vessel.lifetime_revenue > 0);
        let member = &parts.dir.players[&test_fixtures::PLAYER];
        assert!(member.money > 0, "income must reach the member");
    }

    #[test]
    fn undeployed_satellite_earns_nothing() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_comms_sat(&catalog);
        vessel.stage = 1;
        let mut behavior = CommsSatellite;
        let mut ctx = make_ctx(&catalog, &mut parts);
        behavior.on_tick(&mut vessel, &mut ctx, 1.0);
        assert_eq!(vessel.lifetime_revenue, 0);
    }

    #[test]
    fn ping_counts_friendly_deployed_neighbors_in_range() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::deployed_comms_sat(&catalog);
        vessel
            .unlocked_by_payload
            .entry(vessel.payload)
            .or_default()
            .insert(upgrades::PING1);

        parts.peers = vec![
            // In range, friendly, deployed: counts.
            PeerVessel {
                id: crate::ids::ObjectId(900),
                agency: vessel.agency,
                stage: 0,
                position: vessel.position + Vec2::new(1000.0, 0.0),
                payload_base_income: 7.0,
            },
            // Out of the 3000 km PING1 radius.
            PeerVessel {
                id: crate::ids::ObjectId(901),
                agency: vessel.agency,
                stage: 0,
                position: vessel.position + Vec2::new(4000.0, 0.0),
                payload_base_income: 7.0,
            },
            // Not deployed.
            PeerVessel {
                id: crate::ids::ObjectId(902),
                agency: vessel.agency,
                stage: 1,
                position: vessel.position,
                payload_base_income: 7.0,
            },
        ];

        let mut without = test_fixtures::deployed_comms_sat(&catalog);
        // Isolate the bonus by comparing one ticked second with and without
        // PING against the same world.
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            CommsSatellite.on_tick(&mut vessel, &mut ctx, 1.0);
        }
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            CommsSatellite.on_tick(&mut without, &mut ctx, 1.0);
        }
        let with_carry = vessel.lifetime_revenue as f64 + vessel.revenue_carry;
        let without_carry = without.lifetime_revenue as f64 + without.revenue_carry;
        assert!(
            (with_carry - without_carry - 7.0).abs() < 1e-9,
            "exactly one neighbor's base income should be added, got {}",
            with_carry - without_carry
        );
    }
}
