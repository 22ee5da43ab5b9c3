//! Solar orbiter: income multiplier is a piecewise exponential of distance
//! to the origin star.

use crate::ids::ComponentTypeId;
use crate::payload::{kinds, pay_out, PayloadBehavior};
use crate::vessel::{Vessel, VesselCtx};
use crate::AU_KM;

const SUN_RADIUS_KM: f64 = 696_340.0;

/// Curvature inside 0.5 AU (20 → 1), per AU.
const K_NEAR: f64 = 5.0;
/// Curvature beyond 0.5 AU (1 → 0), per AU.
const K_FAR: f64 = 2.0;

/// Proximity multiplier in [0, 20]: 20 at the photosphere, exactly 1 at
/// 0.5 AU, decaying exponentially toward 0 beyond.
pub fn solar_multiplier(r_au: f64) -> f64 {
    let sun_radius_au = (SUN_RADIUS_KM / AU_KM).max(1e-9);
    let r = r_au.max(sun_radius_au);
    let r1 = 0.5;

    let m = if r <= r1 {
        let num = (-K_NEAR * (r - sun_radius_au)).exp() - (-K_NEAR * (r1 - sun_radius_au)).exp();
        let den = 1.0 - (-K_NEAR * (r1 - sun_radius_au)).exp();
        1.0 + 19.0 * (num / den.max(1e-12))
    } else {
        (-K_FAR * (r - r1)).exp()
    };
    m.clamp(0.0, 20.0)
}

#[derive(Debug, Default)]
pub struct SolarOrbiter;

impl PayloadBehavior for SolarOrbiter {
    fn payload_id(&self) -> ComponentTypeId {
        kinds::SOLAR_ORBITER
    }

    fn on_tick(&mut self, vessel: &mut Vessel, ctx: &mut VesselCtx, dt: f64) {
        if vessel.stage != 0 {
            return;
        }
        if !ctx.dir.agencies.contains_key(&vessel.agency) {
            return;
        }
        let base = vessel.stats.income_base;
        if base <= 0.0 {
            return;
        }

        let r_au = vessel.position.length() / AU_KM;
        let mult = solar_multiplier(r_au);
        if mult <= 0.0 {
            return;
        }

        let seconds = ctx.tuning.real_seconds(dt);
        let global = ctx.tuning.global_cash_multiplier;
        let regional = vessel.planet_income_multiplier(ctx.dir);
        pay_out(vessel, ctx, base * mult * global * regional * seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};

    #[test]
    fn multiplier_is_twenty_at_the_photosphere() {
        let at_surface = solar_multiplier(SUN_RADIUS_KM / AU_KM);
        assert!(
            (at_surface - 20.0).abs() < 1e-6,
            "surface multiplier {at_surface}"
        );
        // Inside the photosphere clamps to the surface value.
        assert!((solar_multiplier(0.0) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn multiplier_is_one_at_half_au() {
        let at_half = solar_multiplier(0.5);
        assert!((at_half - 1.0).abs() < 1e-6, "0.5 AU multiplier {at_half}");
    }

    #[test]
    fn multiplier_decays_beyond_half_au() {
        let at_one = solar_multiplier(1.0);
        let expected = (-K_FAR * 0.5).exp();
        assert!((at_one - expected).abs() < 1e-9);
        assert!(solar_multiplier(5.0) < at_one);
        assert!(solar_multiplier(50.0) >= 0.0);
    }

    #[test]
    fn multiplier_is_monotonic_from_surface_to_half_au() {
        let mut prev = 21.0;
        let sun_radius_au = SUN_RADIUS_KM / AU_KM;
        let steps = 100;
        for i in 0..=steps {
            let r = sun_radius_au + (0.5 - sun_radius_au) * f64::from(i) / f64::from(steps);
            let m = solar_multiplier(r);
            assert!(m < prev, "must fall monotonically, {m} at {r} after {prev}");
            prev = m;
        }
    }

    #[test]
    fn near_orbit_outpays_far_orbit() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);

        let mut near = test_fixtures::deployed_solar_orbiter(&catalog);
        near.position = Vec2::new(0.3 * AU_KM, 0.0);
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            SolarOrbiter.on_tick(&mut near, &mut ctx, 1.0);
        }

        let mut far = test_fixtures::deployed_solar_orbiter(&catalog);
        far.position = Vec2::new(2.0 * AU_KM, 0.0);
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            SolarOrbiter.on_tick(&mut far, &mut ctx, 1.0);
        }

        let near_total = near.lifetime_revenue as f64 + near.revenue_carry;
        let far_total = far.lifetime_revenue as f64 + far.revenue_carry;
        assert!(near_total > far_total);
    }
}
