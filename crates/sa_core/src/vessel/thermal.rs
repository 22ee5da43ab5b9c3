//! Hull temperature: passive relaxation toward ambient plus the powered
//! thermal regulator, and over-temperature hull damage.

use crate::vessel::{SystemKind, Vessel, VesselCtx};

const REGULATOR_TARGET_C: f64 = 20.0;
const REGULATOR_DEADBAND_C: f64 = 3.0;
const REGULATOR_GAIN_PER_DEG: f64 = 1.0 / 60.0;

impl Vessel {
    /// Passive exponential relaxation toward ambient with time constant
    /// `thermal_resistance` (quartered inside an atmosphere), then the active
    /// regulator pulling toward 20 °C with time constant `60 / amount`, gated
    /// by a ±3 °C deadband and limited by the power it can actually pay for.
    pub(crate) fn cool_towards_ambient(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let real_dt = ctx.tuning.real_seconds(dt).max(0.0);

        let ambient_c = self.ambient_temp_k - 273.15;
        let mut tau = self.thermal_resistance.max(1e-3);
        if let Some(home) = self.home_body.and_then(|id| ctx.bodies.get(id)) {
            let alt = self.position.distance(home.position) - home.radius_km;
            if alt <= home.atmosphere_km {
                tau *= 0.25;
            }
        }

        let alpha = 1.0 - (-real_dt / tau).exp();
        self.temperature_c += (ambient_c - self.temperature_c) * alpha;

        let Some(reg) = self.systems.get(&SystemKind::ThermalRegulator).copied() else {
            return;
        };
        if !reg.active || reg.amount <= 0.0 {
            return;
        }

        let tau_reg = (60.0 / reg.amount).max(1e-3);
        let alpha_reg = 1.0 - (-dt / tau_reg).exp();

        let error = REGULATOR_TARGET_C - self.temperature_c;
        let magnitude = error.abs();
        let requested = if magnitude <= REGULATOR_DEADBAND_C {
            0.0
        } else {
            ((magnitude - REGULATOR_DEADBAND_C) * REGULATOR_GAIN_PER_DEG).min(1.0)
        };
        if requested <= 0.0 {
            return;
        }

        let needed = reg.power_draw.max(0.0) * requested * dt;
        let mut power_fraction = 1.0;
        if needed > 0.0 {
            let before = self.power;
            let _ = self.draw_power(needed);
            let used = (before - self.power).max(0.0);
            power_fraction = (used / needed).min(1.0);
        }

        let effort = requested * power_fraction;
        if effort > 0.0 {
            self.temperature_c += error * alpha_reg * effort;
        }
    }

    /// Hull damage of 0.01 per °C over the operating limit per second.
    pub(crate) fn take_temperature_damage(&mut self, dt: f64) {
        let over = self.temperature_c - self.max_operating_temp_c;
        if over > 0.0 {
            self.hull_integrity -= over * dt * 0.01;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};

    #[test]
    fn passive_cooling_relaxes_toward_ambient() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.home_body = None; // deep space, no atmosphere factor
        vessel.ambient_temp_k = 2.7;
        vessel.temperature_c = 100.0;
        vessel.systems.remove(&SystemKind::ThermalRegulator);

        let mut previous = vessel.temperature_c;
        for _ in 0..50 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vessel.cool_towards_ambient(10.0, &mut ctx);
            assert!(vessel.temperature_c < previous);
            previous = vessel.temperature_c;
        }
        let ambient_c = 2.7 - 273.15;
        assert!(vessel.temperature_c > ambient_c);
    }

    #[test]
    fn atmosphere_quarters_the_time_constant() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);

        let mut in_atmo = test_fixtures::orbiting_vessel(&catalog);
        in_atmo.temperature_c = 200.0;
        in_atmo.ambient_temp_k = 273.15; // 0 °C ambient
        in_atmo.systems.clear();
        // Place on the surface so the distance test sees it inside the shell.
        let home = parts.bodies.get(in_atmo.home_body.unwrap()).unwrap();
        in_atmo.position = home.position + crate::math::Vec2::new(home.radius_km, 0.0);

        let mut vacuum = test_fixtures::orbiting_vessel(&catalog);
        vacuum.temperature_c = 200.0;
        vacuum.ambient_temp_k = 273.15;
        vacuum.systems.clear();
        vacuum.home_body = None;

        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            in_atmo.cool_towards_ambient(10.0, &mut ctx);
        }
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vacuum.cool_towards_ambient(10.0, &mut ctx);
        }
        assert!(
            in_atmo.temperature_c < vacuum.temperature_c,
            "atmospheric convection must cool faster: {} vs {}",
            in_atmo.temperature_c,
            vacuum.temperature_c
        );
    }

    #[test]
    fn regulator_respects_deadband() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.home_body = None;
        vessel.ambient_temp_k = 22.0 + 273.15; // ambient equals hull temp
        vessel.temperature_c = 22.0;
        vessel.add_system(SystemKind::ThermalRegulator, 10.0, 1.0, true);

        let power_before = vessel.power;
        let mut ctx = make_ctx(&catalog, &mut parts);
        vessel.cool_towards_ambient(1.0, &mut ctx);
        // Within ±3 °C of 20 °C: no regulator power spent.
        assert_eq!(vessel.power, power_before);
    }

    #[test]
    fn regulator_pulls_toward_twenty_degrees_and_draws_power() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.home_body = None;
        vessel.ambient_temp_k = 150.0 + 273.15;
        vessel.temperature_c = 150.0;
        vessel.add_system(SystemKind::ThermalRegulator, 60.0, 1.0, true);

        let power_before = vessel.power;
        let mut ctx = make_ctx(&catalog, &mut parts);
        vessel.cool_towards_ambient(1.0, &mut ctx);
        assert!(vessel.temperature_c < 150.0);
        assert!(vessel.power < power_before);
    }

    #[test]
    fn unpowered_regulator_does_nothing() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.home_body = None;
        vessel.ambient_temp_k = 150.0 + 273.15;
        vessel.temperature_c = 150.0;
        vessel.add_system(SystemKind::ThermalRegulator, 60.0, 1.0, true);
        vessel.charge_by_stage.values_mut().for_each(|c| *c = 0.0);
        vessel.power = 0.0;

        let mut with_power = test_fixtures::orbiting_vessel(&catalog);
        with_power.home_body = None;
        with_power.ambient_temp_k = 150.0 + 273.15;
        with_power.temperature_c = 150.0;
        with_power.add_system(SystemKind::ThermalRegulator, 60.0, 1.0, true);

        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vessel.cool_towards_ambient(1.0, &mut ctx);
        }
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            with_power.cool_towards_ambient(1.0, &mut ctx);
        }
        assert!(
            with_power.temperature_c < vessel.temperature_c,
            "a powered regulator must outperform a dead battery"
        );
    }

    #[test]
    fn over_limit_temperature_erodes_hull() {
        let catalog = test_fixtures::catalog();
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.max_operating_temp_c = 100.0;
        vessel.temperature_c = 150.0;
        vessel.hull_integrity = 100.0;
        vessel.take_temperature_damage(2.0);
        // 50 °C over · 2 s · 0.01 = 1.0 hull
        assert!((vessel.hull_integrity - 99.0).abs() < 1e-9);

        vessel.temperature_c = 80.0;
        vessel.take_temperature_damage(10.0);
        assert!((vessel.hull_integrity - 99.0).abs() < 1e-9);
    }
}
