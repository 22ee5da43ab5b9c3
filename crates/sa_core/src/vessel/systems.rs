//! Electrical systems: ion drive, warp drive, magnetometer.
//!
//! Systems aggregate from attached component attributes at stat rebuild;
//! each carries an amount, a power draw, and a player-toggled active flag.

use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::outbox::Audience;
use crate::vessel::{Vessel, VesselCtx};
use crate::wire;
use crate::{AU_KM, C_KM_S};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u16)]
pub enum SystemKind {
    ThermalRegulator = 1,
    Magnetometer = 2,
    IonDrive = 3,
    WarpDrive = 4,
}

impl SystemKind {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::ThermalRegulator,
            2 => Self::Magnetometer,
            3 => Self::IonDrive,
            4 => Self::WarpDrive,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectricalSystem {
    pub kind: SystemKind,
    pub amount: f64,
    pub power_draw: f64,
    pub active: bool,
}

/// Warp bonus layered on top of the saved pre-warp velocity. On any
/// disengagement the saved velocity is restored exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WarpState {
    pub engaged: bool,
    pub saved_velocity: Vec2,
    pub bonus: Vec2,
    /// Set for ticks where the c clamp is bypassed. Transient.
    #[serde(skip)]
    pub active_this_tick: bool,
}

/// UI mapping: warp factor w sustains a speed of `c · w^(1/0.3)`.
pub fn warp_to_speed_km_s(warp: f64) -> f64 {
    if warp <= 0.0 {
        0.0
    } else {
        C_KM_S * warp.powf(1.0 / 0.3)
    }
}

const SOC_CUTOFF: f64 = 0.05;

impl Vessel {
    /// Continuous forward thrust through the center of mass while the ion
    /// drive is active and charged. Thrust scales with the fraction of the
    /// requested power actually paid; rotation is damped 0.5 % per tick.
    pub(crate) fn apply_ion_drive(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let Some(sys) = self.systems.get(&SystemKind::IonDrive).copied() else {
            return;
        };
        if !sys.active || sys.amount <= 1e-9 || self.power_capacity <= 0.0 {
            return;
        }
        if self.state_of_charge() <= SOC_CUTOFF {
            return;
        }

        self.rotation_vel_deg_s *= 0.995;

        let need = (sys.power_draw * 0.001).max(0.0) * dt.max(0.0);
        if need <= 0.0 {
            return;
        }
        let before = self.power;
        let _ = self.draw_power(need);
        let used = (before - self.power).max(0.0);
        if used <= 0.0 {
            return;
        }
        let throttle = (used / need).min(1.0);

        let kn = sys.amount * throttle * ctx.tuning.global_thrust_multiplier;
        if kn <= 0.0 {
            return;
        }
        // Through the CoM: no torque.
        let com = self.center_of_mass;
        self.apply_thrust_at(com, -90.0, kn, dt, ctx.tuning);
        self.last_forward_thrust_kn += kn;
    }

    fn end_warp(&mut self, deactivate_system: bool) {
        if self.warp.engaged {
            self.velocity = self.warp.saved_velocity;
        }
        self.warp.bonus = Vec2::ZERO;
        self.warp.engaged = false;
        self.warp.active_this_tick = false;
        if deactivate_system {
            if let Some(sys) = self.systems.get_mut(&SystemKind::WarpDrive) {
                sys.active = false;
            }
        }
    }

    /// Warp drive step. Preconditions: airborne, above the atmosphere,
    /// charged above 5 %, system active. The bonus vector eases toward a
    /// forward target of `c · max_warp^(1/0.3)` with time constant
    /// `tau / amount`; composed velocity = saved + bonus, and the c clamp is
    /// bypassed while engaged. Every exit path restores the saved velocity.
    pub(crate) fn apply_warp(&mut self, dt: f64, ctx: &mut VesselCtx) {
        self.warp.active_this_tick = false;

        let Some(sys) = self.systems.get(&SystemKind::WarpDrive).copied() else {
            if self.warp.engaged {
                self.end_warp(false);
            }
            return;
        };
        if sys.amount <= 0.0 || self.max_warp <= 0.0 {
            if self.warp.engaged {
                self.end_warp(true);
            }
            return;
        }
        if self.landed {
            if self.warp.engaged {
                self.end_warp(true);
            }
            return;
        }
        if let Some(home) = self.home_body.and_then(|id| ctx.bodies.get(id)) {
            if self.altitude_km < home.atmosphere_km - 1e-6 {
                if self.warp.engaged {
                    self.end_warp(true);
                }
                return;
            }
        }
        if self.state_of_charge() <= SOC_CUTOFF {
            if self.warp.engaged {
                self.end_warp(true);
            }
            return;
        }
        if !sys.active {
            if self.warp.engaged {
                self.end_warp(false);
            }
            return;
        }

        let real_dt = ctx.tuning.real_seconds(dt).max(0.0);
        let need = (sys.power_draw * 0.01).max(0.0) * real_dt;
        let mut throttle = 1.0;
        if need > 0.0 {
            let before = self.power;
            let _ = self.draw_power(need);
            let used = (before - self.power).max(0.0);
            if used <= 0.0 {
                if self.warp.engaged {
                    self.end_warp(true);
                }
                return;
            }
            throttle = (used / need).min(1.0);
        }

        if !self.warp.engaged {
            self.warp.saved_velocity = self.velocity;
            self.warp.bonus = Vec2::ZERO;
            self.warp.engaged = true;
        }

        let angle = (self.rotation_deg - 90.0).to_radians();
        let forward = Vec2::new(angle.cos(), angle.sin());
        let target_speed = warp_to_speed_km_s(self.max_warp);
        if target_speed <= 0.0 {
            self.end_warp(true);
            return;
        }
        let target = forward.scaled(target_speed);

        let base_tau = ctx.catalog.attrs(self.payload).warp_tau_s.max(1e-3);
        let eff_tau = (base_tau / sys.amount.max(1e-6)).max(1e-3);
        let alpha = (1.0 - (-real_dt / eff_tau).exp()) * throttle;

        if alpha > 0.0 {
            self.warp.bonus += (target - self.warp.bonus).scaled(alpha);
        }
        self.velocity = self.warp.saved_velocity + self.warp.bonus;
        self.warp.active_this_tick = true;

        if throttle < 0.05 {
            self.end_warp(true);
        }
    }

    fn has_powered_magnetometer(&self) -> bool {
        self.systems
            .get(&SystemKind::Magnetometer)
            .is_some_and(|sys| sys.active && sys.amount > 0.0)
            && self.power > SOC_CUTOFF * self.power_capacity
    }

    /// Throttled (~5 Hz real time) magnetometer push to the controller:
    /// top-3 planet dipole contributions by `moment / d³` plus the net field.
    pub(crate) fn tick_magnetometer(&mut self, real_dt: f64, ctx: &mut VesselCtx) {
        if !self.has_powered_magnetometer() || !self.is_controlled() {
            self.throttles.magnetometer_s = 0.0;
            return;
        }
        const PERIOD: f64 = 0.20;
        self.throttles.magnetometer_s += real_dt.max(0.0);
        if self.throttles.magnetometer_s < PERIOD {
            return;
        }
        self.throttles.magnetometer_s = 0.0;

        if let Some(sys) = self.systems.get(&SystemKind::Magnetometer).copied() {
            let draw = sys.power_draw.max(0.0) * PERIOD;
            if draw > 0.0 {
                let before = self.power;
                let _ = self.draw_power(draw);
                let used = (before - self.power).max(0.0);
                if used < draw * 0.25 {
                    return;
                }
            }
        }

        const MAX_RANGE_KM: f64 = AU_KM * 5.0;
        const SCALE: f64 = 1.0e10;

        let mut contributions: Vec<(wire::MagnetometerSample, Vec2)> = Vec::new();
        for planet in ctx.bodies.planets().filter(|p| !p.is_moon) {
            let diff = planet.position - self.position;
            let d = diff.length();
            if d <= 0.0 || d > MAX_RANGE_KM {
                continue;
            }
            let moment =
                planet.radius_km.powi(3) * if planet.is_gas_giant { 5.0 } else { 1.0 };
            let strength = (moment / d.powi(3) * SCALE).clamp(0.0, 1.0);
            if strength <= 1e-6 {
                continue;
            }
            let dir_deg = diff.y.atan2(diff.x).to_degrees();
            let flags =
                u8::from(planet.is_gas_giant) | (u8::from(planet.is_moon) << 1);
            contributions.push((
                wire::MagnetometerSample {
                    body: planet.id,
                    direction_deg: dir_deg as f32,
                    strength: strength as f32,
                    flags,
                },
                diff.scaled(strength / d),
            ));
        }
        if contributions.is_empty() {
            return;
        }
        contributions.sort_by(|a, b| b.0.strength.total_cmp(&a.0.strength));
        contributions.truncate(3);

        let net: Vec2 = contributions
            .iter()
            .fold(Vec2::ZERO, |acc, (_, v)| acc + *v);
        let net_len = net.length();
        let net_dir = if net_len > 1e-9 {
            net.y.atan2(net.x).to_degrees()
        } else {
            0.0
        };
        let samples: Vec<wire::MagnetometerSample> =
            contributions.into_iter().map(|(s, _)| s).collect();

        let frame = wire::magnetometer_field(
            self.id,
            net_dir as f32,
            net_len.clamp(0.0, 1.0) as f32,
            &samples,
        );
        ctx.outbox
            .datagram(Audience::Player(self.controlled_by), frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, ctx_parts, make_ctx};

    #[test]
    fn warp_speed_mapping_inverts_ui_formula() {
        assert_eq!(warp_to_speed_km_s(0.0), 0.0);
        assert!((warp_to_speed_km_s(1.0) - C_KM_S).abs() < 1e-6);
        // w = 2 → c · 2^(10/3)
        let expected = C_KM_S * 2.0_f64.powf(1.0 / 0.3);
        assert!((warp_to_speed_km_s(2.0) - expected).abs() < 1e-3);
    }

    #[test]
    fn warp_restores_saved_velocity_exactly_on_power_collapse() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::warp_vessel(&catalog);
        let original = Vec2::new(10.0, -3.0);
        vessel.velocity = original;

        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vessel.apply_warp(1.0, &mut ctx);
        }
        assert!(vessel.warp.engaged);
        assert!(vessel.warp.active_this_tick);
        assert!(vessel.velocity.length() > original.length());

        // Drain the battery; the next step must fall out of warp and restore
        // the pre-warp velocity bit-for-bit.
        vessel.charge_by_stage.values_mut().for_each(|c| *c = 0.0);
        vessel.power = 0.0;
        {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vessel.apply_warp(1.0, &mut ctx);
        }
        assert!(!vessel.warp.engaged);
        assert_eq!(vessel.velocity, original);
        assert_eq!(vessel.warp.bonus, Vec2::ZERO);
    }

    #[test]
    fn warp_refuses_inside_atmosphere() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::warp_vessel(&catalog);
        vessel.altitude_km = 1.0; // deep inside the fixture atmosphere
        let mut ctx = make_ctx(&catalog, &mut parts);
        vessel.apply_warp(1.0, &mut ctx);
        assert!(!vessel.warp.engaged);
        assert!(!vessel.warp.active_this_tick);
    }

    #[test]
    fn warp_bonus_eases_toward_target() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::warp_vessel(&catalog);
        let mut last = 0.0;
        for _ in 0..5 {
            let mut ctx = make_ctx(&catalog, &mut parts);
            vessel.apply_warp(1.0, &mut ctx);
            let bonus = vessel.warp.bonus.length();
            assert!(bonus > last, "bonus should grow monotonically");
            last = bonus;
        }
        assert!(last < warp_to_speed_km_s(vessel.max_warp));
    }

    #[test]
    fn ion_drive_throttles_with_available_power() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::ion_vessel(&catalog);
        vessel.rotation_deg = 0.0;

        let mut ctx = make_ctx(&catalog, &mut parts);
        let before = vessel.velocity;
        vessel.apply_ion_drive(1.0, &mut ctx);
        assert!(vessel.velocity.distance(before) > 0.0);
        assert!(vessel.last_forward_thrust_kn > 0.0);
        assert!(vessel.power < vessel.power_capacity);
    }

    #[test]
    fn ion_drive_idles_below_charge_floor() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::ion_vessel(&catalog);
        let cap = vessel.power_capacity;
        vessel.charge_by_stage.values_mut().for_each(|c| *c = 0.0);
        vessel.charge_power(cap * 0.01);
        let before = vessel.velocity;
        let mut ctx = make_ctx(&catalog, &mut parts);
        vessel.apply_ion_drive(1.0, &mut ctx);
        assert_eq!(vessel.velocity, before);
    }

    #[test]
    fn ion_drive_damps_rotation() {
        let catalog = test_fixtures::catalog();
        let mut parts = ctx_parts(&catalog);
        let mut vessel = test_fixtures::ion_vessel(&catalog);
        vessel.rotation_vel_deg_s = 10.0;
        let mut ctx = make_ctx(&catalog, &mut parts);
        vessel.apply_ion_drive(1.0, &mut ctx);
        assert!(vessel.rotation_vel_deg_s < 10.0);
    }
}
