//! Chemical thrust, altitude, and ground interaction.

use crate::content::ThrusterAttrs;
use crate::math::{smoothstep, Vec2};
use crate::vessel::{BurnOutcome, ControlBit, Vessel, VesselCtx};
use crate::C_KM_S;

/// Impacts faster than this (downward, km/s) destroy the vessel.
const MAX_SAFE_TOUCHDOWN: f64 = 1.2;

impl Vessel {
    pub(crate) fn apply_forward_thrust(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let mut total_kn = 0.0;
        self.apply_thrust_group(dt, ctx, ControlBit::Forward, -90.0, 1.0, &mut total_kn);
        self.last_forward_thrust_kn += total_kn;
    }

    pub(crate) fn apply_reverse_thrust(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let mut total = 0.0;
        self.apply_thrust_group(dt, ctx, ControlBit::Reverse, -90.0 + 180.0, 1.0, &mut total);
    }

    pub(crate) fn apply_ccw_thrust(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let attn = ctx.tuning.attitude_thrust_scale;
        let mut total = 0.0;
        self.apply_thrust_group(dt, ctx, ControlBit::Ccw, -90.0, attn, &mut total);
    }

    pub(crate) fn apply_cw_thrust(&mut self, dt: f64, ctx: &mut VesselCtx) {
        let attn = ctx.tuning.attitude_thrust_scale;
        let mut total = 0.0;
        self.apply_thrust_group(dt, ctx, ControlBit::Cw, -90.0, attn, &mut total);
    }

    /// Fire every current-stage thruster of one control group: burn fuel,
    /// accumulate burn heat, and apply force with torque. A dry tank kills
    /// the control bit and may auto-stage.
    fn apply_thrust_group(
        &mut self,
        dt: f64,
        ctx: &mut VesselCtx,
        bit: ControlBit,
        base_direction_deg: f64,
        attenuation: f64,
        total_out: &mut f64,
    ) {
        let mult = ctx.tuning.global_thrust_multiplier;
        let candidates: Vec<(crate::vessel::AttachedComponent, ThrusterAttrs)> = self
            .components
            .iter()
            .filter(|c| c.stage == self.stage)
            .map(|c| {
                let attrs = ctx.catalog.attrs(c.kind);
                let group = match bit {
                    ControlBit::Forward => attrs.forward,
                    ControlBit::Reverse => attrs.reverse,
                    ControlBit::Ccw => attrs.ccw,
                    ControlBit::Cw => attrs.cw,
                };
                (c.clone(), group)
            })
            .collect();

        for (comp, group) in candidates {
            // An auto-stage mid-loop changes the current stage; later
            // candidates from the dropped stage no longer apply.
            if comp.stage != self.stage {
                continue;
            }
            let mut kn = group.thrust_kn * attenuation;
            if kn <= 0.0 {
                continue;
            }

            let consumption = group.fuel_consumption * 0.003;
            if consumption > 0.0 {
                match self.burn_current_stage(consumption * dt, ctx.catalog) {
                    BurnOutcome::Burned => {
                        self.temperature_c += group.fire_heat * 0.001 * dt;
                    }
                    BurnOutcome::Short { auto_stage } => {
                        kn = 0.0;
                        self.set_control_bit(bit, false);
                        if auto_stage {
                            self.auto_stage_if_empty(ctx);
                        }
                    }
                }
            }

            if kn <= 0.0 {
                continue;
            }
            let local = Self::nozzle_local_point(&comp, group.output_point);
            let direction = base_direction_deg + group.thrust_direction_deg;
            let effective = kn * mult;
            self.apply_thrust_at(local, direction, effective, dt, ctx.tuning);
            *total_out += effective;
        }
    }

    fn set_control_bit(&mut self, bit: ControlBit, value: bool) {
        match bit {
            ControlBit::Forward => self.control.forward = value,
            ControlBit::Reverse => self.control.reverse = value,
            ControlBit::Ccw => self.control.ccw = value,
            ControlBit::Cw => self.control.cw = value,
        }
    }

    /// Apply a thrust force at a component-local point.
    ///
    /// Linear: Δv = F/m · dt, with a relativistic damper above 0.9 c — the
    /// speed-increasing parallel component of Δv shrinks by
    /// `(1 − (speed − 0.9c)/(V_max − 0.9c))³` of the remaining headroom, so
    /// per-tick speed gain falls monotonically toward `V_max = 0.99999 c`.
    /// Angular: torque about the center of mass with I = m·r².
    pub fn apply_thrust_at(
        &mut self,
        local_point: Vec2,
        direction_angle_deg: f64,
        thrust_kn: f64,
        dt: f64,
        tuning: &crate::content::ServerTuning,
    ) {
        if thrust_kn <= 0.0 || self.mass_kg <= 0.0 {
            return;
        }
        let real_dt = tuning.real_seconds(dt);
        let thrust_n = thrust_kn * 1000.0;
        let angle = (self.rotation_deg + direction_angle_deg).to_radians();
        let force = Vec2::new(angle.cos(), angle.sin()).scaled(thrust_n);
        let mut dv = force.scaled(real_dt / self.mass_kg);

        const V_MAX: f64 = C_KM_S * 0.99999;
        const V_90: f64 = C_KM_S * 0.90;

        let speed = self.velocity.length();
        if speed > V_90 {
            let unit = self.velocity.scaled(1.0 / speed);
            let incr_par = dv.dot(unit);
            if incr_par > 0.0 {
                let par = unit.scaled(incr_par);
                let perp = dv - par;
                let frac = ((speed - V_90) / (V_MAX - V_90)).clamp(0.0, 1.0);
                let damping = (1.0 - frac).powi(3);
                let headroom = (V_MAX - speed).max(0.0);
                let allowed = headroom * damping;
                let par = if incr_par > allowed {
                    par.scaled(allowed / incr_par)
                } else {
                    par
                };
                dv = par + perp;
            }
        }

        self.velocity += dv;

        let post = self.velocity.length();
        if post > V_MAX {
            self.velocity = self.velocity.scaled(V_MAX / post);
        }

        // Torque about the center of mass.
        let rel_local = local_point - self.center_of_mass;
        let rot = self.rotation_deg.to_radians();
        let (sin, cos) = rot.sin_cos();
        let rel = Vec2::new(
            rel_local.x * cos - rel_local.y * sin,
            rel_local.x * sin + rel_local.y * cos,
        );
        let torque = rel.x * force.y - rel.y * force.x;
        let r_squared = rel.dot(rel);
        if r_squared > 0.0 {
            let moment = self.mass_kg * r_squared;
            let angular_acc = torque / moment;
            self.rotation_vel_deg_s += (angular_acc * real_dt).to_degrees();
        }
    }

    /// Vertical motion while airborne: thrust lift fading with density,
    /// reduced surface gravity inside the atmosphere, a vacuum damper above
    /// it, and the touchdown check at zero altitude.
    pub(crate) fn update_altitude(&mut self, dt: f64, ctx: &mut VesselCtx) {
        if self.landed {
            return;
        }
        let Some(home) = self.home_body.and_then(|id| ctx.bodies.get(id)).cloned() else {
            return;
        };

        let atm = home.atmosphere_km.max(1e-6);
        let in_atmo = self.altitude_km < atm - 1e-6;

        let acc_proxy = self.last_forward_thrust_kn / self.mass_kg.max(1.0);
        let alt_norm = (self.altitude_km / atm).clamp(0.0, 1.0);
        let density = 1.0 - alt_norm;
        let atmos_factor = 0.5 + 0.5 * density * density;
        let lift_scale = 0.130 * (1.0 + 0.05 * self.aerodynamics);
        let a_up = if in_atmo {
            lift_scale * acc_proxy * atmos_factor
        } else {
            0.0
        };
        let a_down = if in_atmo {
            home.surface_g_km_s2 * 0.1
        } else {
            0.0
        };

        if !in_atmo {
            let tau = home.vacuum_descent_tau_s;
            if tau > 1e-6 {
                self.z_velocity += -self.z_velocity * (1.0 - (-dt / tau).exp());
            }
        }

        self.z_velocity += (a_up - a_down) * dt;
        self.altitude_km += self.z_velocity * dt;

        if self.altitude_km >= atm {
            self.altitude_km = atm;
            if self.z_velocity > 0.0 {
                self.z_velocity = 0.0;
            }
        }

        if self.takeoff_grace_s > 0.0 {
            self.takeoff_grace_s = (self.takeoff_grace_s - dt).max(0.0);
        }

        if self.altitude_km <= 0.0 {
            self.altitude_km = 0.0;

            if self.takeoff_grace_s > 0.0 {
                if self.z_velocity < 0.0 {
                    self.z_velocity = 0.0;
                }
                return;
            }

            if self.z_velocity < 0.0 {
                let impact = -self.z_velocity;
                self.z_velocity = 0.0;
                if impact > MAX_SAFE_TOUCHDOWN {
                    self.destroy(ctx);
                } else {
                    self.land(ctx);
                }
            } else {
                self.z_velocity = self.z_velocity.max(0.0);
            }
        }
    }

    /// Near-ground blending toward the body's velocity and surface anchor.
    /// The velocity glue fades out entirely between 90 % and 100 % of the
    /// atmosphere; the position glue only acts below 35 %.
    pub(crate) fn ground_influence(&mut self, dt: f64, bodies: &crate::chunk::ChunkBodies) {
        if dt <= 0.0 {
            return;
        }
        let Some(home) = self.home_body.and_then(|id| bodies.get(id)) else {
            return;
        };

        let atm = home.atmosphere_km.max(1e-6);
        let n = (self.altitude_km / atm).clamp(0.0, 1.0);

        const VEL_TAU_GROUND: f64 = 0.15;
        const VEL_TAU_TOP: f64 = 8.0;
        const VEL_SHAPE: f64 = 0.8;
        let tau_v = VEL_TAU_GROUND + (VEL_TAU_TOP - VEL_TAU_GROUND) * n.powf(VEL_SHAPE);
        let vel_gate = 1.0 - smoothstep(0.90, 1.0, n);

        if vel_gate > 0.0 {
            let beta = (1.0 - (-dt / tau_v).exp()) * vel_gate * 0.1;
            self.velocity += (home.velocity - self.velocity).scaled(beta);
        }

        let pos_gate = 1.0 - smoothstep(0.0, 0.35, n);
        if pos_gate > 0.0 {
            const POS_TAU_GROUND: f64 = 0.10;
            const POS_TAU_END: f64 = 1.50;
            let tau_p = POS_TAU_GROUND + (POS_TAU_END - POS_TAU_GROUND) * n;
            let alpha = (1.0 - (-dt / tau_p).exp()) * pos_gate * 0.1;

            let world_deg = -(home.rotation_deg + self.landed_angle_offset);
            let ang = world_deg.to_radians();
            let anchor = home.position + Vec2::new(ang.cos(), ang.sin()).scaled(home.radius_km);
            self.position += (anchor - self.position).scaled(alpha);
        }
    }
}
