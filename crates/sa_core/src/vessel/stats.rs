//! Vessel stat aggregation.
//!
//! Component attributes fold into per-stage pools and cached aggregates, then
//! a modifier pipeline (driven by unlocked upgrades) produces the frozen
//! [`VesselStats`] snapshot the rest of the tick reads.

use serde::{Deserialize, Serialize};

use crate::content::ContentCatalog;
use crate::ids::{ComponentTypeId, UpgradeId};
use crate::math::Vec2;
use crate::upgrades;
use crate::vessel::{SystemKind, Vessel};
use crate::AU_KM;

/// Frozen per-rebuild stat snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselStats {
    pub forward_thrust_kn: f64,
    pub reverse_thrust_kn: f64,
    pub power_capacity: f64,
    pub telescope_range_km: f64,
    pub telescope_fov_deg: f64,
    pub telescope_max_rate_deg_s: f64,
    pub income_base: f64,
    pub thermal_resistance: f64,
}

impl Default for VesselStats {
    fn default() -> Self {
        Self {
            forward_thrust_kn: 0.0,
            reverse_thrust_kn: 0.0,
            power_capacity: 0.0,
            telescope_range_km: AU_KM,
            telescope_fov_deg: 40.0,
            telescope_max_rate_deg_s: 5.0,
            income_base: 0.0,
            thermal_resistance: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatPath {
    ForwardThrust,
    ReverseThrust,
    PowerCapacity,
    TelescopeRange,
    TelescopeFov,
    TelescopeMaxRate,
    IncomeBase,
    ThermalResistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Mul,
    Set,
}

/// One stat adjustment contributed by an unlocked upgrade.
#[derive(Debug, Clone, Copy)]
pub struct Modifier {
    pub path: StatPath,
    pub op: Op,
    pub value: f64,
    /// Applies only while the payload is deployed (stage 0).
    pub only_deployed: bool,
}

impl Modifier {
    const fn add(path: StatPath, value: f64) -> Self {
        Self {
            path,
            op: Op::Add,
            value,
            only_deployed: true,
        }
    }

    fn apply(self, stats: &mut VesselStats) {
        let slot = match self.path {
            StatPath::ForwardThrust => &mut stats.forward_thrust_kn,
            StatPath::ReverseThrust => &mut stats.reverse_thrust_kn,
            StatPath::PowerCapacity => &mut stats.power_capacity,
            StatPath::TelescopeRange => &mut stats.telescope_range_km,
            StatPath::TelescopeFov => &mut stats.telescope_fov_deg,
            StatPath::TelescopeMaxRate => &mut stats.telescope_max_rate_deg_s,
            StatPath::IncomeBase => &mut stats.income_base,
            StatPath::ThermalResistance => &mut stats.thermal_resistance,
        };
        match self.op {
            Op::Add => *slot += self.value,
            Op::Mul => *slot *= self.value,
            Op::Set => *slot = self.value,
        }
    }
}

/// Modifier bundles granted by tree upgrades. Upgrade ids are globally
/// unique, so the payload only matters for which set the vessel holds.
pub fn modifiers_for(_payload: ComponentTypeId, unlocked: &[UpgradeId]) -> Vec<Modifier> {
    let mut mods = Vec::new();
    for id in unlocked {
        match *id {
            upgrades::EXPOSURE1 => mods.push(Modifier::add(StatPath::TelescopeRange, AU_KM)),
            upgrades::ZOOM1 => mods.push(Modifier::add(StatPath::TelescopeRange, AU_KM * 3.5)),
            upgrades::ZOOM2 => mods.push(Modifier::add(StatPath::TelescopeRange, AU_KM * 10.0)),
            upgrades::FOCUS1 => mods.push(Modifier::add(StatPath::TelescopeFov, 7.0)),
            upgrades::FOCUS2 => mods.push(Modifier::add(StatPath::TelescopeFov, 13.0)),
            upgrades::RESOLUTION1 => mods.push(Modifier::add(StatPath::IncomeBase, 100.0)),
            _ => {}
        }
    }
    mods
}

impl Vessel {
    /// Recompute per-stage pools, cached aggregates, center of mass, systems,
    /// and the stats snapshot from the current component list.
    pub fn rebuild_stats(&mut self, catalog: &ContentCatalog) {
        self.fuel_capacity_by_stage.clear();
        self.charge_capacity_by_stage.clear();
        self.systems.clear();

        let mut stage_forward: std::collections::BTreeMap<u32, f64> = Default::default();
        let mut stage_reverse: std::collections::BTreeMap<u32, f64> = Default::default();
        let mut total_mass = 0.0;
        let mut weighted = Vec2::ZERO;
        let mut tau_bonus = 0.0;

        self.solar_rate = 0.0;
        self.nuclear_rate = 0.0;
        self.armor = 0.0;
        self.aerodynamics = 0.0;
        self.cargo_capacity = 0;
        self.max_warp = 0.0;

        if self.components.is_empty() {
            self.mass_kg = 0.0;
            self.dry_mass_kg = 0.0;
            self.center_of_mass = Vec2::ZERO;
            return;
        }

        // Resolve definitions up front; `add_system` below needs `&mut self`.
        let resolved: Vec<(u32, f64, f64, f64, crate::content::ComponentAttributes)> = self
            .components
            .iter()
            .filter_map(|comp| {
                catalog
                    .component(comp.kind)
                    .map(|def| (comp.stage, comp.x, comp.y, def.mass_kg, def.attributes.clone()))
            })
            .collect();

        for (stage, x, y, mass_kg, attrs) in &resolved {
            let stage = *stage;

            if attrs.liquid_fuel > 0.0 {
                *self.fuel_capacity_by_stage.entry(stage).or_insert(0.0) += attrs.liquid_fuel;
            }
            if attrs.power_capacity > 0.0 {
                *self.charge_capacity_by_stage.entry(stage).or_insert(0.0) += attrs.power_capacity;
            }
            *stage_forward.entry(stage).or_insert(0.0) += attrs.forward.thrust_kn;
            *stage_reverse.entry(stage).or_insert(0.0) += attrs.reverse.thrust_kn;

            total_mass += *mass_kg;
            weighted += Vec2::new(*x, *y).scaled(*mass_kg);

            // Attached components only (stage ≤ current) contribute systems
            // and passive aggregates.
            if stage <= self.stage {
                self.add_system(
                    SystemKind::ThermalRegulator,
                    attrs.thermal_regulation,
                    attrs.thermal_regulation_power_draw,
                    true,
                );
                self.add_system(
                    SystemKind::Magnetometer,
                    attrs.magnetometer,
                    attrs.magnetometer_power_draw,
                    false,
                );
                self.add_system(
                    SystemKind::IonDrive,
                    attrs.ion_drive,
                    attrs.ion_drive_power_draw,
                    false,
                );
                self.add_system(
                    SystemKind::WarpDrive,
                    attrs.warp_drive,
                    attrs.warp_drive_power_draw,
                    false,
                );
                tau_bonus += attrs.thermal_resistance;
                self.solar_rate += attrs.solar_power;
                self.nuclear_rate += attrs.nuclear_power * 0.1;
                self.armor += attrs.armor;
                self.aerodynamics += attrs.aerodynamics;
                self.cargo_capacity += attrs.cargo_capacity;
                self.max_warp = self.max_warp.max(attrs.max_warp);
            }
        }

        self.thermal_resistance = (100.0 + tau_bonus).max(1e-3);

        // First rebuild fills every tank and battery; later rebuilds keep the
        // contents and clamp to capacity.
        if self.fuel_by_stage.is_empty() {
            self.fuel_by_stage = self.fuel_capacity_by_stage.clone();
        } else {
            for (stage, fuel) in &mut self.fuel_by_stage {
                let cap = self
                    .fuel_capacity_by_stage
                    .get(stage)
                    .copied()
                    .unwrap_or(0.0);
                *fuel = fuel.clamp(0.0, cap);
            }
        }
        if self.charge_by_stage.is_empty() {
            self.charge_by_stage = self.charge_capacity_by_stage.clone();
        } else {
            for (stage, charge) in &mut self.charge_by_stage {
                let cap = self
                    .charge_capacity_by_stage
                    .get(stage)
                    .copied()
                    .unwrap_or(0.0);
                *charge = charge.clamp(0.0, cap);
            }
        }

        self.capable_forward_thrust = stage_forward.get(&self.stage).copied().unwrap_or(0.0);
        self.capable_reverse_thrust = stage_reverse.get(&self.stage).copied().unwrap_or(0.0);

        self.dry_mass_kg = total_mass;
        self.mass_kg = total_mass + self.attached_fuel();
        if total_mass > 0.0 {
            self.center_of_mass = weighted.scaled(1.0 / total_mass);
        }

        self.seat_capacity = catalog.attrs(self.payload).seats;
        if self.astronauts_onboard.len() > self.seat_capacity as usize {
            self.astronauts_onboard.truncate(self.seat_capacity as usize);
        }

        self.fuel_capacity_kg = self.current_stage_capacity();
        self.fuel_kg = self.current_stage_fuel();
        self.power_capacity = self.attached_charge_capacity();
        self.power = self.attached_charge().min(self.power_capacity);

        self.apply_stats(catalog);
    }

    /// Rebuild the frozen stats snapshot from caches plus active modifiers.
    pub fn apply_stats(&mut self, catalog: &ContentCatalog) {
        let attrs = catalog.attrs(self.payload);
        let mut stats = VesselStats {
            forward_thrust_kn: self.capable_forward_thrust,
            reverse_thrust_kn: self.capable_reverse_thrust,
            power_capacity: self.attached_charge_capacity(),
            telescope_range_km: attrs.telescope_range_km,
            telescope_fov_deg: attrs.telescope_fov_deg,
            telescope_max_rate_deg_s: 5.0,
            income_base: attrs.payload_base_income,
            thermal_resistance: self.thermal_resistance,
        };

        if self.stage == 0 {
            let unlocked: Vec<UpgradeId> = self.current_payload_unlocked();
            for modifier in modifiers_for(self.payload, &unlocked) {
                if modifier.only_deployed && self.stage != 0 {
                    continue;
                }
                modifier.apply(&mut stats);
            }
        }

        self.capable_forward_thrust = stats.forward_thrust_kn;
        self.capable_reverse_thrust = stats.reverse_thrust_kn;
        self.power_capacity = stats.power_capacity;
        self.thermal_resistance = stats.thermal_resistance;
        self.stats = stats;
    }
}
