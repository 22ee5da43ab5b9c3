//! Read-only content catalog: component, building, and resource definitions
//! plus server tuning. Loaded once at startup by `sa_world` and shared with
//! every operation; the core never mutates it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BuildingTypeId, ComponentTypeId, ResourceId};
use crate::AU_KM;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentCatalog {
    pub content_version: String,
    pub components: BTreeMap<ComponentTypeId, ComponentDef>,
    pub buildings: BTreeMap<BuildingTypeId, BuildingDef>,
    pub resources: BTreeMap<ResourceId, ResourceDef>,
}

impl ContentCatalog {
    pub fn component(&self, id: ComponentTypeId) -> Option<&ComponentDef> {
        self.components.get(&id)
    }

    pub fn building(&self, id: BuildingTypeId) -> Option<&BuildingDef> {
        self.buildings.get(&id)
    }

    /// Attributes for a component, or the all-zero defaults when unknown.
    pub fn attrs(&self, id: ComponentTypeId) -> ComponentAttributes {
        self.components
            .get(&id)
            .map(|c| c.attributes.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    #[serde(default)]
    pub cost: i64,
    #[serde(default)]
    pub mass_kg: f64,
    #[serde(default)]
    pub resource_cost: BTreeMap<ResourceId, u32>,
    #[serde(default)]
    pub attributes: ComponentAttributes,
}

/// One thrust group (forward / reverse / ccw / cw) of a component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrusterAttrs {
    /// kN at full burn.
    #[serde(default)]
    pub thrust_kn: f64,
    /// Catalog units; actual draw is `consumption · 0.003 · dt` kg.
    #[serde(default)]
    pub fuel_consumption: f64,
    /// Catalog units; hull heating is `heat · 0.001 · dt` °C.
    #[serde(default = "one")]
    pub fire_heat: f64,
    /// Nozzle offset in author coordinates (Y-down).
    #[serde(default)]
    pub output_point: Option<(f64, f64)>,
    /// Extra rotation of the exhaust axis, degrees.
    #[serde(default)]
    pub thrust_direction_deg: f64,
}

fn one() -> f64 {
    1.0
}

fn default_training_rate() -> f64 {
    0.1
}

fn default_rover_speed() -> f64 {
    1.0
}

fn default_telescope_range() -> f64 {
    AU_KM
}

fn default_telescope_fov() -> f64 {
    40.0
}

fn default_warp_tau() -> f64 {
    1000.0
}

fn default_jettison_radius() -> f64 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentAttributes {
    pub forward: ThrusterAttrs,
    pub reverse: ThrusterAttrs,
    pub ccw: ThrusterAttrs,
    pub cw: ThrusterAttrs,

    /// Tank capacity added to the component's stage, kg.
    pub liquid_fuel: f64,
    pub power_capacity: f64,
    pub solar_power: f64,
    pub nuclear_power: f64,
    pub armor: f64,
    pub aerodynamics: f64,
    pub cargo_capacity: u32,
    pub seats: u32,
    pub max_warp: f64,

    pub thermal_regulation: f64,
    pub thermal_regulation_power_draw: f64,
    pub magnetometer: f64,
    pub magnetometer_power_draw: f64,
    pub ion_drive: f64,
    pub ion_drive_power_draw: f64,
    pub warp_drive: f64,
    pub warp_drive_power_draw: f64,
    pub thermal_resistance: f64,

    pub is_payload: bool,
    pub stage_add: u32,
    pub stage_pre_add: u32,
    /// Payload deploys only while landed (rovers, landers).
    pub deploy_landed: bool,

    pub payload_base_income: f64,
    #[serde(default = "default_training_rate")]
    pub training_xp_rate: f64,
    #[serde(default = "default_rover_speed")]
    pub rover_km_per_sec: f64,
    #[serde(default = "default_telescope_range")]
    pub telescope_range_km: f64,
    #[serde(default = "default_telescope_fov")]
    pub telescope_fov_deg: f64,
    #[serde(default = "default_warp_tau")]
    pub warp_tau_s: f64,
    /// Radius of the part once jettisoned, km.
    #[serde(default = "default_jettison_radius")]
    pub jettison_radius_km: f64,
    /// `(planet name, building type)` auto-placed on first matching landing.
    pub build_on_land: Option<(String, BuildingTypeId)>,
}

impl Default for ComponentAttributes {
    fn default() -> Self {
        Self {
            forward: ThrusterAttrs::default(),
            reverse: ThrusterAttrs::default(),
            ccw: ThrusterAttrs::default(),
            cw: ThrusterAttrs::default(),
            liquid_fuel: 0.0,
            power_capacity: 0.0,
            solar_power: 0.0,
            nuclear_power: 0.0,
            armor: 0.0,
            aerodynamics: 0.0,
            cargo_capacity: 0,
            seats: 0,
            max_warp: 0.0,
            thermal_regulation: 0.0,
            thermal_regulation_power_draw: 0.0,
            magnetometer: 0.0,
            magnetometer_power_draw: 0.0,
            ion_drive: 0.0,
            ion_drive_power_draw: 0.0,
            warp_drive: 0.0,
            warp_drive_power_draw: 0.0,
            thermal_resistance: 0.0,
            is_payload: false,
            stage_add: 0,
            stage_pre_add: 0,
            deploy_landed: false,
            payload_base_income: 0.0,
            training_xp_rate: default_training_rate(),
            rover_km_per_sec: default_rover_speed(),
            telescope_range_km: default_telescope_range(),
            telescope_fov_deg: default_telescope_fov(),
            warp_tau_s: default_warp_tau(),
            jettison_radius_km: default_jettison_radius(),
            build_on_land: None,
        }
    }
}

/// Active behavior a building performs each second once constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildingRole {
    #[default]
    Generic,
    /// Keeps a minimum crew of astronauts on its planet.
    Headquarters,
    /// Rolls for resource yields into the base inventory.
    MiningRig,
    /// Refills landed vessels' current-stage tanks.
    RefuelingStation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildingDef {
    pub name: String,
    #[serde(default)]
    pub role: BuildingRole,
    #[serde(default)]
    pub cost: i64,
    /// Seconds of construction before the building comes online.
    #[serde(default)]
    pub build_time: u32,
    #[serde(default)]
    pub base_income: i64,
    /// Total cost to reach each level; level 1 is the built state.
    #[serde(default)]
    pub upgrade_costs: BTreeMap<u32, i64>,
    /// Effects granted at each level (inclusive of lower levels).
    #[serde(default)]
    pub unlocks: BTreeMap<u32, LevelUnlocks>,
}

impl BuildingDef {
    pub fn max_level(&self) -> u32 {
        self.upgrade_costs.keys().max().copied().unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelUnlocks {
    pub add_base_income: i64,
    pub add_satellite_income: f64,
    pub satellite_max_upgrade_tier: Option<u32>,
    pub probe_max_upgrade_tier: Option<u32>,
    pub add_base_storage: u32,
    pub unlock_buildings: Vec<BuildingTypeId>,
    pub unlock_components: Vec<ComponentTypeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    /// Credits per unit when sold from a base inventory. 0 = not sellable.
    #[serde(default)]
    pub sale_rate: i64,
}

/// Server-wide tuning knobs, read from the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTuning {
    pub starting_cash: i64,
    pub global_cash_multiplier: f64,
    pub global_thrust_multiplier: f64,
    /// Attitude (ccw/cw) thrust attenuation.
    pub attitude_thrust_scale: f64,
    /// Simulated seconds advanced per wall-clock second.
    pub sim_rate: f64,
    pub tick_rate: u32,
    pub autosave_interval_s: u64,
    /// Lifetime of jettisoned parts, seconds.
    pub jettison_lifetime_s: f64,
    /// Agency attribute defaults before building unlocks are folded in.
    pub default_satellite_bonus_income: f64,
    pub default_satellite_max_upgrade_tier: u32,
    pub default_probe_max_upgrade_tier: u32,
}

impl Default for ServerTuning {
    fn default() -> Self {
        Self {
            starting_cash: 100_000,
            global_cash_multiplier: 1.0,
            global_thrust_multiplier: 1.0,
            attitude_thrust_scale: 0.1,
            sim_rate: 1.0,
            tick_rate: 60,
            autosave_interval_s: 60,
            jettison_lifetime_s: 120.0,
            default_satellite_bonus_income: 0.0,
            default_satellite_max_upgrade_tier: 1,
            default_probe_max_upgrade_tier: 1,
        }
    }
}

impl ServerTuning {
    /// Simulated seconds advanced per physics tick.
    pub fn simsec_per_tick(&self) -> f64 {
        self.sim_rate / f64::from(self.tick_rate.max(1))
    }

    /// Convert a sim-time step to wall-clock seconds.
    pub fn real_seconds(&self, dt: f64) -> f64 {
        dt / self.sim_rate.max(1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_deserialize_with_defaults() {
        let a: ComponentAttributes = serde_json::from_str("{}").unwrap();
        assert_eq!(a.telescope_fov_deg, 40.0);
        assert_eq!(a.warp_tau_s, 1000.0);
        assert_eq!(a.training_xp_rate, 0.1);
        assert!(!a.is_payload);
    }

    #[test]
    fn thruster_heat_defaults_to_one() {
        let t: ThrusterAttrs = serde_json::from_str("{\"thrust_kn\": 50.0}").unwrap();
        assert_eq!(t.fire_heat, 1.0);
        assert_eq!(t.thrust_kn, 50.0);
    }

    #[test]
    fn real_seconds_divides_by_sim_rate() {
        let tuning = ServerTuning {
            sim_rate: 4.0,
            ..ServerTuning::default()
        };
        assert!((tuning.real_seconds(2.0) - 0.5).abs() < 1e-12);
        assert!((tuning.simsec_per_tick() - 4.0 / 60.0).abs() < 1e-12);
    }
}
