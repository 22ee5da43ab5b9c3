//! Vessels: staged, player-built physical objects.
//!
//! A vessel is a rigid aggregate of attached components with per-stage fuel
//! and charge pools, a payload behavior, and an upgrade set scoped to the
//! payload kind. The per-tick update follows a fixed order; see [`Vessel::tick`].

mod construction;
mod flight;
mod staging;
mod stats;
mod systems;
mod thermal;

pub use construction::{construct_vessel, ConstructError, VesselRequest};
pub use staging::{assign_stages, detect_payload_index, StagingNode};
pub use stats::{modifiers_for, Modifier, Op, StatPath, VesselStats};
pub use systems::{ElectricalSystem, SystemKind, WarpState};

use std::collections::{BTreeMap, BTreeSet};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::chunk::{BodySnap, ChunkBodies, ChunkKey, PeerVessel};
use crate::content::{ContentCatalog, ServerTuning};
use crate::ids::{
    AgencyId, AstronautId, ComponentTypeId, ObjectId, PlayerId, ResourceId, UpgradeId,
};
use crate::math::Vec2;
use crate::object::Debris;
use crate::outbox::{Audience, Outbox};
use crate::payload::{self, PayloadBehavior};
use crate::region::{RegionId, REGION_UNDEFINED};
use crate::upgrades;
use crate::wire;
use crate::world::{Directory, RejectReason};
use crate::{AU_KM, C_KM_S};

/// Control bytes accepted on the ordered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VesselControl {
    ForwardEngage = 0x00,
    ForwardDisengage = 0x01,
    ReverseEngage = 0x02,
    ReverseDisengage = 0x03,
    CcwEngage = 0x04,
    CcwDisengage = 0x05,
    CwEngage = 0x06,
    CwDisengage = 0x07,
    RequestControl = 0x08,
    DeployStage = 0x09,
    SetTelescopeTargetAngle = 0x0A,
    SetSystemState = 0x0B,
}

impl VesselControl {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::ForwardEngage,
            0x01 => Self::ForwardDisengage,
            0x02 => Self::ReverseEngage,
            0x03 => Self::ReverseDisengage,
            0x04 => Self::CcwEngage,
            0x05 => Self::CcwDisengage,
            0x06 => Self::CwEngage,
            0x07 => Self::CwDisengage,
            0x08 => Self::RequestControl,
            0x09 => Self::DeployStage,
            0x0A => Self::SetTelescopeTargetAngle,
            0x0B => Self::SetSystemState,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlBit {
    Forward,
    Reverse,
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub forward: bool,
    pub reverse: bool,
    pub ccw: bool,
    pub cw: bool,
}

impl ControlState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn any_linear(&self) -> bool {
        self.forward || self.reverse
    }
}

/// One placed component, in author-local coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedComponent {
    pub kind: ComponentTypeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub paint1: u32,
    #[serde(default)]
    pub paint2: u32,
    #[serde(default)]
    pub stage: u32,
}

/// Outcome of drawing fuel from the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnOutcome {
    Burned,
    /// Tank came up short; the bit should drop and, when `auto_stage` is set,
    /// the empty tank stage should deploy away.
    Short { auto_stage: bool },
}

/// Throttle accumulators for rate-limited instrument pushes. Transient.
#[derive(Debug, Clone, Default)]
pub struct PushThrottles {
    pub magnetometer_s: f64,
    pub upgrade_tree_s: f64,
    pub sight_s: f64,
    pub last_sight: Option<Vec<ObjectId>>,
}

/// Everything a vessel operation needs from the rest of the world. Built by
/// the chunk during the tick and by the world for control-path operations.
pub struct VesselCtx<'a> {
    pub catalog: &'a ContentCatalog,
    pub tuning: &'a ServerTuning,
    pub bodies: &'a ChunkBodies,
    pub peers: &'a [PeerVessel],
    pub dir: &'a mut Directory,
    pub outbox: &'a mut Outbox,
    pub chunk: ChunkKey,
    /// Debris spawned this pass; the chunk registers them afterwards.
    pub debris_out: &'a mut Vec<Debris>,
    pub next_object_id: &'a mut u64,
    pub rng: &'a mut dyn RngCore,
}

impl VesselCtx<'_> {
    pub fn alloc_object_id(&mut self) -> ObjectId {
        let id = ObjectId(*self.next_object_id);
        *self.next_object_id += 1;
        id
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Vessel {
    pub id: ObjectId,
    pub name: String,
    pub agency: AgencyId,
    pub constructed_by: PlayerId,

    // Physics state.
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass_kg: f64,
    pub radius_km: f64,
    pub rotation_deg: f64,
    pub rotation_vel_deg_s: f64,
    pub center_of_mass: Vec2,

    // Structure.
    pub components: Vec<AttachedComponent>,
    pub stage: u32,
    pub num_stages: u32,
    /// Component kind of the stage-0 payload; 0 = none.
    pub payload: ComponentTypeId,
    pub fuel_by_stage: BTreeMap<u32, f64>,
    pub fuel_capacity_by_stage: BTreeMap<u32, f64>,
    pub charge_by_stage: BTreeMap<u32, f64>,
    pub charge_capacity_by_stage: BTreeMap<u32, f64>,
    pub systems: BTreeMap<SystemKind, ElectricalSystem>,

    // Cached aggregates, rebuilt by `rebuild_stats`.
    pub dry_mass_kg: f64,
    pub capable_forward_thrust: f64,
    pub capable_reverse_thrust: f64,
    pub solar_rate: f64,
    pub nuclear_rate: f64,
    pub armor: f64,
    pub aerodynamics: f64,
    pub cargo_capacity: u32,
    pub seat_capacity: u32,
    pub max_warp: f64,
    pub thermal_resistance: f64,
    pub power: f64,
    pub power_capacity: f64,
    /// Current-stage mirrors for telemetry.
    pub fuel_kg: f64,
    pub fuel_capacity_kg: f64,
    #[serde(default)]
    pub stats: VesselStats,

    // Control.
    #[serde(default)]
    pub controlled_by: PlayerId,
    #[serde(default)]
    pub control: ControlState,

    // Flight.
    pub home_body: Option<ObjectId>,
    pub launch_body: Option<ObjectId>,
    pub landed: bool,
    pub landed_angle_offset: f64,
    pub altitude_km: f64,
    pub z_velocity: f64,
    #[serde(default)]
    pub landing_progress: f64,
    #[serde(default)]
    pub takeoff_grace_s: f64,
    pub hull_integrity: f64,
    pub temperature_c: f64,
    pub max_operating_temp_c: f64,
    #[serde(default)]
    pub ambient_temp_k: f64,
    #[serde(default)]
    pub manned_mission_time_days: f64,
    #[serde(default)]
    pub warp: WarpState,

    // Income.
    pub lifetime_revenue: u64,
    #[serde(default)]
    pub revenue_carry: f64,

    // Exploration.
    #[serde(default)]
    pub region: RegionId,
    #[serde(default)]
    pub regions_visited: Vec<RegionId>,
    #[serde(default)]
    pub planets_visited: Vec<ObjectId>,
    #[serde(default)]
    pub last_landed_body: Option<ObjectId>,
    #[serde(default)]
    pub build_on_land_fired: bool,

    // Payload gear.
    #[serde(default)]
    pub cargo: BTreeMap<ResourceId, u32>,
    #[serde(default)]
    pub astronauts_onboard: SmallVec<[AstronautId; 8]>,
    #[serde(default)]
    pub unlocked_by_payload: BTreeMap<ComponentTypeId, BTreeSet<UpgradeId>>,
    #[serde(default)]
    pub telescope_target_deg: f64,
    #[serde(default)]
    pub deployment_ready: bool,
    /// Map-scale travel: set once the vessel has left every entry radius and
    /// may therefore enter a system or galaxy point. Cleared on arrival.
    #[serde(default)]
    pub map_entry_armed: bool,

    // Transient.
    #[serde(skip)]
    pub strongest_source: Option<ObjectId>,
    #[serde(skip)]
    pub strongest_force: f64,
    #[serde(skip)]
    pub last_forward_thrust_kn: f64,
    #[serde(skip)]
    pub sight: Vec<ObjectId>,
    #[serde(skip)]
    pub throttles: PushThrottles,
    #[serde(skip)]
    pub behavior: Option<Box<dyn PayloadBehavior>>,
    #[serde(skip)]
    pub destroyed: bool,
}

impl Vessel {
    /// A vessel with no components and every gauge at its initial value.
    /// Construction and loading fill in the rest.
    pub fn new_empty(id: ObjectId, name: String, agency: AgencyId, constructed_by: PlayerId) -> Self {
        Self {
            id,
            name,
            agency,
            constructed_by,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            mass_kg: 0.0,
            radius_km: 10.0,
            rotation_deg: 0.0,
            rotation_vel_deg_s: 0.0,
            center_of_mass: Vec2::ZERO,
            components: Vec::new(),
            stage: 0,
            num_stages: 1,
            payload: ComponentTypeId(0),
            fuel_by_stage: BTreeMap::new(),
            fuel_capacity_by_stage: BTreeMap::new(),
            charge_by_stage: BTreeMap::new(),
            charge_capacity_by_stage: BTreeMap::new(),
            systems: BTreeMap::new(),
            dry_mass_kg: 0.0,
            capable_forward_thrust: 0.0,
            capable_reverse_thrust: 0.0,
            solar_rate: 0.0,
            nuclear_rate: 0.0,
            armor: 0.0,
            aerodynamics: 0.0,
            cargo_capacity: 0,
            seat_capacity: 0,
            max_warp: 0.0,
            thermal_resistance: 100.0,
            power: 0.0,
            power_capacity: 0.0,
            fuel_kg: 0.0,
            fuel_capacity_kg: 0.0,
            stats: VesselStats::default(),
            controlled_by: PlayerId(0),
            control: ControlState::default(),
            home_body: None,
            launch_body: None,
            landed: false,
            landed_angle_offset: 0.0,
            altitude_km: 0.0,
            z_velocity: 0.0,
            landing_progress: 0.0,
            takeoff_grace_s: 0.0,
            hull_integrity: 100.0,
            temperature_c: 20.0,
            max_operating_temp_c: 100.0,
            ambient_temp_k: 2.7,
            manned_mission_time_days: 0.0,
            warp: WarpState::default(),
            lifetime_revenue: 0,
            revenue_carry: 0.0,
            region: REGION_UNDEFINED,
            regions_visited: Vec::new(),
            planets_visited: Vec::new(),
            last_landed_body: None,
            build_on_land_fired: false,
            cargo: BTreeMap::new(),
            astronauts_onboard: SmallVec::new(),
            unlocked_by_payload: BTreeMap::new(),
            telescope_target_deg: 0.0,
            deployment_ready: false,
            map_entry_armed: false,
            strongest_source: None,
            strongest_force: 0.0,
            last_forward_thrust_kn: 0.0,
            sight: Vec::new(),
            throttles: PushThrottles::default(),
            behavior: None,
            destroyed: false,
        }
    }

    pub fn has_payload(&self) -> bool {
        self.payload.0 != 0
    }

    pub fn is_controlled(&self) -> bool {
        self.controlled_by.0 != 0
    }

    /// Accumulate income; whole units flow into lifetime revenue and the
    /// fraction carries.
    pub fn credit_income(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        self.revenue_carry += amount;
        let whole = self.revenue_carry.trunc();
        if whole >= 1.0 {
            self.lifetime_revenue += whole as u64;
            self.revenue_carry -= whole;
        }
    }

    // === Upgrades ===

    pub fn current_payload_unlocked(&self) -> Vec<UpgradeId> {
        self.unlocked_by_payload
            .get(&self.payload)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_upgrade(&self, id: UpgradeId) -> bool {
        self.unlocked_by_payload
            .get(&self.payload)
            .is_some_and(|set| set.contains(&id))
    }

    fn max_tier_for_payload(&self, attrs: &crate::agency::AgencyAttributes) -> u32 {
        match self.payload {
            payload::kinds::COMMS_SATELLITE => attrs.satellite_max_upgrade_tier,
            payload::kinds::PROBE => attrs.probe_max_upgrade_tier,
            _ => u32::MAX,
        }
    }

    /// Upgrades not yet unlocked, with whether they are purchasable now
    /// (prerequisites met and tier within the agency gate).
    pub fn unlockable_upgrades(
        &self,
        attrs: &crate::agency::AgencyAttributes,
    ) -> Vec<(UpgradeId, bool)> {
        if !self.has_payload() || self.stage != 0 {
            return Vec::new();
        }
        let have: BTreeSet<UpgradeId> = self.current_payload_unlocked().into_iter().collect();
        let max_tier = self.max_tier_for_payload(attrs);
        upgrades::tree_for_payload(self.payload)
            .iter()
            .filter(|node| !have.contains(&node.id))
            .map(|node| {
                let can = node.requires.iter().all(|req| have.contains(req)) && node.tier <= max_tier;
                (node.id, can)
            })
            .collect()
    }

    /// Unlock an upgrade for the current payload, charging the player.
    pub fn try_unlock_upgrade(
        &mut self,
        player: &mut crate::player::Player,
        attrs: &crate::agency::AgencyAttributes,
        upgrade: UpgradeId,
        catalog: &ContentCatalog,
    ) -> Result<(), RejectReason> {
        if !self.has_payload() || self.stage != 0 {
            return Err(RejectReason::NotDeployed);
        }
        let node = upgrades::node(self.payload, upgrade).ok_or(RejectReason::UnknownKind)?;
        let have: BTreeSet<UpgradeId> = self.current_payload_unlocked().into_iter().collect();
        if have.contains(&upgrade) {
            return Err(RejectReason::BadRequest);
        }
        if !node.requires.iter().all(|req| have.contains(req)) {
            return Err(RejectReason::BadRequest);
        }
        if node.tier > self.max_tier_for_payload(attrs) {
            return Err(RejectReason::BadRequest);
        }
        if player.money < node.cost_money {
            return Err(RejectReason::InsufficientFunds);
        }
        player.money -= node.cost_money;
        self.unlocked_by_payload
            .entry(self.payload)
            .or_default()
            .insert(upgrade);
        self.apply_stats(catalog);
        Ok(())
    }

    /// Upgrade-tree snapshot frame for this vessel, or `None` before
    /// deployment.
    pub fn upgrade_tree_frame(&self, attrs: &crate::agency::AgencyAttributes) -> Option<Vec<u8>> {
        if !self.has_payload() || self.stage != 0 {
            return None;
        }
        let unlocked = self.current_payload_unlocked();
        let purchasable: Vec<(UpgradeId, u64)> = self
            .unlockable_upgrades(attrs)
            .into_iter()
            .filter(|(_, can)| *can)
            .filter_map(|(id, _)| {
                upgrades::node(self.payload, id).map(|n| (id, n.cost_money.max(0) as u64))
            })
            .collect();
        Some(wire::upgrade_tree(self.id, &unlocked, &purchasable))
    }

    // === Power pool (attached stages, current stage first) ===

    pub fn attached_charge_capacity(&self) -> f64 {
        self.charge_capacity_by_stage
            .iter()
            .filter(|(s, _)| **s <= self.stage)
            .map(|(_, c)| *c)
            .sum()
    }

    pub fn attached_charge(&self) -> f64 {
        self.charge_by_stage
            .iter()
            .filter(|(s, _)| **s <= self.stage)
            .map(|(_, c)| *c)
            .sum()
    }

    /// Consume from the attached pool, stage-by-stage from the current stage
    /// downward. A partial draw is kept; returns false when short.
    pub fn draw_power(&mut self, amount: f64) -> bool {
        if amount <= 0.0 {
            return true;
        }
        let mut remaining = amount;
        for stage in (0..=self.stage).rev() {
            let Some(charge) = self.charge_by_stage.get_mut(&stage) else {
                continue;
            };
            if *charge <= 0.0 {
                continue;
            }
            let take = charge.min(remaining);
            *charge -= take;
            remaining -= take;
            if remaining <= 0.0 {
                break;
            }
        }
        self.power = self.attached_charge().min(self.attached_charge_capacity());
        remaining <= 0.0
    }

    /// Add charge, filling the current stage first, then descending.
    pub fn charge_power(&mut self, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        let mut remaining = amount;
        for stage in (0..=self.stage).rev() {
            let cap = self
                .charge_capacity_by_stage
                .get(&stage)
                .copied()
                .unwrap_or(0.0);
            let charge = self.charge_by_stage.entry(stage).or_insert(0.0);
            let room = (cap - *charge).max(0.0);
            if room <= 0.0 {
                continue;
            }
            let put = room.min(remaining);
            *charge += put;
            remaining -= put;
            if remaining <= 0.0 {
                break;
            }
        }
        self.power = self.attached_charge().min(self.attached_charge_capacity());
    }

    /// State of charge in [0, 1].
    pub fn state_of_charge(&self) -> f64 {
        let cap = self.power_capacity;
        if cap <= 0.0 {
            0.0
        } else {
            self.power / cap
        }
    }

    // === Fuel (current stage only feeds thrust) ===

    pub fn current_stage_capacity(&self) -> f64 {
        self.fuel_capacity_by_stage
            .get(&self.stage)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn current_stage_fuel(&self) -> f64 {
        self.fuel_by_stage.get(&self.stage).copied().unwrap_or(0.0)
    }

    pub fn set_current_stage_fuel(&mut self, value: f64) {
        let cap = self.current_stage_capacity();
        self.fuel_by_stage
            .insert(self.stage, value.clamp(0.0, cap));
    }

    pub fn attached_fuel(&self) -> f64 {
        self.fuel_by_stage
            .iter()
            .filter(|(s, _)| **s <= self.stage)
            .map(|(_, f)| *f)
            .sum()
    }

    pub fn recompute_mass(&mut self, catalog: &ContentCatalog) {
        let dry: f64 = self
            .components
            .iter()
            .filter_map(|c| catalog.component(c.kind))
            .map(|d| d.mass_kg)
            .sum();
        self.dry_mass_kg = dry;
        self.mass_kg = dry + self.attached_fuel();
    }

    /// Draw `kg` from the current stage. On shortfall the tank snaps to zero
    /// and, when this stage actually has tanks, the caller should auto-stage.
    pub fn burn_current_stage(&mut self, kg: f64, catalog: &ContentCatalog) -> BurnOutcome {
        const FUEL_EPS: f64 = 1e-6;
        if kg <= 0.0 {
            return BurnOutcome::Burned;
        }
        let current = self.current_stage_fuel();
        let has_tanks = self.current_stage_capacity() > 0.0;

        if current <= FUEL_EPS || current < kg {
            self.set_current_stage_fuel(0.0);
            self.fuel_kg = 0.0;
            self.recompute_mass(catalog);
            return BurnOutcome::Short {
                auto_stage: has_tanks,
            };
        }

        self.set_current_stage_fuel(current - kg);
        self.fuel_kg = self.current_stage_fuel();
        self.recompute_mass(catalog);
        if self.fuel_kg <= FUEL_EPS && has_tanks {
            self.set_current_stage_fuel(0.0);
            self.fuel_kg = 0.0;
            return BurnOutcome::Short { auto_stage: true };
        }
        BurnOutcome::Burned
    }

    // === Cargo ===

    pub fn cargo_total(&self) -> u32 {
        self.cargo.values().sum()
    }

    pub fn cargo_free(&self) -> u32 {
        self.cargo_capacity.saturating_sub(self.cargo_total())
    }

    /// Returns how many units were actually added (clamped by free space).
    pub fn add_cargo(&mut self, resource: ResourceId, amount: u32) -> u32 {
        let put = amount.min(self.cargo_free());
        if put > 0 {
            *self.cargo.entry(resource).or_insert(0) += put;
        }
        put
    }

    pub fn remove_cargo(&mut self, resource: ResourceId, amount: u32) -> u32 {
        let have = self.cargo.get(&resource).copied().unwrap_or(0);
        let take = amount.min(have);
        if take == 0 {
            return 0;
        }
        if take == have {
            self.cargo.remove(&resource);
        } else {
            self.cargo.insert(resource, have - take);
        }
        take
    }

    /// Discard overflow after staging shrinks capacity, largest stacks first.
    /// Returns units trimmed.
    pub fn trim_cargo_to_capacity(&mut self) -> u32 {
        let total = self.cargo_total();
        if total <= self.cargo_capacity {
            return 0;
        }
        let mut to_trim = total - self.cargo_capacity;
        let trimmed = to_trim;
        let mut stacks: Vec<(ResourceId, u32)> =
            self.cargo.iter().map(|(r, c)| (*r, *c)).collect();
        stacks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (resource, count) in stacks {
            if to_trim == 0 {
                break;
            }
            let take = count.min(to_trim);
            self.remove_cargo(resource, take);
            to_trim -= take;
        }
        trimmed
    }

    // === Systems ===

    pub fn add_system(&mut self, kind: SystemKind, amount: f64, draw: f64, active: bool) {
        if amount <= 0.0 {
            return;
        }
        self.systems
            .entry(kind)
            .and_modify(|sys| {
                sys.amount += amount;
                sys.power_draw += draw;
                sys.active |= active;
            })
            .or_insert(ElectricalSystem {
                kind,
                amount,
                power_draw: draw,
                active,
            });
    }

    pub fn set_system_state(&mut self, kind: SystemKind, active: bool) {
        if let Some(sys) = self.systems.get_mut(&kind) {
            sys.active = active;
        }
    }

    // === Behavior plumbing ===

    pub fn ensure_behavior(&mut self) {
        if !self.has_payload() {
            self.behavior = None;
            return;
        }
        let current = self
            .behavior
            .as_ref()
            .is_some_and(|b| b.payload_id() == self.payload);
        if !current {
            self.behavior = payload::make_behavior(self.payload);
        }
    }

    fn run_payload_tick(&mut self, dt: f64, ctx: &mut VesselCtx) {
        if self.stage != 0 || !self.has_payload() {
            return;
        }
        self.ensure_behavior();
        let mut behavior = self.behavior.take();
        if let Some(b) = behavior.as_mut() {
            b.on_tick(self, ctx, dt);
        }
        if self.behavior.is_none() {
            self.behavior = behavior;
        }
    }

    // === Geometry ===

    /// Convert a component-local point (physics space, Y-up) to world space,
    /// honoring the center of mass and current rotation.
    pub fn component_world_position(&self, local: Vec2) -> Vec2 {
        let rel = local - self.center_of_mass;
        let rot = (-self.rotation_deg + 90.0).to_radians();
        let (sin, cos) = rot.sin_cos();
        self.position + Vec2::new(rel.x * cos - rel.y * sin, rel.x * sin + rel.y * cos)
    }

    /// Author nozzle offsets are Y-down; physics space is Y-up.
    pub fn nozzle_local_point(comp: &AttachedComponent, point: Option<(f64, f64)>) -> Vec2 {
        match point {
            Some((px, py)) => Vec2::new(comp.x + px, comp.y - py),
            None => Vec2::new(comp.x, comp.y),
        }
    }

    // === Staging ===

    /// Drop the current stage. Ignored at stage 0 and, unless forced, when
    /// the vessel is not deployment-ready.
    pub fn deploy_stage(&mut self, force: bool, ctx: &mut VesselCtx) {
        if self.stage == 0 {
            return;
        }
        if !force && !self.deployment_ready {
            return;
        }

        self.stage -= 1;
        self.deployment_ready = false;

        // When dropping to the payload, keep the payload's world position
        // continuous across the CoM change.
        let payload_world_pre = (self.stage == 0)
            .then(|| {
                self.components
                    .iter()
                    .find(|c| c.stage == 0)
                    .or_else(|| self.components.iter().find(|c| c.kind == self.payload))
                    .map(|c| self.component_world_position(Vec2::new(c.x, c.y)))
            })
            .flatten();

        let dropped: Vec<AttachedComponent> = self
            .components
            .iter()
            .filter(|c| c.stage > self.stage)
            .cloned()
            .collect();
        for comp in &dropped {
            self.spawn_jettisoned(comp, ctx);
        }

        self.drop_components(ctx.catalog);
        self.trim_cargo_to_capacity();

        if let Some(world) = payload_world_pre {
            self.position = world;
        }

        self.control.clear();

        ctx.outbox.ordered(
            Audience::Chunk(ctx.chunk),
            wire::force_resolve(
                self.id,
                self.position.x,
                self.position.y,
                self.rotation_deg as f32,
                self.stage as u16,
            ),
        );

        if self.stage == 0 {
            self.ensure_behavior();
            let mut behavior = self.behavior.take();
            if let Some(b) = behavior.as_mut() {
                b.on_attach(self, ctx);
            }
            if self.behavior.is_none() {
                self.behavior = behavior;
            }
            self.apply_stats(ctx.catalog);
            if let Some(agency) = ctx.dir.agencies.get(&self.agency) {
                if let Some(frame) = self.upgrade_tree_frame(&agency.attributes) {
                    ctx.outbox.datagram(Audience::Agency(self.agency), frame);
                }
            }
        } else {
            self.apply_stats(ctx.catalog);
        }
    }

    fn drop_components(&mut self, catalog: &ContentCatalog) {
        let stage = self.stage;
        self.components.retain(|c| c.stage <= stage);
        self.fuel_by_stage.retain(|s, _| *s <= stage);
        self.fuel_capacity_by_stage.retain(|s, _| *s <= stage);
        self.charge_by_stage.retain(|s, _| *s <= stage);
        self.charge_capacity_by_stage.retain(|s, _| *s <= stage);
        self.rebuild_stats(catalog);
    }

    fn spawn_jettisoned(&mut self, comp: &AttachedComponent, ctx: &mut VesselCtx) {
        let def_mass = ctx
            .catalog
            .component(comp.kind)
            .map_or(1.0, |d| d.mass_kg.max(1.0));
        let attrs = ctx.catalog.attrs(comp.kind);
        let world = self.component_world_position(Vec2::new(comp.x, comp.y));

        // Small radial push away from the hull.
        const PUSH_KM_S: f64 = 0.1;
        let offset = world - self.position;
        let dir = if offset.length() > 0.0 {
            offset.normalized_or_x()
        } else {
            let ang = (self.rotation_deg - 90.0).to_radians();
            Vec2::new(ang.cos(), ang.sin())
        };

        let debris = Debris {
            id: ctx.alloc_object_id(),
            component_type: comp.kind,
            agency: self.agency,
            position: world,
            velocity: self.velocity + dir.scaled(PUSH_KM_S),
            mass_kg: def_mass,
            radius_km: attrs.jettison_radius_km,
            rotation_deg: self.rotation_deg,
            lifetime_s: ctx.tuning.jettison_lifetime_s,
        };
        ctx.debris_out.push(debris);
    }

    pub fn auto_stage_if_empty(&mut self, ctx: &mut VesselCtx) {
        if self.stage > 0
            && self.current_stage_capacity() > 0.0
            && self.current_stage_fuel() <= 0.0
        {
            self.deploy_stage(true, ctx);
        }
    }

    // === Deployment readiness ===

    pub fn check_deployment_ready(&mut self, catalog: &ContentCatalog, bodies: &ChunkBodies) {
        self.deployment_ready = false;
        if !self.has_payload() || self.stage != 1 {
            return;
        }
        let Some(home) = self.home_body.and_then(|id| bodies.get(id)) else {
            return;
        };
        if catalog.attrs(self.payload).deploy_landed {
            // Rovers and landers deploy on the ground.
            self.deployment_ready = self.landed;
        } else {
            self.deployment_ready = !self.landed && self.altitude_km >= home.atmosphere_km * 0.98;
        }
    }

    // === Regions ===

    /// Apply a region classification from the gravity pass. First entry into
    /// a region pushes an audio cue to the controller, except for the body the
    /// vessel departed from.
    pub fn update_region(
        &mut self,
        planet: &BodySnap,
        new_region: Option<RegionId>,
        outbox: &mut Outbox,
    ) {
        let new_region = new_region.unwrap_or(REGION_UNDEFINED);
        if new_region == self.region {
            return;
        }
        self.region = new_region;

        if new_region == REGION_UNDEFINED || self.regions_visited.contains(&new_region) {
            return;
        }
        self.regions_visited.push(new_region);

        let origin = self.last_landed_body.or(self.launch_body);
        if origin == Some(planet.id) {
            return;
        }
        if self.is_controlled() {
            outbox.datagram(
                Audience::Player(self.controlled_by),
                wire::region_cue(self.id, new_region),
            );
        }
    }

    /// Per-planet income multiplier for the vessel's current location.
    pub fn planet_income_multiplier(&self, dir: &Directory) -> f64 {
        let Some(source) = self.strongest_source else {
            return 1.0;
        };
        let Some(agency) = dir.agencies.get(&self.agency) else {
            return 1.0;
        };
        let m = agency.multipliers.get(&source).copied().unwrap_or(1.0);
        if m.is_finite() && m > 0.0 {
            m
        } else {
            1.0
        }
    }

    // === Landing state ===

    fn rehome_to_strongest(&mut self, bodies: &ChunkBodies) {
        if self.landed {
            return;
        }
        let Some(src) = self.strongest_source else {
            return;
        };
        if Some(src) == self.home_body {
            return;
        }
        let Some(snap) = bodies.get(src) else { return };
        if !snap.is_planet() {
            return;
        }
        self.home_body = Some(src);
        self.altitude_km = snap.atmosphere_km;
        self.z_velocity = 0.0;
        self.deployment_ready = false;
    }

    fn tick_landing_initiation(&mut self, dt: f64, bodies: &ChunkBodies) {
        if self.landed {
            self.landing_progress = 0.0;
            return;
        }
        let Some(home) = self.home_body.and_then(|id| bodies.get(id)) else {
            self.landing_progress = 0.0;
            return;
        };
        let in_space = self.altitude_km >= home.atmosphere_km - 1e-6;
        if !in_space {
            self.landing_progress = 0.0;
            return;
        }
        let dist = self.position.distance(home.position);
        if dist <= home.radius_km + 1e-6 {
            self.landing_progress = (self.landing_progress + dt.max(0.0)).min(6.0);
        } else {
            self.landing_progress = 0.0;
            return;
        }
        if self.landing_progress >= 6.0 && self.altitude_km >= home.atmosphere_km - 1e-6 {
            self.altitude_km = (home.atmosphere_km - 1.0).max(0.0);
            if self.z_velocity > 0.0 {
                self.z_velocity = 0.0;
            }
            self.landing_progress = 6.0;
        }
    }

    pub(crate) fn land(&mut self, ctx: &mut VesselCtx) {
        let Some(home_id) = self.home_body else { return };
        let Some(home) = ctx.bodies.get(home_id).cloned() else {
            return;
        };

        self.landed = true;
        self.altitude_km = 0.0;
        self.z_velocity = 0.0;
        self.rotation_vel_deg_s = 0.0;
        self.velocity = home.velocity;
        self.landing_progress = 0.0;

        let prev = self.last_landed_body;
        self.ensure_behavior();
        let mut behavior = self.behavior.take();
        if let Some(b) = behavior.as_mut() {
            b.on_land(self, ctx, &home, prev);
        }
        if self.behavior.is_none() {
            self.behavior = behavior;
        }

        if !self.planets_visited.contains(&home_id) {
            self.planets_visited.push(home_id);
        }
        self.last_landed_body = Some(home_id);

        if let Some(agency) = ctx.dir.agencies.get_mut(&self.agency) {
            agency.visited_planets.insert(home_id);
            agency.discover_planet(home_id);
        }
    }

    fn stay_landed(&mut self, bodies: &ChunkBodies) {
        let Some(home) = self.home_body.and_then(|id| bodies.get(id)) else {
            return;
        };
        self.velocity = home.velocity;
        self.z_velocity = 0.0;
        self.rotation_vel_deg_s = 0.0;
        self.altitude_km = 0.0;

        let world_deg = -(home.rotation_deg + self.landed_angle_offset);
        let ang = world_deg.to_radians();
        self.position = home.position + Vec2::new(ang.cos(), ang.sin()).scaled(home.radius_km);
        self.rotation_deg = -world_deg;
    }

    fn should_unland(&self) -> bool {
        self.control.forward
    }

    pub(crate) fn unland(&mut self, ctx: &mut VesselCtx) {
        self.landed = false;
        self.altitude_km = 0.1;
        self.z_velocity = 0.2;
        self.takeoff_grace_s = 0.75;
        self.landing_progress = 0.0;

        let home = self.home_body.and_then(|id| ctx.bodies.get(id)).cloned();
        if let Some(home) = home {
            self.ensure_behavior();
            let mut behavior = self.behavior.take();
            if let Some(b) = behavior.as_mut() {
                b.on_unland(self, ctx, &home);
            }
            if self.behavior.is_none() {
                self.behavior = behavior;
            }
        }
    }

    // === Destruction ===

    pub fn destroy(&mut self, ctx: &mut VesselCtx) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        ctx.outbox
            .datagram(Audience::Chunk(ctx.chunk), wire::vessel_destroyed(self.id));

        if self.is_controlled() {
            let pilot = self.controlled_by;
            self.controlled_by = PlayerId(0);
            if let Some(player) = ctx.dir.players.get_mut(&pilot) {
                if player.controlled_vessel == Some(self.id) {
                    player.controlled_vessel = None;
                }
            }
        }

        if let Some(agency) = ctx.dir.agencies.get_mut(&self.agency) {
            let stranded = self.astronauts_onboard.len() as u64;
            if stranded > 0 {
                agency.stranded_astronauts += stranded;
                for astro in &self.astronauts_onboard {
                    agency.astronauts.remove(astro);
                }
            }
            agency.remove_vessel(self.id);
        }

        self.mass_kg = 0.0;
        self.components.clear();
    }

    // === Tick ===

    /// One simulation step. `external_acc` is the clamped gravity acceleration
    /// computed by the chunk's pairwise pass.
    pub fn tick(&mut self, dt: f64, external_acc: Vec2, ctx: &mut VesselCtx) {
        self.last_forward_thrust_kn = 0.0;

        if !self.landed {
            self.rehome_to_strongest(ctx.bodies);
        }
        self.tick_landing_initiation(dt, ctx.bodies);

        self.apply_ion_drive(dt, ctx);
        self.apply_warp(dt, ctx);

        if self.control.forward {
            self.apply_forward_thrust(dt, ctx);
        }
        if self.control.ccw {
            self.apply_ccw_thrust(dt, ctx);
        }
        if self.control.cw {
            self.apply_cw_thrust(dt, ctx);
        }
        if self.control.reverse {
            self.apply_reverse_thrust(dt, ctx);
        }

        if self.landed {
            if self.should_unland() {
                self.unland(ctx);
            } else {
                self.stay_landed(ctx.bodies);
            }
        } else {
            self.update_altitude(dt, ctx);
        }
        if self.destroyed {
            return;
        }

        if self.landed {
            self.manned_mission_time_days = 0.0;
        } else if !self.astronauts_onboard.is_empty() {
            self.manned_mission_time_days += dt.max(0.0) / 86_400.0;
        }

        self.rotation_deg += self.rotation_vel_deg_s * dt;

        if !self.landed {
            self.velocity += external_acc.scaled(dt);
            self.position += self.velocity.scaled(dt);
            self.ground_influence(dt, ctx.bodies);
        }

        self.run_payload_tick(dt, ctx);

        self.cool_towards_ambient(dt, ctx);
        self.take_temperature_damage(dt);
        self.check_deployment_ready(ctx.catalog, ctx.bodies);

        if self.hull_integrity < 0.0 {
            self.destroy(ctx);
            return;
        }

        let real_dt = ctx.tuning.real_seconds(dt);
        self.tick_upgrade_tree_push(real_dt, ctx);
        self.tick_magnetometer(real_dt, ctx);

        let mut solar_eff = 0.0;
        if self.solar_rate > 0.0 {
            solar_eff = self.solar_efficiency();
            self.charge_power(self.solar_rate * real_dt * solar_eff);
        }
        if self.nuclear_rate > 0.0 {
            self.charge_power(self.nuclear_rate * real_dt);
        }

        if !self.warp.active_this_tick {
            let speed = self.velocity.length();
            if speed > C_KM_S {
                self.velocity = self.velocity.scaled(C_KM_S / speed);
            }
        }

        let frame = self.stream_frame(solar_eff, ctx);
        ctx.outbox.datagram(Audience::Chunk(ctx.chunk), frame);
    }

    /// Inverse-square solar panel efficiency, capped at 1.
    pub fn solar_efficiency(&self) -> f64 {
        let r = self.position.length().max(1.0);
        ((AU_KM / r) * (AU_KM / r)).min(1.0)
    }

    // === Telemetry ===

    fn stream_frame(&self, solar_eff: f64, ctx: &mut VesselCtx) -> Vec<u8> {
        let home = self.home_body.and_then(|id| ctx.bodies.get(id));
        let mut w = wire::ByteWriter::datagram(wire::Datagram::VesselStream);
        w.u64(self.id.0);
        w.u64(self.agency.0);
        w.u64(self.lifetime_revenue);
        w.u8(u8::from(self.control.forward));
        w.u8(u8::from(self.control.reverse));
        w.u8(u8::from(self.control.ccw));
        w.u8(u8::from(self.control.cw));
        w.f32(self.altitude_km as f32);
        w.u64(home.map_or(0, |h| h.id.0));
        w.f32(home.map_or(0.0, |h| h.atmosphere_km) as f32);
        w.u64(self.strongest_source.map_or(0, |id| id.0));
        let force = if self.strongest_force.is_finite() {
            self.strongest_force
        } else {
            0.0
        };
        w.f32(force as f32);
        w.u8(u8::from(self.landed));
        w.f32(self.landing_progress as f32);
        w.f32(self.z_velocity as f32);
        w.f32(self.hull_integrity as f32);
        w.f32(self.fuel_kg as f32);
        w.f32(self.fuel_capacity_kg as f32);
        w.u16(self.cargo_capacity.min(u32::from(u16::MAX)) as u16);
        w.f32(self.power as f32);
        w.f32(self.power_capacity as f32);
        w.f32(solar_eff as f32);
        w.f32(self.max_operating_temp_c as f32);
        w.f32(self.temperature_c as f32);
        w.f32(self.ambient_temp_k as f32);
        w.u16(self.stage as u16);
        w.u8(u8::from(self.deployment_ready));
        w.f32(self.planet_income_multiplier(ctx.dir) as f32);
        w.u16(self.systems.len() as u16);
        for sys in self.systems.values() {
            w.u16(sys.kind as u16);
            w.u8(u8::from(sys.active));
        }
        let count = self.astronauts_onboard.len().min(255);
        w.u8(count as u8);
        for astro in self.astronauts_onboard.iter().take(count) {
            w.u32(astro.0);
        }
        w.finish()
    }

    // === Throttled instrument pushes ===

    fn tick_upgrade_tree_push(&mut self, real_dt: f64, ctx: &mut VesselCtx) {
        if !self.has_payload() || !self.is_controlled() {
            self.throttles.upgrade_tree_s = 0.0;
            return;
        }
        self.throttles.upgrade_tree_s += real_dt.max(0.0);
        if self.throttles.upgrade_tree_s < 1.0 {
            return;
        }
        self.throttles.upgrade_tree_s = 0.0;
        if let Some(agency) = ctx.dir.agencies.get(&self.agency) {
            if let Some(frame) = self.upgrade_tree_frame(&agency.attributes) {
                ctx.outbox
                    .datagram(Audience::Player(self.controlled_by), frame);
            }
        }
    }

    // === Controls ===

    /// Apply a control byte from the vessel's current controller. Stage
    /// deploys are forced; telescope aim and system toggles take their
    /// argument from the frame tail.
    pub fn do_control(&mut self, control: VesselControl, ctx: &mut VesselCtx) {
        match control {
            VesselControl::ForwardEngage => self.control.forward = true,
            VesselControl::ForwardDisengage => self.control.forward = false,
            VesselControl::ReverseEngage => self.control.reverse = true,
            VesselControl::ReverseDisengage => self.control.reverse = false,
            VesselControl::CcwEngage => self.control.ccw = true,
            VesselControl::CcwDisengage => self.control.ccw = false,
            VesselControl::CwEngage => self.control.cw = true,
            VesselControl::CwDisengage => self.control.cw = false,
            VesselControl::DeployStage => self.deploy_stage(true, ctx),
            VesselControl::RequestControl
            | VesselControl::SetTelescopeTargetAngle
            | VesselControl::SetSystemState => {}
        }
    }
}
