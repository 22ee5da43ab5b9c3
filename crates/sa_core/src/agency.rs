//! Agencies: the player organizations that own buildings, vessels,
//! astronauts, and per-planet inventories.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::astronaut::Astronaut;
use crate::content::{ContentCatalog, ServerTuning};
use crate::ids::{AgencyId, AstronautId, BuildingTypeId, ObjectId, PlayerId, ResourceId};
use crate::player::Player;
use crate::vessel::Vessel;
use crate::world::RejectReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingTypeId,
    pub planet: ObjectId,
    pub level: u32,
    pub constructed: bool,
    #[serde(default)]
    pub construction_progress: u32,
    #[serde(default)]
    pub position_angle: f64,
}

impl Building {
    pub fn new(kind: BuildingTypeId, planet: ObjectId, position_angle: f64) -> Self {
        Self {
            kind,
            planet,
            level: 1,
            constructed: false,
            construction_progress: 0,
            position_angle,
        }
    }

    /// Credits per second once constructed: base income plus every unlock-level
    /// add-on the building's level has reached.
    pub fn income(&self, catalog: &ContentCatalog) -> i64 {
        if !self.constructed {
            return 0;
        }
        let Some(def) = catalog.building(self.kind) else {
            return 0;
        };
        let mut income = def.base_income;
        for (level, unlocks) in &def.unlocks {
            if self.level >= *level {
                income += unlocks.add_base_income;
            }
        }
        income
    }

    /// Advance construction by one second; returns true on completion.
    pub fn advance_construction(&mut self, catalog: &ContentCatalog) -> bool {
        if self.constructed {
            return false;
        }
        self.construction_progress += 1;
        let build_time = catalog.building(self.kind).map_or(0, |d| d.build_time);
        if self.construction_progress >= build_time {
            self.constructed = true;
            self.construction_progress = 0;
            return true;
        }
        false
    }
}

/// Attribute bag rebuilt from building unlocks each tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgencyAttributes {
    pub satellite_bonus_income: f64,
    pub satellite_max_upgrade_tier: u32,
    pub probe_max_upgrade_tier: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub is_public: bool,
    pub members: Vec<PlayerId>,
    #[serde(default)]
    pub primary_color: u32,
    #[serde(default)]
    pub secondary_color: u32,
    /// Buildings per base planet.
    pub bases: BTreeMap<ObjectId, Vec<Building>>,
    /// Per-planet inventory, resource id → count.
    pub inventories: BTreeMap<ObjectId, BTreeMap<ResourceId, u32>>,
    /// Per-planet storage capacity, rebuilt from buildings.
    pub capacities: BTreeMap<ObjectId, u32>,
    /// Per-planet income multiplier from networking satellites; floor 1.0,
    /// rebuilt from scratch, absent means 1.0.
    #[serde(default)]
    pub multipliers: BTreeMap<ObjectId, f64>,
    #[serde(default)]
    pub attributes: AgencyAttributes,
    pub astronauts: BTreeMap<AstronautId, Astronaut>,
    #[serde(default)]
    pub planet_to_astronauts: BTreeMap<ObjectId, BTreeSet<AstronautId>>,
    /// Vessels owned by this agency, by id; the chunk owns the objects.
    #[serde(default)]
    pub vessels: Vec<ObjectId>,
    #[serde(default)]
    pub income_per_second: i64,
    /// Fractional income awaiting distribution as whole credits.
    #[serde(default)]
    pub income_carry: f64,
    #[serde(default)]
    pub discovered_planets: BTreeSet<ObjectId>,
    #[serde(default)]
    pub visited_planets: BTreeSet<ObjectId>,
    #[serde(default)]
    pub unlocked_buildings: BTreeSet<BuildingTypeId>,
    #[serde(default)]
    pub unlocked_components: BTreeSet<crate::ids::ComponentTypeId>,
    /// Astronauts lost with destroyed vessels.
    #[serde(default)]
    pub stranded_astronauts: u64,
    #[serde(default)]
    astronaut_seq: u32,
}

impl Agency {
    pub fn new(id: AgencyId, name: String, is_public: bool) -> Self {
        Self {
            id,
            name,
            is_public,
            members: Vec::new(),
            primary_color: 0,
            secondary_color: 0,
            bases: BTreeMap::new(),
            inventories: BTreeMap::new(),
            capacities: BTreeMap::new(),
            multipliers: BTreeMap::new(),
            attributes: AgencyAttributes::default(),
            astronauts: BTreeMap::new(),
            planet_to_astronauts: BTreeMap::new(),
            vessels: Vec::new(),
            income_per_second: 0,
            income_carry: 0.0,
            discovered_planets: BTreeSet::new(),
            visited_planets: BTreeSet::new(),
            unlocked_buildings: BTreeSet::new(),
            unlocked_components: BTreeSet::new(),
            stranded_astronauts: 0,
            astronaut_seq: 0,
        }
    }

    // === Membership ===

    pub fn add_member(&mut self, player: PlayerId) {
        if !self.members.contains(&player) {
            self.members.push(player);
        }
    }

    pub fn remove_member(&mut self, player: PlayerId) {
        self.members.retain(|m| *m != player);
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    // === Money ===

    /// Split `amount` across members by ceiling division.
    pub fn distribute_money(&self, amount: i64, players: &mut BTreeMap<PlayerId, Player>) {
        let n = self.members.len() as i64;
        if n == 0 || amount <= 0 {
            return;
        }
        let per_member = (amount + n - 1) / n;
        for member in &self.members {
            if let Some(p) = players.get_mut(member) {
                p.money += per_member;
            }
        }
    }

    /// Accumulate a fractional payout; whole credits are distributed as they
    /// accrue, the remainder carries.
    pub fn distribute_fractional(&mut self, amount: f64, players: &mut BTreeMap<PlayerId, Player>) {
        if amount <= 0.0 {
            return;
        }
        self.income_carry += amount;
        let whole = self.income_carry.trunc();
        if whole >= 1.0 {
            self.income_carry -= whole;
            self.distribute_money(whole as i64, players);
        }
    }

    /// One real second of building income, scaled by the server multiplier and
    /// split across members by floor division.
    pub fn generate_income(
        &mut self,
        catalog: &ContentCatalog,
        tuning: &ServerTuning,
        players: &mut BTreeMap<PlayerId, Player>,
    ) {
        let from_buildings: i64 = self.all_buildings().map(|b| b.income(catalog)).sum();
        let total = (from_buildings as f64 * tuning.global_cash_multiplier) as i64;
        self.income_per_second = total;

        let n = self.members.len() as i64;
        if n == 0 || total <= 0 {
            return;
        }
        let per_member = total / n;
        for member in &self.members {
            if let Some(p) = players.get_mut(member) {
                p.money += per_member;
            }
        }
    }

    // === Buildings ===

    pub fn add_building(&mut self, building: Building) {
        self.bases.entry(building.planet).or_default().push(building);
    }

    pub fn all_buildings(&self) -> impl Iterator<Item = &Building> {
        self.bases.values().flatten()
    }

    pub fn all_buildings_mut(&mut self) -> impl Iterator<Item = &mut Building> {
        self.bases.values_mut().flatten()
    }

    /// Rebuild the attribute bag and per-planet storage capacities from
    /// defaults plus every constructed building's reached unlock levels.
    pub fn update_attributes(&mut self, catalog: &ContentCatalog, tuning: &ServerTuning) {
        let mut attrs = AgencyAttributes {
            satellite_bonus_income: tuning.default_satellite_bonus_income,
            satellite_max_upgrade_tier: tuning.default_satellite_max_upgrade_tier,
            probe_max_upgrade_tier: tuning.default_probe_max_upgrade_tier,
        };

        self.capacities.clear();
        let base_planets: Vec<ObjectId> = self.bases.keys().copied().collect();
        for planet in base_planets {
            self.capacities.insert(planet, 0);
            self.inventories.entry(planet).or_default();
        }

        let mut capacity_adds: Vec<(ObjectId, u32)> = Vec::new();
        for b in self.all_buildings() {
            if !b.constructed {
                continue;
            }
            let Some(def) = catalog.building(b.kind) else {
                continue;
            };
            for (level, unlocks) in &def.unlocks {
                if b.level < *level {
                    continue;
                }
                attrs.satellite_bonus_income += unlocks.add_satellite_income;
                if let Some(tier) = unlocks.satellite_max_upgrade_tier {
                    attrs.satellite_max_upgrade_tier = attrs.satellite_max_upgrade_tier.max(tier);
                }
                if let Some(tier) = unlocks.probe_max_upgrade_tier {
                    attrs.probe_max_upgrade_tier = attrs.probe_max_upgrade_tier.max(tier);
                }
                if unlocks.add_base_storage > 0 {
                    capacity_adds.push((b.planet, unlocks.add_base_storage));
                }
            }
        }
        for (planet, add) in capacity_adds {
            *self.capacities.entry(planet).or_insert(0) += add;
            self.inventories.entry(planet).or_default();
        }

        self.attributes = attrs;
    }

    /// Cumulative building/component unlock sets from constructed buildings.
    pub fn refresh_unlocks(&mut self, catalog: &ContentCatalog) {
        let mut buildings = BTreeSet::new();
        let mut components = BTreeSet::new();
        for b in self.all_buildings() {
            if !b.constructed {
                continue;
            }
            let Some(def) = catalog.building(b.kind) else {
                continue;
            };
            for (level, unlocks) in &def.unlocks {
                if b.level >= *level {
                    buildings.extend(unlocks.unlock_buildings.iter().copied());
                    components.extend(unlocks.unlock_components.iter().copied());
                }
            }
        }
        self.unlocked_buildings.extend(buildings);
        self.unlocked_components.extend(components);
    }

    /// Upgrade a building to `to_level` (or one level if `to_level` is not
    /// above the current level), paying the summed per-step costs.
    pub fn try_upgrade_building(
        &mut self,
        player: &mut Player,
        planet: ObjectId,
        kind: BuildingTypeId,
        to_level: u32,
        catalog: &ContentCatalog,
    ) -> Result<(i64, u32), RejectReason> {
        let def = catalog.building(kind).ok_or(RejectReason::UnknownKind)?;
        let building = self
            .bases
            .get(&planet)
            .and_then(|bs| bs.iter().find(|b| b.kind == kind))
            .ok_or(RejectReason::NotFound)?;
        if !building.constructed {
            return Err(RejectReason::NotConstructed);
        }
        let current = building.level;
        let target = if to_level > current {
            to_level
        } else {
            current + 1
        };
        if target > def.max_level() {
            return Err(RejectReason::AtMaxLevel);
        }

        let mut cost = 0i64;
        for level in (current + 1)..=target {
            let step = def.upgrade_costs.get(&level).copied().unwrap_or(0);
            if step <= 0 {
                return Err(RejectReason::NotFound);
            }
            cost += step;
        }
        if player.money < cost {
            return Err(RejectReason::InsufficientFunds);
        }

        player.money -= cost;
        if let Some(b) = self
            .bases
            .get_mut(&planet)
            .and_then(|bs| bs.iter_mut().find(|b| b.kind == kind))
        {
            b.level = target;
        }
        Ok((cost, target))
    }

    // === Resources ===

    pub fn stored_total(&self, planet: ObjectId) -> u32 {
        self.inventories
            .get(&planet)
            .map_or(0, |inv| inv.values().sum())
    }

    /// Add resources to a base inventory, clamped by remaining capacity.
    /// Returns how many units were actually stored.
    pub fn store_resource(&mut self, planet: ObjectId, resource: ResourceId, count: u32) -> u32 {
        let capacity = self.capacities.get(&planet).copied().unwrap_or(0);
        let used = self.stored_total(planet);
        let room = capacity.saturating_sub(used);
        let put = count.min(room);
        if put > 0 {
            *self
                .inventories
                .entry(planet)
                .or_default()
                .entry(resource)
                .or_insert(0) += put;
        }
        put
    }

    /// Sell from a base inventory, crediting the player at the catalog rate
    /// scaled by the server cash multiplier.
    pub fn sell_resource(
        &mut self,
        player: &mut Player,
        planet: ObjectId,
        resource: ResourceId,
        count: u32,
        catalog: &ContentCatalog,
        tuning: &ServerTuning,
    ) -> Result<i64, RejectReason> {
        if count == 0 {
            return Err(RejectReason::BadRequest);
        }
        if !self.is_member(player.id) {
            return Err(RejectReason::NotAMember);
        }
        let rate = catalog
            .resources
            .get(&resource)
            .map(|r| r.sale_rate)
            .filter(|r| *r > 0)
            .ok_or(RejectReason::UnknownKind)?;

        let inv = self
            .inventories
            .get_mut(&planet)
            .ok_or(RejectReason::InsufficientResources)?;
        let have = inv.get(&resource).copied().unwrap_or(0);
        if have < count {
            return Err(RejectReason::InsufficientResources);
        }
        if have == count {
            inv.remove(&resource);
        } else {
            inv.insert(resource, have - count);
        }

        let value = (rate * i64::from(count)) as f64 * tuning.global_cash_multiplier;
        let value = value as i64;
        player.money += value;
        Ok(value)
    }

    // === Discovery ===

    /// Returns true only the first time a planet is reported.
    pub fn discover_planet(&mut self, planet: ObjectId) -> bool {
        self.discovered_planets.insert(planet)
    }

    // === Astronauts ===

    pub fn create_astronaut(
        &mut self,
        name: String,
        planet: Option<ObjectId>,
        rng: &mut impl Rng,
    ) -> AstronautId {
        let id = loop {
            let candidate = AstronautId::generate(rng);
            if !self.astronauts.contains_key(&candidate) {
                break candidate;
            }
        };
        let astronaut = Astronaut {
            id,
            name,
            suit_id: 0,
            appearance_id: rng.gen_range(0..=12),
            agency: self.id,
            planet,
            vessel: None,
            level: 1,
            exp: 0.0,
        };
        if let Some(p) = planet {
            self.planet_to_astronauts.entry(p).or_default().insert(id);
        }
        self.astronauts.insert(id, astronaut);
        id
    }

    /// Top up a planet's population to `min_count`. Returns how many spawned.
    pub fn ensure_min_astronauts(
        &mut self,
        planet: ObjectId,
        min_count: usize,
        rng: &mut impl Rng,
    ) -> usize {
        let mut have = self
            .planet_to_astronauts
            .get(&planet)
            .map_or(0, BTreeSet::len);
        let mut spawned = 0;
        while have < min_count {
            let name = format!("Astronaut {}", self.astronaut_seq);
            self.astronaut_seq += 1;
            self.create_astronaut(name, Some(planet), rng);
            have += 1;
            spawned += 1;
        }
        spawned
    }

    pub fn astronauts_on_planet(&self, planet: ObjectId) -> Vec<AstronautId> {
        self.planet_to_astronauts
            .get(&planet)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Seat an astronaut in a landed vessel. The astronaut must live on the
    /// planet the vessel is landed on.
    pub fn board_astronaut(
        &mut self,
        astro: AstronautId,
        vessel: &mut Vessel,
        landed_planet: ObjectId,
    ) -> Result<(), RejectReason> {
        if !vessel.landed {
            return Err(RejectReason::NotLanded);
        }
        let a = self
            .astronauts
            .get_mut(&astro)
            .ok_or(RejectReason::NotFound)?;
        if a.planet != Some(landed_planet) || a.vessel.is_some() {
            return Err(RejectReason::BadRequest);
        }
        if vessel.seat_capacity == 0 {
            return Err(RejectReason::SeatsFull);
        }
        if vessel.astronauts_onboard.contains(&astro) {
            return Err(RejectReason::BadRequest);
        }
        if vessel.astronauts_onboard.len() >= vessel.seat_capacity as usize {
            return Err(RejectReason::SeatsFull);
        }

        if let Some(set) = self.planet_to_astronauts.get_mut(&landed_planet) {
            set.remove(&astro);
        }
        a.planet = None;
        a.vessel = Some(vessel.id);
        vessel.astronauts_onboard.push(astro);
        Ok(())
    }

    /// Move an astronaut from a landed vessel back onto the planet below.
    pub fn disembark_astronaut(
        &mut self,
        astro: AstronautId,
        vessel: &mut Vessel,
        landed_planet: ObjectId,
    ) -> Result<(), RejectReason> {
        if !vessel.landed {
            return Err(RejectReason::NotLanded);
        }
        let a = self
            .astronauts
            .get_mut(&astro)
            .ok_or(RejectReason::NotFound)?;
        if a.vessel != Some(vessel.id) && !vessel.astronauts_onboard.contains(&astro) {
            return Err(RejectReason::BadRequest);
        }

        vessel.astronauts_onboard.retain(|id| *id != astro);
        a.vessel = None;
        a.planet = Some(landed_planet);
        self.planet_to_astronauts
            .entry(landed_planet)
            .or_default()
            .insert(astro);
        Ok(())
    }

    /// Unseat everyone from a vessel onto `fallback_planet`, used when the
    /// vessel is scrapped while landed.
    pub fn disembark_all(&mut self, vessel: &mut Vessel, fallback_planet: ObjectId) -> usize {
        let mut moved = 0;
        for astro in std::mem::take(&mut vessel.astronauts_onboard) {
            if let Some(a) = self.astronauts.get_mut(&astro) {
                a.vessel = None;
                a.planet = Some(fallback_planet);
                self.planet_to_astronauts
                    .entry(fallback_planet)
                    .or_default()
                    .insert(astro);
                moved += 1;
            }
        }
        moved
    }

    pub fn remove_vessel(&mut self, vessel: ObjectId) {
        self.vessels.retain(|v| *v != vessel);
    }
}

// ---------------------------------------------------------------------------
// Gamestate snapshot (ordered-channel JSON frame body)
// ---------------------------------------------------------------------------

/// Serializable view of an agency sent over the ordered channel; built under
/// the lock, serialized by the daemon.
#[derive(Debug, Serialize)]
pub struct GamestateSnapshot {
    pub id: AgencyId,
    pub name: String,
    pub members: Vec<PlayerId>,
    pub money: i64,
    pub income_per_second: i64,
    pub bases: BTreeMap<ObjectId, Vec<Building>>,
    pub base_capacities: BTreeMap<ObjectId, u32>,
    pub base_inventories: BTreeMap<ObjectId, BTreeMap<ResourceId, u32>>,
    /// Only entries that differ from 1.0.
    pub base_multipliers: BTreeMap<ObjectId, f64>,
    pub buildable: Vec<BuildingTypeId>,
    pub components: Vec<crate::ids::ComponentTypeId>,
    pub vessels: Vec<ObjectId>,
    pub astronauts: BTreeMap<AstronautId, Astronaut>,
    pub astros_by_planet: BTreeMap<ObjectId, Vec<AstronautId>>,
}

impl Agency {
    pub fn gamestate_snapshot(&self, players: &BTreeMap<PlayerId, Player>) -> GamestateSnapshot {
        let money = self
            .members
            .iter()
            .filter_map(|m| players.get(m))
            .map(|p| p.money)
            .sum();
        let multipliers = self
            .multipliers
            .iter()
            .filter(|(_, m)| (**m - 1.0).abs() > 1e-9)
            .map(|(k, v)| (*k, (*v * 10_000.0).round() / 10_000.0))
            .collect();
        GamestateSnapshot {
            id: self.id,
            name: self.name.clone(),
            members: self.members.clone(),
            money,
            income_per_second: self.income_per_second,
            bases: self.bases.clone(),
            base_capacities: self.capacities.clone(),
            base_inventories: self.inventories.clone(),
            base_multipliers: multipliers,
            buildable: self.unlocked_buildings.iter().copied().collect(),
            components: self.unlocked_components.iter().copied().collect(),
            vessels: self.vessels.clone(),
            astronauts: self.astronauts.clone(),
            astros_by_planet: self
                .planet_to_astronauts
                .iter()
                .map(|(p, set)| (*p, set.iter().copied().collect()))
                .collect(),
        }
    }
}
