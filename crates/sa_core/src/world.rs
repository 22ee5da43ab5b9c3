//! The world context: every piece of authoritative state, owned in one place
//! and passed explicitly into operations. The daemon holds a `World` behind
//! its lock; there are no globals and no back-references.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agency::{Agency, Building};
use crate::chunk_manager::ChunkManager;
use crate::content::{BuildingRole, ContentCatalog, ServerTuning};
use crate::ids::{
    AgencyId, AstronautId, BuildingTypeId, ObjectId, PlayerId, ResourceId, UpgradeId,
};
use crate::object::GameObject;
use crate::outbox::{Audience, Outbox};
use crate::payload::kinds;
use crate::player::Player;
use crate::upgrades;
use crate::vessel::{construct_vessel, SystemKind, Vessel, VesselControl, VesselCtx, VesselRequest};
use crate::wire;

/// Players and agencies. Split out of [`World`] so chunk and vessel code can
/// borrow it alongside the chunk set.
#[derive(Debug, Default)]
pub struct Directory {
    pub players: BTreeMap<PlayerId, Player>,
    pub agencies: BTreeMap<AgencyId, Agency>,
}

/// Structured reason codes for rejected client requests. Validation failures
/// never change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientFunds,
    InsufficientResources,
    NotAMember,
    NotFound,
    UnknownKind,
    NotConstructed,
    AtMaxLevel,
    BadRequest,
    NotLanded,
    SeatsFull,
    NotController,
    NotDeployed,
    NoAgency,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::InsufficientResources => "insufficient_resources",
            Self::NotAMember => "not_a_member",
            Self::NotFound => "not_found",
            Self::UnknownKind => "unknown_kind",
            Self::NotConstructed => "not_constructed",
            Self::AtMaxLevel => "at_max_level",
            Self::BadRequest => "bad_request",
            Self::NotLanded => "vessel_not_landed",
            Self::SeatsFull => "seats_full",
            Self::NotController => "not_controller",
            Self::NotDeployed => "not_deployed",
            Self::NoAgency => "no_agency",
        };
        f.write_str(text)
    }
}

/// Trailing argument of a vessel-control frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAux {
    None,
    Angle(f32),
    System { kind: u16, active: bool },
}

pub struct World {
    pub catalog: ContentCatalog,
    pub tuning: ServerTuning,
    pub dir: Directory,
    pub chunks: ChunkManager,
    pub outbox: Outbox,
    pub next_object_id: u64,
    pub next_agency_id: u64,
    rng: StdRng,
    second_accum: f64,
}

impl World {
    pub fn new(catalog: ContentCatalog, tuning: ServerTuning, seed: u64) -> Self {
        Self {
            catalog,
            tuning,
            dir: Directory::default(),
            chunks: ChunkManager::new(),
            outbox: Outbox::new(),
            next_object_id: 1,
            next_agency_id: 1,
            rng: StdRng::seed_from_u64(seed),
            second_accum: 0.0,
        }
    }

    pub fn alloc_object_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        id
    }

    /// Bump the id allocator past everything currently loaded. Called once
    /// after restoring persisted state.
    pub fn restore_id_watermark(&mut self) {
        let max_object = self
            .chunks
            .chunks()
            .flat_map(Chunkish::ids)
            .max()
            .map_or(0, |id| id.0);
        self.next_object_id = self.next_object_id.max(max_object + 1);
        let max_agency = self.dir.agencies.keys().map(|a| a.0).max().unwrap_or(0);
        self.next_agency_id = self.next_agency_id.max(max_agency + 1);
    }

    // === Tick ===

    /// Advance the world by `dt` simulated seconds: the once-per-real-second
    /// economy pass, the per-tick attribute rebuild, then chunk physics.
    pub fn tick(&mut self, dt: f64) {
        self.second_accum += self.tuning.real_seconds(dt);
        while self.second_accum >= 1.0 {
            self.second_accum -= 1.0;
            self.per_second_pass();
        }

        self.rebuild_agency_attributes();

        self.chunks.tick(
            dt,
            &self.catalog,
            &self.tuning,
            &mut self.dir,
            &mut self.outbox,
            &mut self.next_object_id,
            &mut self.rng,
        );
    }

    /// Building construction progress, building effects, and agency income,
    /// each once per wall-clock second.
    fn per_second_pass(&mut self) {
        let agency_ids: Vec<AgencyId> = self.dir.agencies.keys().copied().collect();
        for id in agency_ids {
            // Construction progress.
            if let Some(agency) = self.dir.agencies.get_mut(&id) {
                for building in agency.all_buildings_mut() {
                    building.advance_construction(&self.catalog);
                }
            }

            self.run_building_effects(id);

            let dir = &mut self.dir;
            if let Some(agency) = dir.agencies.get_mut(&id) {
                agency.generate_income(&self.catalog, &self.tuning, &mut dir.players);
            }
        }
    }

    fn run_building_effects(&mut self, agency_id: AgencyId) {
        let Some(agency) = self.dir.agencies.get(&agency_id) else {
            return;
        };
        let buildings: Vec<Building> = agency
            .all_buildings()
            .filter(|b| b.constructed)
            .cloned()
            .collect();
        let vessel_ids = agency.vessels.clone();

        for building in buildings {
            let Some(def) = self.catalog.building(building.kind) else {
                continue;
            };
            match def.role {
                BuildingRole::Generic => {}
                BuildingRole::Headquarters => {
                    if let Some(agency) = self.dir.agencies.get_mut(&agency_id) {
                        agency.ensure_min_astronauts(building.planet, 3, &mut self.rng);
                    }
                }
                BuildingRole::MiningRig => {
                    let odds = self.rng.gen_range(0..1000_u32);
                    if odds >= 50 * building.level {
                        continue;
                    }
                    let yields = self
                        .chunks
                        .chunk_of(building.planet)
                        .and_then(|key| self.chunks.get(key.galaxy, key.system))
                        .and_then(|chunk| chunk.get(building.planet))
                        .and_then(GameObject::as_body)
                        .map(|body| body.resource_yield.clone())
                        .unwrap_or_default();
                    if yields.is_empty() {
                        continue;
                    }
                    if let Some(resource) = weighted_draw(&yields, &mut self.rng) {
                        if let Some(agency) = self.dir.agencies.get_mut(&agency_id) {
                            agency.store_resource(building.planet, resource, 1);
                        }
                    }
                }
                BuildingRole::RefuelingStation => {
                    let rate = 10.0 * f64::from(building.level);
                    for vessel_id in &vessel_ids {
                        let Some(vessel) = self.chunks.find_vessel_mut(*vessel_id) else {
                            continue;
                        };
                        if !vessel.landed || vessel.last_landed_body != Some(building.planet) {
                            continue;
                        }
                        let capacity = vessel.current_stage_capacity();
                        let current = vessel.current_stage_fuel();
                        if capacity <= 0.0 || current >= capacity {
                            continue;
                        }
                        vessel.set_current_stage_fuel(current + rate.min(capacity - current));
                        vessel.fuel_kg = vessel.current_stage_fuel();
                        let catalog = &self.catalog;
                        vessel.recompute_mass(catalog);
                    }
                }
            }
        }
    }

    /// Per-tick rebuild: attribute bags, unlock sets, and the per-planet
    /// networking multipliers from deployed communication satellites.
    pub fn rebuild_agency_attributes(&mut self) {
        let agency_ids: Vec<AgencyId> = self.dir.agencies.keys().copied().collect();
        for id in &agency_ids {
            if let Some(agency) = self.dir.agencies.get_mut(id) {
                agency.update_attributes(&self.catalog, &self.tuning);
                agency.refresh_unlocks(&self.catalog);
            }
        }

        for id in agency_ids {
            let vessel_ids = self
                .dir
                .agencies
                .get(&id)
                .map(|a| a.vessels.clone())
                .unwrap_or_default();

            let mut contributions: Vec<(ObjectId, f64)> = Vec::new();
            for vessel_id in vessel_ids {
                let Some(key) = self.chunks.chunk_of(vessel_id) else {
                    continue;
                };
                let Some(chunk) = self.chunks.get(key.galaxy, key.system) else {
                    continue;
                };
                let Some(vessel) = chunk.get(vessel_id).and_then(GameObject::as_vessel) else {
                    continue;
                };
                if vessel.payload != kinds::COMMS_SATELLITE || vessel.stage != 0 {
                    continue;
                }
                let pct = if vessel.has_upgrade(upgrades::NETWORKING2) {
                    0.02
                } else if vessel.has_upgrade(upgrades::NETWORKING1) {
                    0.01
                } else {
                    continue;
                };

                // Nearest same-system planet, provided the satellite sits
                // within four radii of it.
                let nearest = chunk
                    .objects()
                    .filter_map(GameObject::as_body)
                    .filter(|b| b.is_planet())
                    .map(|b| (b.id, b.radius_km, vessel.position.distance(b.position)))
                    .min_by(|a, b| a.2.total_cmp(&b.2));
                let Some((planet, radius, dist)) = nearest else {
                    continue;
                };
                if radius > 0.0 && dist <= radius * 4.0 {
                    contributions.push((planet, pct));
                }
            }

            if let Some(agency) = self.dir.agencies.get_mut(&id) {
                agency.multipliers.clear();
                for (planet, pct) in contributions {
                    *agency.multipliers.entry(planet).or_insert(1.0) += pct;
                }
            }
        }
    }

    // === Session lifecycle ===

    /// Bind an identity to a live session; creates the player on first
    /// contact. Returns true for a brand-new player.
    pub fn connect(&mut self, player_id: PlayerId) -> bool {
        let starting_cash = self.tuning.starting_cash;
        let is_new = !self.dir.players.contains_key(&player_id);
        let player = self
            .dir
            .players
            .entry(player_id)
            .or_insert_with(|| Player::new(player_id, starting_cash));
        player.connected = true;
        self.outbox
            .ordered(Audience::All, wire::player_joined(player_id));
        is_new
    }

    /// Session teardown: clear the binding and release any controlled vessel.
    pub fn disconnect(&mut self, player_id: PlayerId) {
        let controlled = self
            .dir
            .players
            .get_mut(&player_id)
            .map(|player| {
                player.connected = false;
                player.controlled_vessel.take()
            })
            .unwrap_or_default();
        if let Some(vessel_id) = controlled {
            if let Some(vessel) = self.chunks.find_vessel_mut(vessel_id) {
                vessel.controlled_by = PlayerId(0);
                vessel.control.clear();
            }
        }
        self.outbox
            .ordered(Audience::All, wire::player_left(player_id));
    }

    // === Agencies ===

    pub fn agency_name_exists(&self, name: &str) -> bool {
        self.dir.agencies.values().any(|a| a.name == name)
    }

    pub fn create_agency(
        &mut self,
        name: String,
        is_public: bool,
        creator: PlayerId,
    ) -> Result<AgencyId, RejectReason> {
        if name.is_empty() || self.agency_name_exists(&name) {
            return Err(RejectReason::BadRequest);
        }
        let id = AgencyId(self.next_agency_id);
        self.next_agency_id += 1;

        let mut agency = Agency::new(id, name, is_public);
        agency.add_member(creator);
        // Every agency starts with a headquarters on the home planet.
        if let Some((hq_kind, hq_planet)) = self.default_headquarters() {
            agency.add_building(Building::new(hq_kind, hq_planet, 7.0));
        }
        agency.update_attributes(&self.catalog, &self.tuning);
        self.dir.agencies.insert(id, agency);

        if let Some(player) = self.dir.players.get_mut(&creator) {
            player.agency = id;
        }
        Ok(id)
    }

    fn default_headquarters(&self) -> Option<(BuildingTypeId, ObjectId)> {
        let kind = self
            .catalog
            .buildings
            .iter()
            .find(|(_, def)| def.role == BuildingRole::Headquarters)
            .map(|(id, _)| *id)?;
        // The home planet is the lowest-id planet of the home chunk.
        let planet = self
            .chunks
            .get(1, 1)?
            .objects()
            .filter_map(GameObject::as_body)
            .find(|b| b.is_planet() && !b.is_moon)
            .map(|b| b.id)?;
        Some((kind, planet))
    }

    pub fn construct_building(
        &mut self,
        player_id: PlayerId,
        planet: ObjectId,
        kind: BuildingTypeId,
        position_angle: f64,
    ) -> Result<(), RejectReason> {
        let def = self.catalog.building(kind).ok_or(RejectReason::UnknownKind)?;
        let cost = def.cost;
        let agency_id = {
            let player = self
                .dir
                .players
                .get(&player_id)
                .ok_or(RejectReason::NotFound)?;
            if player.money < cost {
                return Err(RejectReason::InsufficientFunds);
            }
            player.agency
        };
        if !self.dir.agencies.contains_key(&agency_id) {
            return Err(RejectReason::NoAgency);
        }

        if let Some(player) = self.dir.players.get_mut(&player_id) {
            player.money -= cost;
        }
        if let Some(agency) = self.dir.agencies.get_mut(&agency_id) {
            agency.add_building(Building::new(kind, planet, position_angle));
        }
        Ok(())
    }

    /// Construct a vessel from a decoded request, notifying the requester of
    /// the outcome on the datagram channel.
    pub fn construct_vessel(
        &mut self,
        player_id: PlayerId,
        request: &VesselRequest,
    ) -> Result<ObjectId, String> {
        match construct_vessel(
            request,
            player_id,
            &self.catalog,
            &self.tuning,
            &mut self.dir,
            &mut self.chunks,
            &mut self.next_object_id,
        ) {
            Ok(id) => {
                self.outbox.datagram(
                    Audience::Player(player_id),
                    wire::notification(
                        wire::NOTIFY_SUCCESS,
                        &format!("{} successfully constructed.", request.name),
                    ),
                );
                Ok(id)
            }
            Err(err) => {
                self.outbox.datagram(
                    Audience::Player(player_id),
                    wire::notification(
                        wire::NOTIFY_FAILURE,
                        &format!("Construction failed: {err}"),
                    ),
                );
                Err(err.to_string())
            }
        }
    }

    // === Vessel control ===

    pub fn vessel_control(
        &mut self,
        player_id: PlayerId,
        vessel_id: ObjectId,
        control: VesselControl,
        aux: ControlAux,
    ) -> Result<(), RejectReason> {
        let key = self
            .chunks
            .chunk_of(vessel_id)
            .ok_or(RejectReason::NotFound)?;

        match control {
            VesselControl::RequestControl => {
                {
                    let vessel = self
                        .chunks
                        .find_vessel_mut(vessel_id)
                        .ok_or(RejectReason::NotFound)?;
                    if vessel.is_controlled() {
                        return Err(RejectReason::NotController);
                    }
                    vessel.controlled_by = player_id;
                }
                // Release whatever the player controlled before.
                let previous = self
                    .dir
                    .players
                    .get_mut(&player_id)
                    .ok_or(RejectReason::NotFound)?
                    .controlled_vessel
                    .replace(vessel_id);
                if let Some(old_id) = previous.filter(|old| *old != vessel_id) {
                    if let Some(old) = self.chunks.find_vessel_mut(old_id) {
                        old.controlled_by = PlayerId(0);
                        old.control.clear();
                    }
                }
                self.outbox
                    .ordered(Audience::All, wire::control_transfer(vessel_id, player_id));
                Ok(())
            }
            VesselControl::SetTelescopeTargetAngle => {
                let vessel = self
                    .chunks
                    .find_vessel_mut(vessel_id)
                    .ok_or(RejectReason::NotFound)?;
                if vessel.controlled_by != player_id {
                    return Err(RejectReason::NotController);
                }
                if let ControlAux::Angle(angle) = aux {
                    vessel.telescope_target_deg = f64::from(angle);
                    Ok(())
                } else {
                    Err(RejectReason::BadRequest)
                }
            }
            VesselControl::SetSystemState => {
                let vessel = self
                    .chunks
                    .find_vessel_mut(vessel_id)
                    .ok_or(RejectReason::NotFound)?;
                if vessel.controlled_by != player_id {
                    return Err(RejectReason::NotController);
                }
                if let ControlAux::System { kind, active } = aux {
                    let kind = SystemKind::from_u16(kind).ok_or(RejectReason::UnknownKind)?;
                    vessel.set_system_state(kind, active);
                    Ok(())
                } else {
                    Err(RejectReason::BadRequest)
                }
            }
            other => {
                let chunk = self
                    .chunks
                    .get_mut(key.galaxy, key.system)
                    .ok_or(RejectReason::NotFound)?;
                let bodies = chunk.bodies_snapshot();
                let peers = chunk.peers_snapshot(&self.catalog);
                let mut debris_out = Vec::new();
                {
                    let vessel = chunk
                        .get_mut(vessel_id)
                        .and_then(GameObject::as_vessel_mut)
                        .ok_or(RejectReason::NotFound)?;
                    if vessel.controlled_by != player_id {
                        return Err(RejectReason::NotController);
                    }
                    let mut ctx = VesselCtx {
                        catalog: &self.catalog,
                        tuning: &self.tuning,
                        bodies: &bodies,
                        peers: &peers,
                        dir: &mut self.dir,
                        outbox: &mut self.outbox,
                        chunk: key,
                        debris_out: &mut debris_out,
                        next_object_id: &mut self.next_object_id,
                        rng: &mut self.rng,
                    };
                    vessel.do_control(other, &mut ctx);
                }
                let spawned: Vec<ObjectId> = debris_out.iter().map(|d| d.id).collect();
                for debris in debris_out {
                    chunk.add(GameObject::Debris(debris));
                }
                for id in spawned {
                    self.chunks.register_object(id, key.galaxy, key.system);
                }
                Ok(())
            }
        }
    }

    // === Economy requests ===

    pub fn sell_resource(
        &mut self,
        player_id: PlayerId,
        planet: ObjectId,
        resource: ResourceId,
        count: u32,
    ) -> Result<i64, RejectReason> {
        let dir = &mut self.dir;
        let player = dir
            .players
            .get_mut(&player_id)
            .ok_or(RejectReason::NotFound)?;
        let agency = dir
            .agencies
            .get_mut(&player.agency)
            .ok_or(RejectReason::NoAgency)?;
        agency.sell_resource(player, planet, resource, count, &self.catalog, &self.tuning)
    }

    pub fn upgrade_building(
        &mut self,
        player_id: PlayerId,
        planet: ObjectId,
        kind: BuildingTypeId,
        to_level: u32,
    ) -> Result<(i64, u32), RejectReason> {
        let dir = &mut self.dir;
        let player = dir
            .players
            .get_mut(&player_id)
            .ok_or(RejectReason::NotFound)?;
        let agency = dir
            .agencies
            .get_mut(&player.agency)
            .ok_or(RejectReason::NoAgency)?;
        if !agency.is_member(player_id) {
            return Err(RejectReason::NotAMember);
        }
        let result = agency.try_upgrade_building(player, planet, kind, to_level, &self.catalog)?;
        agency.update_attributes(&self.catalog, &self.tuning);
        Ok(result)
    }

    pub fn unlock_vessel_upgrade(
        &mut self,
        player_id: PlayerId,
        vessel_id: ObjectId,
        upgrade: UpgradeId,
    ) -> Result<(), RejectReason> {
        let attrs = {
            let player = self
                .dir
                .players
                .get(&player_id)
                .ok_or(RejectReason::NotFound)?;
            self.dir
                .agencies
                .get(&player.agency)
                .ok_or(RejectReason::NoAgency)?
                .attributes
                .clone()
        };
        let vessel = self
            .chunks
            .find_vessel_mut(vessel_id)
            .ok_or(RejectReason::NotFound)?;
        if vessel.controlled_by != player_id {
            return Err(RejectReason::NotController);
        }
        let player = self
            .dir
            .players
            .get_mut(&player_id)
            .ok_or(RejectReason::NotFound)?;
        vessel.try_unlock_upgrade(player, &attrs, upgrade, &self.catalog)?;
        if let Some(frame) = vessel.upgrade_tree_frame(&attrs) {
            self.outbox
                .datagram(Audience::Agency(vessel.agency), frame);
        }
        Ok(())
    }

    // === Astronauts ===

    /// Landed planet used for astronaut transfer gates.
    fn vessel_landed_planet(vessel: &Vessel) -> Option<ObjectId> {
        if !vessel.landed {
            return None;
        }
        vessel.strongest_source.or(vessel.home_body)
    }

    pub fn board_astronaut(
        &mut self,
        player_id: PlayerId,
        vessel_id: ObjectId,
        astronaut: AstronautId,
    ) -> Result<(), RejectReason> {
        let agency_id = self
            .dir
            .players
            .get(&player_id)
            .ok_or(RejectReason::NotFound)?
            .agency;
        let vessel = self
            .chunks
            .find_vessel_mut(vessel_id)
            .ok_or(RejectReason::NotFound)?;
        if vessel.agency != agency_id {
            return Err(RejectReason::NotAMember);
        }
        let planet = Self::vessel_landed_planet(vessel).ok_or(RejectReason::NotLanded)?;
        let agency = self
            .dir
            .agencies
            .get_mut(&agency_id)
            .ok_or(RejectReason::NoAgency)?;
        agency.board_astronaut(astronaut, vessel, planet)
    }

    pub fn disembark_astronaut(
        &mut self,
        player_id: PlayerId,
        vessel_id: ObjectId,
        astronaut: AstronautId,
    ) -> Result<(), RejectReason> {
        let agency_id = self
            .dir
            .players
            .get(&player_id)
            .ok_or(RejectReason::NotFound)?
            .agency;
        let vessel = self
            .chunks
            .find_vessel_mut(vessel_id)
            .ok_or(RejectReason::NotFound)?;
        if vessel.agency != agency_id {
            return Err(RejectReason::NotAMember);
        }
        let planet = Self::vessel_landed_planet(vessel).ok_or(RejectReason::NotLanded)?;
        let agency = self
            .dir
            .agencies
            .get_mut(&agency_id)
            .ok_or(RejectReason::NoAgency)?;
        agency.disembark_astronaut(astronaut, vessel, planet)
    }
}

/// Weighted draw over a resource-yield table.
fn weighted_draw(
    yields: &BTreeMap<ResourceId, f64>,
    rng: &mut impl Rng,
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

/// Iterate object ids of a chunk. Helper trait so `restore_id_watermark` can
/// stay readable.
trait Chunkish {
    fn ids(&self) -> Vec<ObjectId>;
}

impl Chunkish for crate::chunk::Chunk {
    fn ids(&self) -> Vec<ObjectId> {
        self.objects().map(GameObject::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, seeded_world};

    #[test]
    fn connect_creates_player_with_starting_cash_once() {
        let mut world = seeded_world();
        assert!(world.connect(PlayerId(42)));
        assert!(!world.connect(PlayerId(42)));
        let player = &world.dir.players[&PlayerId(42)];
        assert_eq!(player.money, world.tuning.starting_cash);
        assert!(player.connected);
    }

    #[test]
    fn duplicate_agency_name_is_rejected() {
        let mut world = seeded_world();
        world.connect(PlayerId(42));
        world
            .create_agency("NASA Prime".into(), true, PlayerId(42))
            .unwrap();
        let err = world
            .create_agency("NASA Prime".into(), true, PlayerId(42))
            .unwrap_err();
        assert_eq!(err, RejectReason::BadRequest);
    }

    #[test]
    fn request_control_is_granted_only_when_free() {
        let mut world = seeded_world();
        let vessel_id = test_fixtures::spawn_vessel(&mut world);
        world.connect(PlayerId(1));
        world.connect(PlayerId(2));

        world
            .vessel_control(
                PlayerId(1),
                vessel_id,
                VesselControl::RequestControl,
                ControlAux::None,
            )
            .unwrap();
        assert_eq!(
            world.chunks.find_vessel(vessel_id).unwrap().controlled_by,
            PlayerId(1)
        );

        let err = world
            .vessel_control(
                PlayerId(2),
                vessel_id,
                VesselControl::RequestControl,
                ControlAux::None,
            )
            .unwrap_err();
        assert_eq!(err, RejectReason::NotController);
    }

    #[test]
    fn taking_a_new_vessel_releases_the_old_one() {
        let mut world = seeded_world();
        let first = test_fixtures::spawn_vessel(&mut world);
        let second = test_fixtures::spawn_vessel(&mut world);
        world.connect(PlayerId(1));

        world
            .vessel_control(PlayerId(1), first, VesselControl::RequestControl, ControlAux::None)
            .unwrap();
        world
            .vessel_control(PlayerId(1), second, VesselControl::RequestControl, ControlAux::None)
            .unwrap();

        assert_eq!(
            world.chunks.find_vessel(first).unwrap().controlled_by,
            PlayerId(0)
        );
        assert_eq!(
            world.chunks.find_vessel(second).unwrap().controlled_by,
            PlayerId(1)
        );
    }

    #[test]
    fn non_controller_cannot_drive() {
        let mut world = seeded_world();
        let vessel_id = test_fixtures::spawn_vessel(&mut world);
        world.connect(PlayerId(2));
        let err = world
            .vessel_control(
                PlayerId(2),
                vessel_id,
                VesselControl::ForwardEngage,
                ControlAux::None,
            )
            .unwrap_err();
        assert_eq!(err, RejectReason::NotController);
    }

    #[test]
    fn disconnect_releases_control_and_clears_bits() {
        let mut world = seeded_world();
        let vessel_id = test_fixtures::spawn_vessel(&mut world);
        world.connect(PlayerId(1));
        world
            .vessel_control(PlayerId(1), vessel_id, VesselControl::RequestControl, ControlAux::None)
            .unwrap();
        world
            .vessel_control(PlayerId(1), vessel_id, VesselControl::ForwardEngage, ControlAux::None)
            .unwrap();

        world.disconnect(PlayerId(1));

        let vessel = world.chunks.find_vessel(vessel_id).unwrap();
        assert_eq!(vessel.controlled_by, PlayerId(0));
        assert!(!vessel.control.forward);
        assert_eq!(world.dir.players[&PlayerId(1)].controlled_vessel, None);
    }

    #[test]
    fn networking_multipliers_stack_additively_from_one() {
        // Two deployed communication satellites within four radii of the home
        // planet, one NETWORKING1 and one NETWORKING2: 1.0 + 0.01 + 0.02.
        let mut world = seeded_world();
        world.connect(PlayerId(1));
        let agency_id = world
            .create_agency("Relay Co".into(), true, PlayerId(1))
            .unwrap();

        let sat1 = test_fixtures::spawn_networked_sat(&mut world, agency_id, upgrades::NETWORKING1);
        let sat2 = test_fixtures::spawn_networked_sat(&mut world, agency_id, upgrades::NETWORKING2);
        assert_ne!(sat1, sat2);

        world.rebuild_agency_attributes();

        let agency = &world.dir.agencies[&agency_id];
        let earth_mult = agency.multipliers[&test_fixtures::EARTH];
        assert!(
            (earth_mult - 1.03).abs() < 1e-9,
            "expected 1.03, got {earth_mult}"
        );
    }

    #[test]
    fn satellite_beyond_four_radii_contributes_nothing() {
        let mut world = seeded_world();
        world.connect(PlayerId(1));
        let agency_id = world
            .create_agency("Relay Co".into(), true, PlayerId(1))
            .unwrap();
        let sat = test_fixtures::spawn_networked_sat(&mut world, agency_id, upgrades::NETWORKING1);

        // Push the satellite just beyond 4 R of the planet it hugs.
        {
            let radius = {
                let chunk = world.chunks.get(1, 1).unwrap();
                chunk
                    .get(test_fixtures::EARTH)
                    .and_then(GameObject::as_body)
                    .unwrap()
                    .radius_km
            };
            let earth_pos = world
                .chunks
                .get(1, 1)
                .unwrap()
                .get(test_fixtures::EARTH)
                .unwrap()
                .position();
            let vessel = world.chunks.find_vessel_mut(sat).unwrap();
            vessel.position = earth_pos + crate::math::Vec2::new(radius * 4.0 + 1.0, 0.0);
        }
        world.rebuild_agency_attributes();
        let agency = &world.dir.agencies[&agency_id];
        assert!(agency.multipliers.get(&test_fixtures::EARTH).is_none());
    }

    #[test]
    fn world_tick_pays_building_income_every_second() {
        let mut world = seeded_world();
        world.connect(PlayerId(1));
        world
            .create_agency("Earners".into(), true, PlayerId(1))
            .unwrap();
        let money_before = world.dir.players[&PlayerId(1)].money;

        // 3 wall seconds at sim rate 1; the HQ finishes building and earns.
        for _ in 0..180 {
            world.tick(1.0 / 60.0);
        }
        let money_after = world.dir.players[&PlayerId(1)].money;
        assert!(
            money_after > money_before,
            "HQ income must accrue: {money_before} → {money_after}"
        );
    }

    #[test]
    fn sell_resource_rejects_non_members() {
        let mut world = seeded_world();
        world.connect(PlayerId(9));
        let err = world
            .sell_resource(PlayerId(9), test_fixtures::EARTH, ResourceId(1), 5)
            .unwrap_err();
        assert_eq!(err, RejectReason::NoAgency);
    }
}
