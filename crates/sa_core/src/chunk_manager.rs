//! Chunk set, object→chunk index, and inter-scale vessel migration.
//!
//! Three nested scales share one coordinate representation: a system chunk is
//! km-true, a galaxy starmap uses 10⁶ km per unit, the universe map 10⁹. On a
//! transition the vessel's position and velocity are rescaled by the ratio of
//! the two scales, its home body cleared, and the object moved between chunks
//! atomically.

use std::collections::BTreeMap;

use ahash::AHashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkKey};
use crate::content::{ContentCatalog, ServerTuning};
use crate::ids::ObjectId;
use crate::math::Vec2;
use crate::object::GameObject;
use crate::outbox::Outbox;
use crate::vessel::Vessel;
use crate::world::Directory;

pub const SYSTEM_SCALE_KM_PER_UNIT: f64 = 1.0;
pub const STARMAP_SCALE_KM_PER_UNIT: f64 = 1.0e6;
pub const UNIVERSE_SCALE_KM_PER_UNIT: f64 = 1.0e9;

/// Leave a system for the galaxy starmap beyond this radius (km).
pub const SYSTEM_EXIT_RADIUS_KM: f64 = 2.0e13;
/// Enter a system when within this range of its starmap point (starmap units).
pub const STARMAP_ENTRY_RADIUS: f64 = 1.0e10;
/// Leave a galaxy for the universe map beyond this radius (starmap units).
pub const GALAXY_BOUNDARY_RADIUS: f64 = 5.0e11;
/// Enter a galaxy when within this range of its universe point (universe units).
pub const UNIVERSE_ENTRY_RADIUS: f64 = 1.0e11;

/// Navigational point on a starmap or the universe map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

enum Migration {
    ToStarmap(ObjectId),
    ToSystem(ObjectId, u32, u32, Vec2),
    ToUniverse(ObjectId),
    ToGalaxy(ObjectId, u32, Vec2),
}

#[derive(Debug, Default)]
pub struct ChunkManager {
    chunks: BTreeMap<ChunkKey, Chunk>,
    object_index: AHashMap<ObjectId, ChunkKey>,
    /// Per-galaxy starmap points; persisted as `.sa2map` files.
    starmap_points: BTreeMap<u32, Vec<MapPoint>>,
    universe_points: Vec<MapPoint>,
}

impl ChunkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// km per coordinate unit at the given chunk level.
    pub fn scale_for(galaxy: u32, system: u32) -> f64 {
        if galaxy == 0 {
            UNIVERSE_SCALE_KM_PER_UNIT
        } else if system == 0 {
            STARMAP_SCALE_KM_PER_UNIT
        } else {
            SYSTEM_SCALE_KM_PER_UNIT
        }
    }

    pub fn insert_chunk(&mut self, chunk: Chunk) {
        let key = chunk.key();
        for object in chunk.objects() {
            self.object_index.insert(object.id(), key);
        }
        self.chunks.insert(key, chunk);
    }

    /// Fetch a chunk, creating an empty one on first touch.
    pub fn ensure_chunk(&mut self, galaxy: u32, system: u32) -> &mut Chunk {
        let key = ChunkKey { galaxy, system };
        self.chunks
            .entry(key)
            .or_insert_with(|| Chunk::new(galaxy, system))
    }

    pub fn get_mut(&mut self, galaxy: u32, system: u32) -> Option<&mut Chunk> {
        self.chunks.get_mut(&ChunkKey { galaxy, system })
    }

    pub fn get(&self, galaxy: u32, system: u32) -> Option<&Chunk> {
        self.chunks.get(&ChunkKey { galaxy, system })
    }

    pub fn keys(&self) -> Vec<ChunkKey> {
        self.chunks.keys().copied().collect()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    // === Object index ===

    pub fn register_object(&mut self, id: ObjectId, galaxy: u32, system: u32) {
        self.object_index.insert(id, ChunkKey { galaxy, system });
    }

    pub fn unregister_object(&mut self, id: ObjectId) -> bool {
        self.object_index.remove(&id).is_some()
    }

    pub fn chunk_of(&self, id: ObjectId) -> Option<ChunkKey> {
        self.object_index.get(&id).copied()
    }

    pub fn find_vessel(&self, id: ObjectId) -> Option<&Vessel> {
        let key = self.chunk_of(id)?;
        self.chunks.get(&key)?.get(id)?.as_vessel()
    }

    pub fn find_vessel_mut(&mut self, id: ObjectId) -> Option<&mut Vessel> {
        let key = self.chunk_of(id)?;
        self.chunks.get_mut(&key)?.get_mut(id)?.as_vessel_mut()
    }

    // === Map points ===

    pub fn set_starmap_points(&mut self, galaxy: u32, points: Vec<MapPoint>) {
        self.starmap_points.insert(galaxy, points);
    }

    pub fn set_universe_points(&mut self, points: Vec<MapPoint>) {
        self.universe_points = points;
    }

    pub fn ensure_starmap_points(&mut self, galaxy: u32) -> &[MapPoint] {
        self.starmap_points.entry(galaxy).or_insert_with(|| {
            vec![MapPoint {
                id: 1,
                name: "Home System".to_owned(),
                x: 0.0,
                y: 0.0,
            }]
        })
    }

    pub fn ensure_universe_points(&mut self) -> &[MapPoint] {
        if self.universe_points.is_empty() {
            self.universe_points.push(MapPoint {
                id: 1,
                name: "Milky Way".to_owned(),
                x: 0.0,
                y: 0.0,
            });
        }
        &self.universe_points
    }

    pub fn starmap_galaxies(&self) -> impl Iterator<Item = (&u32, &Vec<MapPoint>)> {
        self.starmap_points.iter()
    }

    pub fn universe_points(&self) -> &[MapPoint] {
        &self.universe_points
    }

    /// Deterministic spiral placement for a newly charted system.
    pub fn add_system_point_if_missing(&mut self, galaxy: u32, system: u32) {
        self.ensure_starmap_points(galaxy);
        let Some(points) = self.starmap_points.get_mut(&galaxy) else {
            return;
        };
        if points.iter().any(|p| p.id == system) {
            return;
        }
        let r = 1.0e10 + f64::from(system) * 1.0e9;
        let ang = f64::from(system) * 0.31;
        points.push(MapPoint {
            id: system,
            name: format!("System {system}"),
            x: r * ang.cos(),
            y: r * ang.sin(),
        });
    }

    pub fn add_galaxy_point_if_missing(&mut self, galaxy: u32) {
        self.ensure_universe_points();
        if self.universe_points.iter().any(|p| p.id == galaxy) {
            return;
        }
        let r = 1.0e11 + f64::from(galaxy) * 5.0e10;
        let ang = f64::from(galaxy) * 0.17;
        self.universe_points.push(MapPoint {
            id: galaxy,
            name: format!("Galaxy {galaxy}"),
            x: r * ang.cos(),
            y: r * ang.sin(),
        });
    }

    // === Tick ===

    /// Tick every loaded chunk, then run scale transitions for vessels that
    /// crossed a boundary during the pass.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        dt: f64,
        catalog: &ContentCatalog,
        tuning: &ServerTuning,
        dir: &mut Directory,
        outbox: &mut Outbox,
        next_object_id: &mut u64,
        rng: &mut dyn RngCore,
    ) {
        for key in self.keys() {
            let Some(chunk) = self.chunks.get_mut(&key) else {
                continue;
            };
            let report = chunk.tick(dt, catalog, tuning, dir, outbox, next_object_id, rng);
            for id in report.spawned {
                self.object_index.insert(id, key);
            }
            for id in &report.removed {
                self.object_index.remove(id);
            }
        }
        self.run_migrations(dir);
    }

    fn run_migrations(&mut self, dir: &mut Directory) {
        let mut migrations = Vec::new();
        for key in self.keys() {
            self.collect_migrations(key, &mut migrations);
        }
        for migration in migrations {
            match migration {
                Migration::ToStarmap(id) => self.transfer_to_starmap(id, dir),
                Migration::ToSystem(id, galaxy, system, point) => {
                    self.transfer_to_system(id, galaxy, system, point, dir);
                }
                Migration::ToUniverse(id) => self.transfer_to_universe(id, dir),
                Migration::ToGalaxy(id, galaxy, point) => {
                    self.transfer_to_galaxy(id, galaxy, point, dir);
                }
            }
        }
    }

    fn collect_migrations(&mut self, key: ChunkKey, out: &mut Vec<Migration>) {
        let starmap_points = if key.galaxy > 0 && key.system == 0 {
            self.ensure_starmap_points(key.galaxy).to_vec()
        } else {
            Vec::new()
        };
        let universe_points = if key.galaxy == 0 {
            self.ensure_universe_points().to_vec()
        } else {
            Vec::new()
        };

        let Some(chunk) = self.chunks.get_mut(&key) else {
            return;
        };
        for object in chunk.objects_mut() {
            let Some(vessel) = object.as_vessel_mut() else {
                continue;
            };

            if key.galaxy > 0 && key.system > 0 {
                // System scale: leave for the starmap past the exit radius,
                // but only for free-flying vessels.
                if vessel.home_body.is_none()
                    && vessel.position.length() > SYSTEM_EXIT_RADIUS_KM
                {
                    out.push(Migration::ToStarmap(vessel.id));
                }
                continue;
            }

            let (points, entry_radius) = if key.galaxy > 0 {
                (&starmap_points, STARMAP_ENTRY_RADIUS)
            } else {
                (&universe_points, UNIVERSE_ENTRY_RADIUS)
            };

            // A vessel dropped onto a map spawns inside its own point's entry
            // radius; it must leave the radius once before it may enter again.
            let near = points
                .iter()
                .find(|p| vessel.position.distance(p.position()) <= entry_radius);
            if !vessel.map_entry_armed {
                if near.is_none() {
                    vessel.map_entry_armed = true;
                }
                if key.galaxy > 0 && vessel.position.length() > GALAXY_BOUNDARY_RADIUS {
                    out.push(Migration::ToUniverse(vessel.id));
                }
                continue;
            }

            if let Some(point) = near {
                if key.galaxy > 0 {
                    out.push(Migration::ToSystem(
                        vessel.id,
                        key.galaxy,
                        point.id,
                        point.position(),
                    ));
                } else {
                    out.push(Migration::ToGalaxy(vessel.id, point.id, point.position()));
                }
            } else if key.galaxy > 0 && vessel.position.length() > GALAXY_BOUNDARY_RADIUS {
                out.push(Migration::ToUniverse(vessel.id));
            }
        }
    }

    fn take_vessel(&mut self, id: ObjectId) -> Option<(ChunkKey, Box<Vessel>)> {
        let key = self.chunk_of(id)?;
        let object = self.chunks.get_mut(&key)?.remove(id)?;
        match object {
            GameObject::Vessel(vessel) => Some((key, vessel)),
            other => {
                // Not a vessel; put it back untouched.
                self.chunks.get_mut(&key)?.add(other);
                None
            }
        }
    }

    fn place_vessel(&mut self, mut vessel: Box<Vessel>, galaxy: u32, system: u32, dir: &mut Directory) {
        vessel.map_entry_armed = false;
        vessel.strongest_source = None;
        vessel.strongest_force = 0.0;
        let controller = vessel.controlled_by;
        let id = vessel.id;
        self.ensure_chunk(galaxy, system)
            .add(GameObject::Vessel(vessel));
        self.object_index.insert(id, ChunkKey { galaxy, system });
        if controller.0 != 0 {
            if let Some(player) = dir.players.get_mut(&controller) {
                player.galaxy = galaxy;
                player.system = system;
            }
        }
    }

    /// System → galaxy starmap: divide by the starmap scale, spawn near the
    /// system's own map point along the exit direction.
    pub fn transfer_to_starmap(&mut self, id: ObjectId, dir: &mut Directory) {
        let Some(key) = self.chunk_of(id) else { return };
        if key.system == 0 {
            return;
        }
        self.add_system_point_if_missing(key.galaxy, key.system);
        let point = self
            .ensure_starmap_points(key.galaxy)
            .iter()
            .find(|p| p.id == key.system)
            .map_or(Vec2::ZERO, MapPoint::position);
        let Some((_, mut vessel)) = self.take_vessel(id) else {
            return;
        };
        let direction = vessel.position.normalized_or_x();
        let ratio = SYSTEM_SCALE_KM_PER_UNIT / STARMAP_SCALE_KM_PER_UNIT;
        vessel.position = point + direction.scaled(SYSTEM_EXIT_RADIUS_KM * ratio);
        vessel.velocity = vessel.velocity.scaled(ratio);
        vessel.home_body = None;
        vessel.landed = false;
        self.place_vessel(vessel, key.galaxy, 0, dir);
    }

    /// Galaxy starmap → system: multiply back to km, spawn at the system
    /// boundary along the approach direction.
    pub fn transfer_to_system(
        &mut self,
        id: ObjectId,
        galaxy: u32,
        system: u32,
        point: Vec2,
        dir: &mut Directory,
    ) {
        let Some((_, mut vessel)) = self.take_vessel(id) else {
            return;
        };
        let direction = (point - vessel.position).normalized_or_x();
        vessel.position = direction.scaled(SYSTEM_EXIT_RADIUS_KM);
        vessel.velocity = vessel
            .velocity
            .scaled(STARMAP_SCALE_KM_PER_UNIT / SYSTEM_SCALE_KM_PER_UNIT);
        vessel.home_body = None;
        self.place_vessel(vessel, galaxy, system, dir);
    }

    /// Galaxy starmap → universe map.
    pub fn transfer_to_universe(&mut self, id: ObjectId, dir: &mut Directory) {
        let Some(key) = self.chunk_of(id) else { return };
        if key.galaxy == 0 || key.system != 0 {
            return;
        }
        self.add_galaxy_point_if_missing(key.galaxy);
        let point = self
            .universe_points
            .iter()
            .find(|p| p.id == key.galaxy)
            .map_or(Vec2::ZERO, MapPoint::position);
        let Some((_, mut vessel)) = self.take_vessel(id) else {
            return;
        };
        let direction = vessel.position.normalized_or_x();
        let ratio = STARMAP_SCALE_KM_PER_UNIT / UNIVERSE_SCALE_KM_PER_UNIT;
        vessel.position =
            point + direction.scaled(SYSTEM_EXIT_RADIUS_KM / UNIVERSE_SCALE_KM_PER_UNIT);
        vessel.velocity = vessel.velocity.scaled(ratio);
        vessel.home_body = None;
        self.place_vessel(vessel, 0, 0, dir);
    }

    /// Universe map → a galaxy's starmap.
    pub fn transfer_to_galaxy(&mut self, id: ObjectId, galaxy: u32, point: Vec2, dir: &mut Directory) {
        self.ensure_starmap_points(galaxy);
        let Some((_, mut vessel)) = self.take_vessel(id) else {
            return;
        };
        let direction = (point - vessel.position).normalized_or_x();
        vessel.position = direction.scaled(SYSTEM_EXIT_RADIUS_KM / STARMAP_SCALE_KM_PER_UNIT);
        vessel.velocity = vessel
            .velocity
            .scaled(UNIVERSE_SCALE_KM_PER_UNIT / STARMAP_SCALE_KM_PER_UNIT);
        vessel.home_body = None;
        self.place_vessel(vessel, galaxy, 0, dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, world_fixture};

    #[test]
    fn scales_by_level() {
        assert_eq!(ChunkManager::scale_for(1, 1), 1.0);
        assert_eq!(ChunkManager::scale_for(1, 0), 1.0e6);
        assert_eq!(ChunkManager::scale_for(0, 0), 1.0e9);
    }

    #[test]
    fn map_points_are_created_once_and_deterministically() {
        let mut manager = ChunkManager::new();
        assert_eq!(manager.ensure_starmap_points(1).len(), 1);
        manager.add_system_point_if_missing(1, 7);
        manager.add_system_point_if_missing(1, 7);
        let points = manager.ensure_starmap_points(1).to_vec();
        assert_eq!(points.len(), 2);
        let p7 = points.iter().find(|p| p.id == 7).unwrap();
        let r = p7.position().length();
        assert!((r - (1.0e10 + 7.0e9)).abs() < 1.0);
    }

    #[test]
    fn vessel_beyond_exit_radius_migrates_to_starmap() {
        let mut fx = world_fixture();
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        vessel.home_body = None;
        vessel.landed = false;
        vessel.position = Vec2::new(SYSTEM_EXIT_RADIUS_KM * 1.1, 0.0);
        vessel.velocity = Vec2::new(1.0e5, 0.0);
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Vessel(Box::new(vessel)));
        fx.chunks.register_object(id, 1, 1);

        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );

        let key = fx.chunks.chunk_of(id).unwrap();
        assert_eq!(key, ChunkKey { galaxy: 1, system: 0 });
        let vessel = fx.chunks.find_vessel(id).unwrap();
        assert!(vessel.home_body.is_none());
        // Velocity rescaled by the scale ratio.
        assert!((vessel.velocity.x - 0.1).abs() < 1e-9);
        assert!(!vessel.map_entry_armed);
    }

    #[test]
    fn homed_vessel_does_not_leave_its_system() {
        let mut fx = world_fixture();
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        vessel.landed = false;
        vessel.position = Vec2::new(SYSTEM_EXIT_RADIUS_KM * 1.1, 0.0);
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Vessel(Box::new(vessel)));
        fx.chunks.register_object(id, 1, 1);

        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );
        // Still homed to a planet, so still in the system chunk.
        assert_eq!(
            fx.chunks.chunk_of(id).unwrap(),
            ChunkKey { galaxy: 1, system: 1 }
        );
    }

    #[test]
    fn starmap_entry_requires_leaving_the_radius_first() {
        let mut fx = world_fixture();
        fx.chunks.ensure_chunk(1, 0);
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        vessel.home_body = None;
        vessel.landed = false;
        // Sits right on the home point: inside the entry radius, unarmed.
        vessel.position = Vec2::new(1000.0, 0.0);
        fx.chunks
            .get_mut(1, 0)
            .unwrap()
            .add(GameObject::Vessel(Box::new(vessel)));
        fx.chunks.register_object(id, 1, 0);

        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );
        assert_eq!(
            fx.chunks.chunk_of(id).unwrap(),
            ChunkKey { galaxy: 1, system: 0 },
            "unarmed vessel must not re-enter immediately"
        );

        // Move far outside every entry radius: arms the vessel.
        fx.chunks
            .find_vessel_mut(id)
            .unwrap()
            .position = Vec2::new(2.0e10, 0.0);
        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );
        assert!(fx.chunks.find_vessel(id).unwrap().map_entry_armed);

        // Back inside the home point's radius: now it enters system 1.
        fx.chunks
            .find_vessel_mut(id)
            .unwrap()
            .position = Vec2::new(100.0, 0.0);
        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );
        assert_eq!(
            fx.chunks.chunk_of(id).unwrap(),
            ChunkKey { galaxy: 1, system: 1 }
        );
        let vessel = fx.chunks.find_vessel(id).unwrap();
        assert!(
            (vessel.position.length() - SYSTEM_EXIT_RADIUS_KM).abs() < 1.0,
            "system entry spawns at the exit boundary"
        );
    }

    #[test]
    fn controller_follows_the_vessel_across_chunks() {
        let mut fx = world_fixture();
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        vessel.home_body = None;
        vessel.landed = false;
        vessel.controlled_by = test_fixtures::PLAYER;
        vessel.position = Vec2::new(SYSTEM_EXIT_RADIUS_KM * 1.5, 0.0);
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Vessel(Box::new(vessel)));
        fx.chunks.register_object(id, 1, 1);

        fx.chunks.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        );
        let player = &fx.dir.players[&test_fixtures::PLAYER];
        assert_eq!((player.galaxy, player.system), (1, 0));
    }
}
