//! One galaxy/system region of the world.
//!
//! A system chunk owns celestial bodies, vessels, and jettisoned parts and
//! integrates physics each tick; map chunks (galaxy or universe level) carry
//! only travelling vessels, with navigation points held by the chunk manager.

use std::collections::BTreeMap;

use ahash::AHashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::body::{Body, BodyKind, RegionBand};
use crate::content::{ContentCatalog, ServerTuning};
use crate::ids::{AgencyId, ObjectId, ResourceId};
use crate::math::Vec2;
use crate::object::GameObject;
use crate::outbox::{Audience, Outbox};
use crate::region::RegionId;
use crate::vessel::VesselCtx;
use crate::wire::{self, ObjectStreamItem};
use crate::world::Directory;
use crate::G;

/// Pairwise gravity acceleration clamp, km/s².
const MAX_ACCEL: f64 = 1.0e3;
/// Softening added to asteroid-to-massive distances, km.
const ASTEROID_SOFTENING_KM: f64 = 500.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkKey {
    pub galaxy: u32,
    pub system: u32,
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.galaxy, self.system)
    }
}

/// Ambient space temperature by distance from the origin star, Kelvin.
pub fn ambient_temp_k(distance_km: f64) -> f64 {
    let dist_units = (distance_km / 1.0e6).max(1.0);
    2.7 + 3300.0 / dist_units.sqrt()
}

/// Read-only view of one body, captured after body integration and handed to
/// the vessel pass.
#[derive(Debug, Clone)]
pub struct BodySnap {
    pub id: ObjectId,
    pub kind: BodyKind,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass_kg: f64,
    pub radius_km: f64,
    pub rotation_deg: f64,
    pub atmosphere_km: f64,
    pub surface_temp_k: Option<f64>,
    pub is_gas_giant: bool,
    pub is_moon: bool,
    pub vacuum_descent_tau_s: f64,
    pub surface_g_km_s2: f64,
    pub resource_yield: BTreeMap<ResourceId, f64>,
}

impl BodySnap {
    pub fn is_planet(&self) -> bool {
        self.kind == BodyKind::Planet
    }

    fn of(body: &Body) -> Self {
        Self {
            id: body.id,
            kind: body.kind,
            name: body.name.clone(),
            position: body.position,
            velocity: body.velocity,
            mass_kg: body.mass_kg,
            radius_km: body.radius_km,
            rotation_deg: body.rotation_deg,
            atmosphere_km: body.atmosphere_km,
            surface_temp_k: body.surface_temp_k,
            is_gas_giant: body.is_gas_giant,
            is_moon: body.is_moon,
            vacuum_descent_tau_s: body.vacuum_descent_tau_s,
            surface_g_km_s2: body.surface_g_km_s2(),
            resource_yield: body.resource_yield.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChunkBodies {
    snaps: Vec<BodySnap>,
    index: AHashMap<ObjectId, usize>,
}

impl ChunkBodies {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snap: BodySnap) {
        self.index.insert(snap.id, self.snaps.len());
        self.snaps.push(snap);
    }

    pub fn get(&self, id: ObjectId) -> Option<&BodySnap> {
        self.index.get(&id).map(|i| &self.snaps[*i])
    }

    pub fn planets(&self) -> impl Iterator<Item = &BodySnap> {
        self.snaps.iter().filter(|s| s.is_planet())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodySnap> {
        self.snaps.iter()
    }
}

/// Minimal view of a sibling vessel for payload behaviors (PING range checks
/// and the like).
#[derive(Debug, Clone)]
pub struct PeerVessel {
    pub id: ObjectId,
    pub agency: AgencyId,
    pub stage: u32,
    pub position: Vec2,
    pub payload_base_income: f64,
}

/// Objects removed or spawned during one chunk tick; the chunk manager keeps
/// its object index in sync from this.
#[derive(Debug, Default)]
pub struct ChunkTickReport {
    pub spawned: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
}

#[derive(Debug)]
pub struct Chunk {
    pub galaxy: u32,
    pub system: u32,
    objects: Vec<GameObject>,
    index: AHashMap<ObjectId, usize>,
    stream_seq: u16,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PhysClass {
    Asteroid,
    Massive,
    Other,
}

struct PhysEntry {
    slot: usize,
    id: ObjectId,
    position: Vec2,
    mass_kg: f64,
    radius_km: f64,
    class: PhysClass,
    is_vessel: bool,
    /// Region table for planet entries, captured for vessel classification.
    regions: Option<Vec<RegionBand>>,
}

impl Chunk {
    pub fn new(galaxy: u32, system: u32) -> Self {
        Self {
            galaxy,
            system,
            objects: Vec::new(),
            index: AHashMap::new(),
            stream_seq: 0,
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            galaxy: self.galaxy,
            system: self.system,
        }
    }

    /// Map chunks (starmap / universe level) hold no celestial physics.
    pub fn is_map_chunk(&self) -> bool {
        self.galaxy == 0 || self.system == 0
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add(&mut self, object: GameObject) {
        self.index.insert(object.id(), self.objects.len());
        self.objects.push(object);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        let slot = self.index.remove(&id)?;
        let object = self.objects.swap_remove(slot);
        if let Some(moved) = self.objects.get(slot) {
            self.index.insert(moved.id(), slot);
        }
        Some(object)
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.index.get(&id).map(|slot| &self.objects[*slot])
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.index.get(&id).map(|slot| &mut self.objects[*slot])
    }

    pub fn objects(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.objects.iter_mut()
    }

    pub fn vessel_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|o| o.as_vessel().is_some())
            .map(GameObject::id)
            .collect()
    }

    pub fn bodies_snapshot(&self) -> ChunkBodies {
        let mut bodies = ChunkBodies::empty();
        for object in &self.objects {
            if let Some(body) = object.as_body() {
                bodies.push(BodySnap::of(body));
            }
        }
        bodies
    }

    pub fn peers_snapshot(&self, catalog: &ContentCatalog) -> Vec<PeerVessel> {
        self.objects
            .iter()
            .filter_map(GameObject::as_vessel)
            .map(|v| PeerVessel {
                id: v.id,
                agency: v.agency,
                stage: v.stage,
                position: v.position,
                payload_base_income: catalog.attrs(v.payload).payload_base_income,
            })
            .collect()
    }

    /// Advance the chunk by `dt` simulated seconds.
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
    ) -> ChunkTickReport {
        let mut report = ChunkTickReport::default();

        let phys = self.collect_physics();
        let mut accels: AHashMap<usize, Vec2> = AHashMap::new();
        let mut strongest: AHashMap<usize, (ObjectId, f64)> = AHashMap::new();
        let mut region_updates: Vec<(usize, ObjectId, Option<RegionId>)> = Vec::new();

        if !self.is_map_chunk() {
            pairwise_gravity(&phys, &mut accels, &mut strongest, &mut region_updates);
            asteroid_gravity(&phys, &mut accels);
        }

        // Integrate bodies and debris; vessels run their own update below.
        let parent_states: AHashMap<ObjectId, (Vec2, Vec2, f64)> = self
            .objects
            .iter()
            .filter_map(GameObject::as_body)
            .map(|b| (b.id, (b.position, b.velocity, b.mass_kg)))
            .collect();
        let mut vessel_accs: Vec<(usize, Vec2)> = Vec::new();
        for entry in &phys {
            let acc = accels.get(&entry.slot).copied().unwrap_or(Vec2::ZERO);
            match &mut self.objects[entry.slot] {
                GameObject::Body(body) => {
                    if let Some(link) = body.orbit {
                        if let Some((pos, vel, mass)) = parent_states.get(&link.parent) {
                            body.correct_orbit(*pos, *vel, *mass);
                        }
                        body.advance_spin(dt);
                    } else {
                        body.integrate(dt, acc);
                    }
                }
                GameObject::Debris(debris) => debris.integrate(dt, acc),
                GameObject::Vessel(_) => vessel_accs.push((entry.slot, acc)),
            }
        }

        let bodies = self.bodies_snapshot();
        let peers = self.peers_snapshot(catalog);
        let chunk_key = self.key();

        // Strongest pull and region classification land on the vessels before
        // their own update.
        for (slot, (source, force)) in &strongest {
            if let Some(vessel) = self.objects[*slot].as_vessel_mut() {
                vessel.strongest_source = Some(*source);
                vessel.strongest_force = *force;
            }
        }
        for (slot, planet_id, region) in region_updates {
            let Some(snap) = bodies.get(planet_id).cloned() else {
                continue;
            };
            if let Some(vessel) = self.objects[slot].as_vessel_mut() {
                vessel.update_region(&snap, region, outbox);
            }
        }

        // Vessel pass. Ambient temperature first, then the vessel's own step.
        // Map-chunk vessels ride the same pass with zero gravity, so travel,
        // streaming, and payload logic continue between systems.
        let is_map = self.is_map_chunk();
        let mut debris_out = Vec::new();
        for (slot, acc) in vessel_accs {
            let GameObject::Vessel(vessel) = &mut self.objects[slot] else {
                continue;
            };
            if is_map {
                vessel.ambient_temp_k = 2.7;
            } else {
                let space_temp = ambient_temp_k(vessel.position.length());
                vessel.ambient_temp_k = space_temp;
                if let Some(home) = vessel.home_body.and_then(|id| bodies.get(id)) {
                    if home.atmosphere_km > 0.0 && vessel.altitude_km <= home.atmosphere_km {
                        let surface = home.surface_temp_k.unwrap_or(288.15);
                        let t = (vessel.altitude_km / home.atmosphere_km).clamp(0.0, 1.0);
                        vessel.ambient_temp_k = surface * (1.0 - t) + space_temp * t;
                    }
                }
            }

            let mut ctx = VesselCtx {
                catalog,
                tuning,
                bodies: &bodies,
                peers: &peers,
                dir: &mut *dir,
                outbox: &mut *outbox,
                chunk: chunk_key,
                debris_out: &mut debris_out,
                next_object_id: &mut *next_object_id,
                rng: &mut *rng,
            };
            vessel.tick(dt, acc, &mut ctx);
        }

        // Register parts staged off during the pass.
        for debris in debris_out {
            report.spawned.push(debris.id);
            self.add(GameObject::Debris(debris));
        }

        // Sweep destroyed vessels and expired debris.
        let dead: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|o| match o {
                GameObject::Vessel(v) => v.destroyed,
                GameObject::Debris(d) => d.expired(),
                GameObject::Body(_) => false,
            })
            .map(GameObject::id)
            .collect();
        for id in dead {
            self.remove(id);
            report.removed.push(id);
        }

        self.emit_object_stream(outbox);
        report
    }

    fn collect_physics(&self) -> Vec<PhysEntry> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_physical())
            .map(|(slot, object)| {
                let (class, regions) = match object {
                    GameObject::Body(body) => {
                        let class = match body.kind {
                            BodyKind::Asteroid => PhysClass::Asteroid,
                            _ if body.major => PhysClass::Massive,
                            _ => PhysClass::Other,
                        };
                        let regions = body
                            .is_planet()
                            .then(|| body.regions.clone())
                            .filter(|r| !r.is_empty());
                        (class, regions)
                    }
                    _ => (PhysClass::Other, None),
                };
                PhysEntry {
                    slot,
                    id: object.id(),
                    position: object.position(),
                    mass_kg: object.mass_kg(),
                    radius_km: object.radius_km(),
                    class,
                    is_vessel: object.as_vessel().is_some(),
                    regions,
                }
            })
            .collect()
    }

    /// One object-stream datagram per tick to every session viewing this
    /// galaxy/system. Sequence numbers are per chunk and wrap at 65535.
    fn emit_object_stream(&mut self, outbox: &mut Outbox) {
        let items: Vec<ObjectStreamItem> = self
            .objects
            .iter()
            .map(|o| ObjectStreamItem {
                id: o.id(),
                x_km: o.position().x,
                y_km: o.position().y,
                vx: o.velocity().x as f32,
                vy: o.velocity().y as f32,
                rotation: o.rotation_deg() as f32,
            })
            .collect();
        let frame = wire::object_stream(self.stream_seq, &items);
        self.stream_seq = (self.stream_seq + 1) % 65535;
        outbox.datagram(Audience::Chunk(self.key()), frame);
    }
}

/// Unordered-pair gravity over non-asteroids, with surface-aware softening
/// and the contact cutoff, plus per-vessel strongest-pull and region
/// tracking.
fn pairwise_gravity(
    phys: &[PhysEntry],
    accels: &mut AHashMap<usize, Vec2>,
    strongest: &mut AHashMap<usize, (ObjectId, f64)>,
    region_updates: &mut Vec<(usize, ObjectId, Option<RegionId>)>,
) {
    let non_asteroids: Vec<&PhysEntry> = phys
        .iter()
        .filter(|e| e.class != PhysClass::Asteroid)
        .collect();
    if non_asteroids.len() < 2 {
        return;
    }

    let mut forces: AHashMap<usize, Vec2> = AHashMap::new();
    for (ii, a) in non_asteroids.iter().enumerate() {
        for b in non_asteroids.iter().skip(ii + 1) {
            let diff = b.position - a.position;
            let raw = diff.length();

            // Vessel-vs-planet region classification uses the raw range.
            if a.is_vessel {
                if let Some(bands) = &b.regions {
                    let region = bands
                        .iter()
                        .find(|band| raw <= band.max_range_km)
                        .map(|band| band.region);
                    region_updates.push((a.slot, b.id, region));
                }
            }
            if b.is_vessel {
                if let Some(bands) = &a.regions {
                    let region = bands
                        .iter()
                        .find(|band| raw <= band.max_range_km)
                        .map(|band| band.region);
                    region_updates.push((b.slot, a.id, region));
                }
            }

            let max_radius = a.radius_km.max(b.radius_km);
            let softening = 0.8 * max_radius;
            let separation = (raw - (a.radius_km + b.radius_km)).max(0.0) + softening;
            let magnitude = G * a.mass_kg * b.mass_kg / (separation * separation);
            let direction = if raw > 0.0 {
                diff.scaled(1.0 / raw)
            } else {
                Vec2::ZERO
            };

            // Contact cutoff: no gravity contribution through a surface.
            if raw >= max_radius * 1.15 {
                let force = direction.scaled(magnitude);
                *forces.entry(a.slot).or_insert(Vec2::ZERO) += force;
                *forces.entry(b.slot).or_insert(Vec2::ZERO) += force.scaled(-1.0);
            }

            if a.is_vessel {
                let entry = strongest.entry(a.slot).or_insert((b.id, magnitude));
                if magnitude >= entry.1 {
                    *entry = (b.id, magnitude);
                }
            }
            if b.is_vessel {
                let entry = strongest.entry(b.slot).or_insert((a.id, magnitude));
                if magnitude >= entry.1 {
                    *entry = (a.id, magnitude);
                }
            }
        }
    }

    for entry in &non_asteroids {
        if entry.mass_kg <= 0.0 {
            continue;
        }
        let force = forces.get(&entry.slot).copied().unwrap_or(Vec2::ZERO);
        let mut acc = force.scaled(1.0 / entry.mass_kg);
        let mag = acc.length();
        if mag > MAX_ACCEL {
            acc = acc.scaled(MAX_ACCEL / mag);
        }
        accels.insert(entry.slot, acc);
    }
}

/// Asteroids feel only the massive bodies, with flat softening.
fn asteroid_gravity(phys: &[PhysEntry], accels: &mut AHashMap<usize, Vec2>) {
    let massive: Vec<&PhysEntry> = phys
        .iter()
        .filter(|e| e.class == PhysClass::Massive)
        .collect();
    for asteroid in phys.iter().filter(|e| e.class == PhysClass::Asteroid) {
        let mut acc = Vec2::ZERO;
        for body in &massive {
            let diff = body.position - asteroid.position;
            let r2 = diff.dot(diff) + 1e-12;
            let r = r2.sqrt();
            let effective = r + ASTEROID_SOFTENING_KM;
            let inv = 1.0 / (effective * r2).max(1e-12);
            acc += diff.scaled(G * body.mass_kg * inv);
        }
        let mag = acc.length();
        if mag > MAX_ACCEL {
            acc = acc.scaled(MAX_ACCEL / mag);
        }
        accels.insert(asteroid.slot, acc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{self, world_fixture};
    use crate::wire::Datagram;

    fn tick_chunk(fx: &mut test_fixtures::WorldFixture) -> ChunkTickReport {
        let chunk = fx.chunks.get_mut(1, 1).unwrap();
        chunk.tick(
            1.0,
            &fx.catalog,
            &fx.tuning,
            &mut fx.dir,
            &mut fx.outbox,
            &mut fx.next_object_id,
            &mut fx.rng,
        )
    }

    #[test]
    fn free_body_accelerates_toward_the_star() {
        let mut fx = world_fixture();
        // Drop a free-falling rock near Earth orbit distance.
        let rock = crate::body::Body {
            id: ObjectId(500),
            kind: BodyKind::Asteroid,
            name: "rock".into(),
            position: Vec2::new(1.0e8, 0.0),
            velocity: Vec2::ZERO,
            mass_kg: 1.0e6,
            radius_km: 1.0,
            rotation_deg: 0.0,
            spin_deg_per_s: 0.0,
            atmosphere_km: 0.0,
            surface_temp_k: None,
            resource_yield: BTreeMap::new(),
            is_gas_giant: false,
            is_moon: false,
            major: false,
            orbit: None,
            vacuum_descent_tau_s: 12.0,
            regions: Vec::new(),
        };
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Body(rock));

        tick_chunk(&mut fx);

        let chunk = fx.chunks.get_mut(1, 1).unwrap();
        let rock = chunk.get(ObjectId(500)).unwrap();
        assert!(
            rock.velocity().x < 0.0,
            "the star's pull must point toward the origin"
        );
    }

    #[test]
    fn orbit_locked_planet_ignores_gravity_and_keeps_radius() {
        let mut fx = world_fixture();
        let before = {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            chunk
                .get(test_fixtures::EARTH)
                .unwrap()
                .position()
                .length()
        };
        for _ in 0..10 {
            tick_chunk(&mut fx);
        }
        let after = {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            chunk
                .get(test_fixtures::EARTH)
                .unwrap()
                .position()
                .length()
        };
        assert!(
            (before - after).abs() < 1.0,
            "orbit-snapped body must hold its radial distance"
        );
    }

    #[test]
    fn planets_spin_each_tick() {
        let mut fx = world_fixture();
        let before = fx
            .chunks
            .get_mut(1, 1)
            .unwrap()
            .get(test_fixtures::EARTH)
            .unwrap()
            .rotation_deg();
        tick_chunk(&mut fx);
        let after = fx
            .chunks
            .get_mut(1, 1)
            .unwrap()
            .get(test_fixtures::EARTH)
            .unwrap()
            .rotation_deg();
        assert!(after > before, "axial spin must advance");
    }

    #[test]
    fn object_stream_sequence_is_monotonic_mod_65535() {
        let mut fx = world_fixture();
        let mut last: Option<u16> = None;
        for _ in 0..5 {
            tick_chunk(&mut fx);
        }
        let frames: Vec<&crate::outbox::OutFrame> = fx
            .outbox
            .frames()
            .iter()
            .filter(|f| f.bytes.first() == Some(&(Datagram::ObjectStream as u8)))
            .collect();
        assert_eq!(frames.len(), 5);
        for frame in frames {
            let mut r = wire::ByteReader::new(&frame.bytes[1..]);
            let seq = r.u16().unwrap();
            if let Some(prev) = last {
                assert_eq!(seq, (prev + 1) % 65535);
            }
            last = Some(seq);
        }
    }

    #[test]
    fn object_stream_carries_every_object() {
        let mut fx = world_fixture();
        let count = fx.chunks.get_mut(1, 1).unwrap().len();
        tick_chunk(&mut fx);
        let frame = fx
            .outbox
            .frames()
            .iter()
            .find(|f| f.bytes.first() == Some(&(Datagram::ObjectStream as u8)))
            .unwrap();
        let mut r = wire::ByteReader::new(&frame.bytes[1..]);
        let _seq = r.u16().unwrap();
        let streamed = r.u16().unwrap() as usize;
        assert_eq!(streamed, count);
        assert_eq!(frame.audience, Audience::Chunk(ChunkKey { galaxy: 1, system: 1 }));
    }

    #[test]
    fn expired_debris_is_swept() {
        let mut fx = world_fixture();
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Debris(crate::object::Debris {
                id: ObjectId(600),
                component_type: crate::ids::ComponentTypeId(40),
                agency: test_fixtures::AGENCY,
                position: Vec2::new(1.0e8, 0.0),
                velocity: Vec2::ZERO,
                mass_kg: 10.0,
                radius_km: 0.2,
                rotation_deg: 0.0,
                lifetime_s: 1.5,
            }));

        let report = tick_chunk(&mut fx);
        assert!(report.removed.is_empty());
        let report = tick_chunk(&mut fx);
        assert_eq!(report.removed, vec![ObjectId(600)]);
        assert!(fx.chunks.get_mut(1, 1).unwrap().get(ObjectId(600)).is_none());
    }

    #[test]
    fn vessel_ambient_blends_surface_to_space_inside_atmosphere() {
        let mut fx = world_fixture();
        let vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            let mut vessel = vessel;
            vessel.altitude_km = 0.0; // at the surface
            vessel.landed = true;
            let earth = chunk.get(test_fixtures::EARTH).unwrap();
            vessel.position = earth.position() + Vec2::new(earth.radius_km(), 0.0);
            chunk.add(GameObject::Vessel(Box::new(vessel)));
        }
        tick_chunk(&mut fx);
        let chunk = fx.chunks.get_mut(1, 1).unwrap();
        let vessel = chunk.get(id).and_then(GameObject::as_vessel).unwrap();
        // Earth fixture surface temperature is 288.15 K; at zero altitude the
        // blend is fully surface.
        assert!(
            (vessel.ambient_temp_k - 288.15).abs() < 1.0,
            "surface ambient, got {}",
            vessel.ambient_temp_k
        );
    }

    #[test]
    fn vessel_region_updates_from_planet_bands() {
        let mut fx = world_fixture();
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        vessel.landed = false;
        vessel.altitude_km = 50.0;
        let id = vessel.id;
        {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            let earth = chunk.get(test_fixtures::EARTH).unwrap();
            // Within the innermost fixture band.
            vessel.position = earth.position() + Vec2::new(8_000.0, 0.0);
            chunk.add(GameObject::Vessel(Box::new(vessel)));
        }
        tick_chunk(&mut fx);
        let chunk = fx.chunks.get_mut(1, 1).unwrap();
        let vessel = chunk.get(id).and_then(GameObject::as_vessel).unwrap();
        assert_eq!(vessel.region, crate::region::known::EARTH_CLOSE);
        assert!(vessel.strongest_source.is_some());
    }

    #[test]
    fn landing_initiation_completes_after_six_seconds_over_the_planet() {
        let mut fx = world_fixture();
        let mut vessel = test_fixtures::orbiting_vessel(&fx.catalog);
        let id = vessel.id;
        let (earth_pos, atm) = {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            let earth = chunk.get(test_fixtures::EARTH).unwrap();
            let atm = earth.as_body().unwrap().atmosphere_km;
            (earth.position(), atm)
        };
        vessel.landed = false;
        vessel.altitude_km = atm;
        vessel.z_velocity = 0.0;
        vessel.position = earth_pos; // centered over the planet
        vessel.velocity = {
            let chunk = fx.chunks.get_mut(1, 1).unwrap();
            chunk.get(test_fixtures::EARTH).unwrap().velocity()
        };
        fx.chunks
            .get_mut(1, 1)
            .unwrap()
            .add(GameObject::Vessel(Box::new(vessel)));

        for _ in 0..6 {
            tick_chunk(&mut fx);
        }

        let chunk = fx.chunks.get_mut(1, 1).unwrap();
        let vessel = chunk.get(id).and_then(GameObject::as_vessel).unwrap();
        assert_eq!(vessel.landing_progress, 6.0);
        assert!(
            (vessel.altitude_km - (atm - 1.0)).abs() < 0.05,
            "altitude should sit just inside the atmosphere, got {}",
            vessel.altitude_km
        );
        assert!(vessel.z_velocity <= 0.0);
    }
}
