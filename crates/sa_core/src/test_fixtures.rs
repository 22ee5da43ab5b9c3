//! Shared fixtures for unit tests (and external test crates via the
//! `test-support` feature): a small content catalog, a home system, and
//! pre-wired vessels for each payload kind.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::agency::Agency;
use crate::body::{Body, BodyKind, OrbitLink, RegionBand};
use crate::chunk::{BodySnap, Chunk, ChunkBodies, ChunkKey, PeerVessel};
use crate::content::{
    BuildingDef, BuildingRole, ComponentAttributes, ComponentDef, ContentCatalog, LevelUnlocks,
    ResourceDef, ServerTuning, ThrusterAttrs,
};
use crate::ids::{
    AgencyId, BuildingTypeId, ComponentTypeId, ObjectId, PlayerId, ResourceId,
};
use crate::math::Vec2;
use crate::object::{Debris, GameObject};
use crate::outbox::Outbox;
use crate::payload::kinds;
use crate::player::Player;
use crate::region::known;
use crate::vessel::{AttachedComponent, Vessel, VesselCtx};
use crate::world::{Directory, World};

pub const PLAYER: PlayerId = PlayerId(1);
pub const AGENCY: AgencyId = AgencyId(1);

pub const SUN: ObjectId = ObjectId(1);
pub const EARTH: ObjectId = ObjectId(2);
pub const MOON: ObjectId = ObjectId(3);
pub const MARS: ObjectId = ObjectId(4);
pub const VENUS: ObjectId = ObjectId(5);
pub const JUPITER: ObjectId = ObjectId(6);

pub const METAL: ResourceId = ResourceId(1);

pub const COMMS_PAYLOAD: ComponentTypeId = kinds::COMMS_SATELLITE;
pub const HULL_COMPONENT: ComponentTypeId = ComponentTypeId(30);
pub const ENGINE_COMPONENT: ComponentTypeId = ComponentTypeId(40);
pub const ION_MODULE: ComponentTypeId = ComponentTypeId(41);
pub const WARP_MODULE: ComponentTypeId = ComponentTypeId(42);
pub const BUILDER_MODULE: ComponentTypeId = ComponentTypeId(43);

pub const HQ_BUILDING: BuildingTypeId = BuildingTypeId(1);
pub const MOON_HQ_BUILDING: BuildingTypeId = BuildingTypeId(10);

pub fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}

pub fn tuning() -> ServerTuning {
    ServerTuning::default()
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

fn payload_def(name: &str, extra: ComponentAttributes) -> ComponentDef {
    ComponentDef {
        name: name.to_owned(),
        cost: 1_000,
        mass_kg: 100.0,
        resource_cost: BTreeMap::new(),
        attributes: ComponentAttributes {
            is_payload: true,
            payload_base_income: 5.0,
            power_capacity: 100.0,
            solar_power: 1.0,
            ..extra
        },
    }
}

pub fn catalog() -> ContentCatalog {
    let mut catalog = ContentCatalog {
        content_version: "fixture-1".to_owned(),
        ..ContentCatalog::default()
    };

    catalog
        .components
        .insert(kinds::COMMS_SATELLITE, payload_def("Comms Satellite", ComponentAttributes::default()));
    catalog
        .components
        .insert(kinds::SPACE_TELESCOPE, payload_def("Space Telescope", ComponentAttributes::default()));
    catalog
        .components
        .insert(kinds::PROBE, payload_def("Probe", ComponentAttributes::default()));
    catalog
        .components
        .insert(kinds::SOLAR_ORBITER, payload_def("Solar Orbiter", ComponentAttributes::default()));
    catalog.components.insert(
        kinds::LUNAR_LANDER,
        payload_def(
            "Lunar Lander",
            ComponentAttributes {
                seats: 3,
                deploy_landed: true,
                ..ComponentAttributes::default()
            },
        ),
    );
    catalog.components.insert(
        kinds::SPACE_SHUTTLE,
        payload_def(
            "Space Shuttle",
            ComponentAttributes {
                seats: 5,
                ..ComponentAttributes::default()
            },
        ),
    );
    catalog.components.insert(
        kinds::ROVER,
        payload_def(
            "Rover",
            ComponentAttributes {
                deploy_landed: true,
                cargo_capacity: 10,
                ..ComponentAttributes::default()
            },
        ),
    );

    catalog.components.insert(
        HULL_COMPONENT,
        ComponentDef {
            name: "Hull Section".to_owned(),
            cost: 500,
            mass_kg: 200.0,
            resource_cost: BTreeMap::new(),
            attributes: ComponentAttributes::default(),
        },
    );
    catalog.components.insert(
        ENGINE_COMPONENT,
        ComponentDef {
            name: "Booster Stage".to_owned(),
            cost: 5_000,
            mass_kg: 500.0,
            resource_cost: BTreeMap::from([(METAL, 10)]),
            attributes: ComponentAttributes {
                liquid_fuel: 50.0,
                stage_add: 1,
                forward: ThrusterAttrs {
                    thrust_kn: 50.0,
                    fuel_consumption: 100.0,
                    fire_heat: 1.0,
                    output_point: Some((0.0, 2.0)),
                    thrust_direction_deg: 0.0,
                },
                ..ComponentAttributes::default()
            },
        },
    );
    catalog.components.insert(
        ION_MODULE,
        ComponentDef {
            name: "Ion Drive".to_owned(),
            cost: 3_000,
            mass_kg: 50.0,
            resource_cost: BTreeMap::new(),
            attributes: ComponentAttributes {
                ion_drive: 5.0,
                ion_drive_power_draw: 10.0,
                power_capacity: 100.0,
                ..ComponentAttributes::default()
            },
        },
    );
    catalog.components.insert(
        WARP_MODULE,
        ComponentDef {
            name: "Warp Drive".to_owned(),
            cost: 50_000,
            mass_kg: 300.0,
            resource_cost: BTreeMap::new(),
            attributes: ComponentAttributes {
                warp_drive: 2.0,
                warp_drive_power_draw: 10.0,
                power_capacity: 1_000.0,
                max_warp: 2.0,
                ..ComponentAttributes::default()
            },
        },
    );
    catalog.components.insert(
        BUILDER_MODULE,
        ComponentDef {
            name: "Base Kit".to_owned(),
            cost: 8_000,
            mass_kg: 400.0,
            resource_cost: BTreeMap::new(),
            attributes: ComponentAttributes {
                build_on_land: Some(("Luna".to_owned(), MOON_HQ_BUILDING)),
                ..ComponentAttributes::default()
            },
        },
    );

    catalog.buildings.insert(
        HQ_BUILDING,
        BuildingDef {
            name: "Headquarters".to_owned(),
            role: BuildingRole::Headquarters,
            cost: 0,
            build_time: 1,
            base_income: 10,
            upgrade_costs: BTreeMap::from([(2, 50_000), (3, 100_000)]),
            unlocks: BTreeMap::from([(
                1,
                LevelUnlocks {
                    add_base_storage: 1_000,
                    ..LevelUnlocks::default()
                },
            )]),
        },
    );
    catalog.buildings.insert(
        MOON_HQ_BUILDING,
        BuildingDef {
            name: "Moon Headquarters".to_owned(),
            role: BuildingRole::Generic,
            cost: 250_000,
            build_time: 10,
            base_income: 50,
            upgrade_costs: BTreeMap::new(),
            unlocks: BTreeMap::new(),
        },
    );

    catalog.resources.insert(
        METAL,
        ResourceDef {
            name: "Metal".to_owned(),
            sale_rate: 7,
        },
    );

    catalog
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

fn body(id: ObjectId, kind: BodyKind, name: &str) -> Body {
    Body {
        id,
        kind,
        name: name.to_owned(),
        position: Vec2::ZERO,
        velocity: Vec2::ZERO,
        mass_kg: 1.0,
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
    }
}

pub fn home_system_bodies() -> Vec<Body> {
    let mut sun = body(SUN, BodyKind::Star, "Sun");
    sun.mass_kg = 1.989e30;
    sun.radius_km = 695_700.0;
    sun.major = true;

    let mut earth = body(EARTH, BodyKind::Planet, "Earth");
    earth.position = Vec2::new(1.52e8, 0.0);
    earth.velocity = Vec2::new(0.0, -29.78);
    earth.mass_kg = 5.972e24;
    earth.radius_km = 6_371.0;
    earth.spin_deg_per_s = 360.0 / 86_400.0;
    earth.atmosphere_km = 100.0;
    earth.surface_temp_k = Some(288.15);
    earth.major = true;
    earth.orbit = Some(OrbitLink {
        parent: SUN,
        direction: 1,
    });
    earth.regions = vec![
        RegionBand {
            max_range_km: 10_000.0,
            region: known::EARTH_CLOSE,
        },
        RegionBand {
            max_range_km: 100_000.0,
            region: known::EARTH_NEAR,
        },
        RegionBand {
            max_range_km: 1.0e6,
            region: known::EARTH_DISTANT,
        },
    ];

    let mut moon = body(MOON, BodyKind::Planet, "Luna");
    moon.position = Vec2::new(1.52e8 + 384_400.0, 0.0);
    moon.velocity = Vec2::new(0.0, -28.76);
    moon.mass_kg = 7.342e22;
    moon.radius_km = 1_737.0;
    moon.is_moon = true;
    moon.resource_yield = BTreeMap::from([(METAL, 1.0)]);

    let mut mars = body(MARS, BodyKind::Planet, "Mars");
    mars.position = Vec2::new(-2.28e8, 0.0);
    mars.velocity = Vec2::new(0.0, 24.07);
    mars.mass_kg = 6.417e23;
    mars.radius_km = 3_389.0;
    mars.atmosphere_km = 50.0;
    mars.surface_temp_k = Some(210.0);
    mars.major = true;
    mars.resource_yield = BTreeMap::from([(METAL, 2.0)]);

    let mut venus = body(VENUS, BodyKind::Planet, "Venus");
    venus.position = Vec2::new(0.0, 1.08e8);
    venus.velocity = Vec2::new(-35.02, 0.0);
    venus.mass_kg = 4.867e24;
    venus.radius_km = 6_051.0;
    venus.atmosphere_km = 250.0;
    venus.surface_temp_k = Some(737.0);
    venus.major = true;

    let mut jupiter = body(JUPITER, BodyKind::Planet, "Jupiter");
    jupiter.position = Vec2::new(7.78e8, 0.0);
    jupiter.velocity = Vec2::new(0.0, -13.07);
    jupiter.mass_kg = 1.898e27;
    jupiter.radius_km = 69_911.0;
    jupiter.is_gas_giant = true;
    jupiter.major = true;

    vec![sun, earth, moon, mars, venus, jupiter]
}

pub fn bodies_snapshot() -> ChunkBodies {
    let mut chunk = Chunk::new(1, 1);
    for b in home_system_bodies() {
        chunk.add(GameObject::Body(b));
    }
    chunk.bodies_snapshot()
}

// ---------------------------------------------------------------------------
// Vessel context parts
// ---------------------------------------------------------------------------

/// Owned storage behind a [`VesselCtx`]; split-borrowed by [`make_ctx`].
pub struct CtxParts {
    pub tuning: ServerTuning,
    pub bodies: ChunkBodies,
    pub peers: Vec<PeerVessel>,
    pub dir: Directory,
    pub outbox: Outbox,
    pub debris: Vec<Debris>,
    pub next_object_id: u64,
    pub rng: ChaCha8Rng,
}

pub fn ctx_parts(catalog: &ContentCatalog) -> CtxParts {
    let _ = catalog;
    let mut dir = Directory::default();
    let mut player = Player::new(PLAYER, 0);
    player.agency = AGENCY;
    player.connected = true;
    dir.players.insert(PLAYER, player);

    let mut agency = Agency::new(AGENCY, "Fixture Agency".to_owned(), true);
    agency.add_member(PLAYER);
    agency
        .inventories
        .insert(EARTH, BTreeMap::from([(METAL, 100)]));
    agency.capacities.insert(EARTH, 1_000);
    dir.agencies.insert(AGENCY, agency);

    CtxParts {
        tuning: tuning(),
        bodies: bodies_snapshot(),
        peers: Vec::new(),
        dir,
        outbox: Outbox::new(),
        debris: Vec::new(),
        next_object_id: 10_000,
        rng: rng(),
    }
}

pub fn make_ctx<'a>(catalog: &'a ContentCatalog, parts: &'a mut CtxParts) -> VesselCtx<'a> {
    VesselCtx {
        catalog,
        tuning: &parts.tuning,
        bodies: &parts.bodies,
        peers: &parts.peers,
        dir: &mut parts.dir,
        outbox: &mut parts.outbox,
        chunk: ChunkKey {
            galaxy: 1,
            system: 1,
        },
        debris_out: &mut parts.debris,
        next_object_id: &mut parts.next_object_id,
        rng: &mut parts.rng,
    }
}

// ---------------------------------------------------------------------------
// Vessels
// ---------------------------------------------------------------------------

/// No components, unit-ish mass; for raw physics math.
pub fn bare_vessel() -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(100), "Test Vessel".to_owned(), AGENCY, PLAYER);
    vessel.mass_kg = 1_000.0;
    vessel
}

/// Deployed payload-only vessel homed to Earth, 50 km up, airborne.
pub fn orbiting_vessel(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(100), "Orbiter".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![AttachedComponent {
        kind: COMMS_PAYLOAD,
        x: 0.0,
        y: 0.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    }];
    vessel.stage = 0;
    vessel.num_stages = 1;
    vessel.payload = COMMS_PAYLOAD;
    vessel.rebuild_stats(catalog);
    vessel.home_body = Some(EARTH);
    vessel.launch_body = Some(EARTH);
    vessel.landed = false;
    vessel.altitude_km = 50.0;
    vessel.position = Vec2::new(1.52e8 + 7_000.0, 0.0);
    vessel.velocity = Vec2::new(0.0, -29.78);
    vessel
}

/// Comms payload on a fueled booster stage; stage 1 is current.
pub fn two_stage_vessel(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(101), "Two Stage".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![
        AttachedComponent {
            kind: COMMS_PAYLOAD,
            x: 0.0,
            y: 10.0,
            paint1: 0,
            paint2: 0,
            stage: 0,
        },
        AttachedComponent {
            kind: ENGINE_COMPONENT,
            x: 0.0,
            y: -10.0,
            paint1: 0,
            paint2: 0,
            stage: 1,
        },
    ];
    vessel.stage = 1;
    vessel.num_stages = 2;
    vessel.payload = COMMS_PAYLOAD;
    vessel.rebuild_stats(catalog);
    vessel.home_body = Some(EARTH);
    vessel.launch_body = Some(EARTH);
    vessel.landed = false;
    vessel.altitude_km = 100.0;
    vessel.position = Vec2::new(1.52e8 + 7_000.0, 0.0);
    vessel.velocity = Vec2::new(0.0, -29.78);
    vessel
}

fn with_module(catalog: &ContentCatalog, module: ComponentTypeId) -> Vessel {
    let mut vessel = orbiting_vessel(catalog);
    vessel.components.push(AttachedComponent {
        kind: module,
        x: 0.0,
        y: -5.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    });
    vessel.rebuild_stats(catalog);
    vessel
}

/// Orbiter carrying a powered warp drive at the top of the atmosphere.
pub fn warp_vessel(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = with_module(catalog, WARP_MODULE);
    vessel.altitude_km = 100.0;
    if let Some(sys) = vessel
        .systems
        .get_mut(&crate::vessel::SystemKind::WarpDrive)
    {
        sys.active = true;
    }
    vessel
}

/// Orbiter carrying a powered ion drive.
pub fn ion_vessel(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = with_module(catalog, ION_MODULE);
    if let Some(sys) = vessel.systems.get_mut(&crate::vessel::SystemKind::IonDrive) {
        sys.active = true;
    }
    vessel
}

pub fn deployed_comms_sat(catalog: &ContentCatalog) -> Vessel {
    orbiting_vessel(catalog)
}

pub fn deployed_telescope(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(110), "Telescope".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![AttachedComponent {
        kind: kinds::SPACE_TELESCOPE,
        x: 0.0,
        y: 0.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    }];
    vessel.payload = kinds::SPACE_TELESCOPE;
    vessel.rebuild_stats(catalog);
    vessel.position = Vec2::new(5.0e7, 0.0);
    vessel
}

pub fn deployed_probe(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(111), "Probe".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![AttachedComponent {
        kind: kinds::PROBE,
        x: 0.0,
        y: 0.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    }];
    vessel.payload = kinds::PROBE;
    vessel.rebuild_stats(catalog);
    vessel.home_body = Some(EARTH);
    vessel.launch_body = Some(EARTH);
    vessel.position = Vec2::new(1.4e8, 0.0);
    vessel
}

pub fn deployed_solar_orbiter(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(112), "Helios".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![AttachedComponent {
        kind: kinds::SOLAR_ORBITER,
        x: 0.0,
        y: 0.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    }];
    vessel.payload = kinds::SOLAR_ORBITER;
    vessel.rebuild_stats(catalog);
    vessel.position = Vec2::new(0.5 * crate::AU_KM, 0.0);
    vessel
}

/// Rover landed on Mars, which carries a resource-yield table.
pub fn landed_rover(catalog: &ContentCatalog) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(113), "Rover 1".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![AttachedComponent {
        kind: kinds::ROVER,
        x: 0.0,
        y: 0.0,
        paint1: 0,
        paint2: 0,
        stage: 0,
    }];
    vessel.payload = kinds::ROVER;
    vessel.rebuild_stats(catalog);
    vessel.home_body = Some(MARS);
    vessel.last_landed_body = Some(MARS);
    vessel.landed = true;
    vessel.position = Vec2::new(-2.28e8 + 3_389.0, 0.0);
    vessel
}

/// Landed lander with one seated astronaut and a build-on-land kit.
pub fn crewed_lander(catalog: &ContentCatalog, parts: &mut CtxParts) -> Vessel {
    let mut vessel = Vessel::new_empty(ObjectId(114), "Eagle".to_owned(), AGENCY, PLAYER);
    vessel.components = vec![
        AttachedComponent {
            kind: kinds::LUNAR_LANDER,
            x: 0.0,
            y: 0.0,
            paint1: 0,
            paint2: 0,
            stage: 0,
        },
        AttachedComponent {
            kind: BUILDER_MODULE,
            x: 0.0,
            y: -3.0,
            paint1: 0,
            paint2: 0,
            stage: 0,
        },
    ];
    vessel.payload = kinds::LUNAR_LANDER;
    vessel.rebuild_stats(catalog);
    vessel.home_body = Some(MOON);
    vessel.landed = true;

    let astro = parts
        .dir
        .agencies
        .get_mut(&AGENCY)
        .expect("fixture agency")
        .create_astronaut("Fixture Astronaut".to_owned(), None, &mut parts.rng);
    if let Some(a) = parts
        .dir
        .agencies
        .get_mut(&AGENCY)
        .and_then(|ag| ag.astronauts.get_mut(&astro))
    {
        a.vessel = Some(vessel.id);
    }
    vessel.astronauts_onboard.push(astro);
    vessel
}

// ---------------------------------------------------------------------------
// Whole-world fixtures
// ---------------------------------------------------------------------------

/// The pieces `construct_vessel` and chunk tests need, without a full `World`.
pub struct WorldFixture {
    pub catalog: ContentCatalog,
    pub tuning: ServerTuning,
    pub dir: Directory,
    pub chunks: crate::chunk_manager::ChunkManager,
    pub outbox: Outbox,
    pub next_object_id: u64,
    pub rng: ChaCha8Rng,
}

pub fn world_fixture() -> WorldFixture {
    let catalog = catalog();
    let mut chunks = crate::chunk_manager::ChunkManager::new();
    let mut chunk = Chunk::new(1, 1);
    for b in home_system_bodies() {
        chunk.add(GameObject::Body(b));
    }
    chunks.insert_chunk(chunk);

    let mut dir = Directory::default();
    let mut player = Player::new(PLAYER, 100_000);
    player.agency = AGENCY;
    player.connected = true;
    dir.players.insert(PLAYER, player);
    let mut agency = Agency::new(AGENCY, "Fixture Agency".to_owned(), true);
    agency.add_member(PLAYER);
    agency
        .inventories
        .insert(EARTH, BTreeMap::from([(METAL, 100)]));
    agency.capacities.insert(EARTH, 1_000);
    dir.agencies.insert(AGENCY, agency);

    WorldFixture {
        catalog,
        tuning: tuning(),
        dir,
        chunks,
        outbox: Outbox::new(),
        next_object_id: 1_000,
        rng: rng(),
    }
}

/// A full `World` with the home chunk loaded.
pub fn seeded_world() -> World {
    let mut world = World::new(catalog(), tuning(), 42);
    let mut chunk = Chunk::new(1, 1);
    for b in home_system_bodies() {
        chunk.add(GameObject::Body(b));
    }
    world.chunks.insert_chunk(chunk);
    world.restore_id_watermark();
    world
}

/// Spawn an uncontrolled orbiter into the home chunk of a seeded world.
pub fn spawn_vessel(world: &mut World) -> ObjectId {
    let mut vessel = orbiting_vessel(&world.catalog);
    let id = world.alloc_object_id();
    vessel.id = id;
    vessel.agency = AgencyId(0);
    world
        .chunks
        .get_mut(1, 1)
        .expect("home chunk")
        .add(GameObject::Vessel(Box::new(vessel)));
    world.chunks.register_object(id, 1, 1);
    id
}

/// Spawn a deployed comms satellite hugging Earth with a networking upgrade,
/// owned by the given agency.
pub fn spawn_networked_sat(
    world: &mut World,
    agency: AgencyId,
    upgrade: crate::ids::UpgradeId,
) -> ObjectId {
    let earth_pos = world
        .chunks
        .get(1, 1)
        .expect("home chunk")
        .get(EARTH)
        .expect("earth")
        .position();
    let mut vessel = orbiting_vessel(&world.catalog);
    let id = world.alloc_object_id();
    vessel.id = id;
    vessel.agency = agency;
    vessel.position = earth_pos + Vec2::new(6_371.0 * 2.0, 0.0);
    vessel
        .unlocked_by_payload
        .entry(vessel.payload)
        .or_default()
        .insert(upgrade);
    world
        .chunks
        .get_mut(1, 1)
        .expect("home chunk")
        .add(GameObject::Vessel(Box::new(vessel)));
    world.chunks.register_object(id, 1, 1);
    if let Some(a) = world.dir.agencies.get_mut(&agency) {
        a.vessels.push(id);
    }
    id
}

/// Wrap a snapshot accessor for tests that only need one body.
pub fn snap(id: ObjectId) -> BodySnap {
    bodies_snapshot().get(id).expect("fixture body").clone()
}
