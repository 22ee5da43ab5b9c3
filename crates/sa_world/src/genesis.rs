//! World genesis: the "big bang" that creates a fresh universe on disk.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rand::Rng;

use sa_core::region::known;
use sa_core::{
    Body, BodyKind, Chunk, GameObject, MapPoint, ObjectId, OrbitLink, RegionBand, RegionId,
    ResourceId, Vec2,
};

use crate::persist::{atomic_write, save_chunk};
use crate::{save_points, UniverseLayout};

const ASTEROID_COUNT: usize = 150;

fn planet(
    id: u64,
    name: &str,
    orbit_radius_km: f64,
    orbit_speed_km_s: f64,
    mass_kg: f64,
    radius_km: f64,
) -> Body {
    Body {
        id: ObjectId(id),
        kind: BodyKind::Planet,
        name: name.to_owned(),
        position: Vec2::new(orbit_radius_km, 0.0),
        velocity: Vec2::new(0.0, -orbit_speed_km_s),
        mass_kg,
        radius_km,
        rotation_deg: 0.0,
        spin_deg_per_s: 0.0,
        atmosphere_km: 0.0,
        surface_temp_k: None,
        resource_yield: Default::default(),
        is_gas_giant: false,
        is_moon: false,
        major: true,
        orbit: Some(OrbitLink {
            parent: ObjectId(1),
            direction: 1,
        }),
        vacuum_descent_tau_s: 12.0,
        regions: Vec::new(),
    }
}

fn bands(radius_km: f64, close: RegionId, near: RegionId, distant: RegionId) -> Vec<RegionBand> {
    vec![
        RegionBand {
            max_range_km: radius_km * 10.0,
            region: close,
        },
        RegionBand {
            max_range_km: radius_km * 50.0,
            region: near,
        },
        RegionBand {
            max_range_km: radius_km * 400.0,
            region: distant,
        },
    ]
}

/// The home system roster: the star, the eight planets, and the moon. Ids are
/// stable across worlds; everything else is content.
pub fn home_system_bodies() -> Vec<Body> {
    let mut sun = Body {
        id: ObjectId(1),
        kind: BodyKind::Star,
        name: "Sun".to_owned(),
        position: Vec2::ZERO,
        velocity: Vec2::ZERO,
        mass_kg: 1.989e30,
        radius_km: 695_700.0,
        rotation_deg: 0.0,
        spin_deg_per_s: 0.0,
        atmosphere_km: 0.0,
        surface_temp_k: Some(5_772.0),
        resource_yield: Default::default(),
        is_gas_giant: false,
        is_moon: false,
        major: true,
        orbit: None,
        vacuum_descent_tau_s: 12.0,
        regions: Vec::new(),
    };
    sun.spin_deg_per_s = 360.0 / (25.0 * 86_400.0);

    let mut earth = planet(2, "Earth", 152_000_000.0, 29.78, 5.972e24, 6_371.0);
    earth.spin_deg_per_s = 360.0 / 86_400.0;
    earth.atmosphere_km = 100.0;
    earth.surface_temp_k = Some(288.15);
    earth.regions = bands(
        6_371.0,
        known::EARTH_CLOSE,
        known::EARTH_NEAR,
        known::EARTH_DISTANT,
    );

    let mut moon = Body {
        id: ObjectId(3),
        kind: BodyKind::Planet,
        name: "Luna".to_owned(),
        position: earth.position + Vec2::new(384_400.0, 0.0),
        velocity: earth.velocity + Vec2::new(0.0, -1.022),
        mass_kg: 7.342e22,
        radius_km: 1_737.0,
        rotation_deg: 0.0,
        spin_deg_per_s: 0.0,
        atmosphere_km: 0.0,
        surface_temp_k: Some(250.0),
        resource_yield: [(ResourceId(15), 1.0)].into_iter().collect(),
        is_gas_giant: false,
        is_moon: true,
        major: false,
        orbit: None,
        vacuum_descent_tau_s: 12.0,
        regions: vec![RegionBand {
            max_range_km: 1_737.0 * 10.0,
            region: known::MOON_NEAR,
        }],
    };
    moon.vacuum_descent_tau_s = 8.0;

    let mut mercury = planet(4, "Mercury", 57_900_000.0, 47.36, 3.301e23, 2_439.7);
    mercury.surface_temp_k = Some(440.0);
    mercury.resource_yield = [(ResourceId(1), 2.0), (ResourceId(5), 1.0)]
        .into_iter()
        .collect();
    mercury.regions = bands(
        2_439.7,
        known::MERCURY_CLOSE,
        known::MERCURY_NEAR,
        known::MERCURY_DISTANT,
    );

    let mut venus = planet(5, "Venus", 108_200_000.0, 35.02, 4.867e24, 6_051.8);
    venus.atmosphere_km = 250.0;
    venus.surface_temp_k = Some(737.0);
    venus.regions = bands(
        6_051.8,
        known::VENUS_CLOSE,
        known::VENUS_NEAR,
        known::VENUS_DISTANT,
    );

    let mut mars = planet(6, "Mars", 227_900_000.0, 24.07, 6.417e23, 3_389.5);
    mars.atmosphere_km = 50.0;
    mars.surface_temp_k = Some(210.0);
    mars.spin_deg_per_s = 360.0 / 88_642.0;
    mars.resource_yield = [(ResourceId(1), 3.0), (ResourceId(7), 1.0)]
        .into_iter()
        .collect();
    mars.regions = bands(
        3_389.5,
        known::MARS_CLOSE,
        known::MARS_NEAR,
        known::MARS_DISTANT,
    );

    let mut jupiter = planet(7, "Jupiter", 778_500_000.0, 13.07, 1.898e27, 69_911.0);
    jupiter.is_gas_giant = true;
    jupiter.atmosphere_km = 5_000.0;
    jupiter.regions = bands(
        69_911.0,
        known::JUPITER_CLOSE,
        known::JUPITER_NEAR,
        known::JUPITER_DISTANT,
    );

    let mut saturn = planet(8, "Saturn", 1_433_700_000.0, 9.68, 5.683e26, 58_232.0);
    saturn.is_gas_giant = true;
    saturn.atmosphere_km = 4_000.0;
    saturn.regions = bands(
        58_232.0,
        known::SATURN_CLOSE,
        known::SATURN_NEAR,
        known::SATURN_DISTANT,
    );

    let mut uranus = planet(9, "Uranus", 2_872_500_000.0, 6.80, 8.681e25, 25_362.0);
    uranus.is_gas_giant = true;
    uranus.atmosphere_km = 3_000.0;
    uranus.regions = bands(
        25_362.0,
        known::URANUS_CLOSE,
        known::URANUS_NEAR,
        known::URANUS_DISTANT,
    );

    let mut neptune = planet(10, "Neptune", 4_495_100_000.0, 5.43, 1.024e26, 24_622.0);
    neptune.is_gas_giant = true;
    neptune.atmosphere_km = 3_000.0;
    neptune.regions = bands(
        24_622.0,
        known::NEPTUNE_CLOSE,
        known::NEPTUNE_NEAR,
        known::NEPTUNE_DISTANT,
    );

    vec![
        sun, earth, moon, mercury, venus, mars, jupiter, saturn, uranus, neptune,
    ]
}

/// Scatter the asteroid belt between Mars and Jupiter on near-circular
/// orbits. Ids continue after the named bodies.
fn belt_asteroids(first_id: u64, rng: &mut impl Rng) -> Vec<Body> {
    let sun_mass = 1.989e30;
    (0..ASTEROID_COUNT)
        .map(|i| {
            let r = rng.gen_range(3.2e8..4.8e8);
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let speed = (sa_core::G * sun_mass / r).sqrt();
            let position = Vec2::new(r * angle.cos(), r * angle.sin());
            let tangent = Vec2::new(-angle.sin(), angle.cos());
            Body {
                id: ObjectId(first_id + i as u64),
                kind: BodyKind::Asteroid,
                name: format!("Asteroid {i}"),
                position,
                velocity: tangent.scaled(speed),
                mass_kg: rng.gen_range(1.0e10..1.0e13),
                radius_km: rng.gen_range(1.0..30.0),
                rotation_deg: rng.gen_range(0.0..360.0),
                spin_deg_per_s: 0.0,
                atmosphere_km: 0.0,
                surface_temp_k: None,
                resource_yield: Default::default(),
                is_gas_giant: false,
                is_moon: false,
                major: false,
                orbit: None,
                vacuum_descent_tau_s: 12.0,
                regions: Vec::new(),
            }
        })
        .collect()
}

/// Create a fresh universe on disk: directories, the marker file, the home
/// system chunk, and both map-point files.
pub fn big_bang(layout: &UniverseLayout, rng: &mut impl Rng) -> Result<()> {
    let systems_dir = layout.root().join("galaxies").join("1").join("systems");
    std::fs::create_dir_all(&systems_dir)
        .with_context(|| format!("creating {}", systems_dir.display()))?;

    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    atomic_write(
        &layout.big_bang_marker(),
        format!("This universe was created on {stamp}\n").as_bytes(),
    )?;

    let mut chunk = Chunk::new(1, 1);
    let bodies = home_system_bodies();
    let next_id = bodies.iter().map(|b| b.id.0).max().unwrap_or(0) + 1;
    for body in bodies {
        chunk.add(GameObject::Body(body));
    }
    for asteroid in belt_asteroids(next_id, rng) {
        chunk.add(GameObject::Body(asteroid));
    }
    save_chunk(layout, &chunk)?;

    save_points(
        &layout.chunk_path(1, 0),
        &[MapPoint {
            id: 1,
            name: "Home System".to_owned(),
            x: 0.0,
            y: 0.0,
        }],
    )?;
    save_points(
        &layout.chunk_path(0, 0),
        &[MapPoint {
            id: 1,
            name: "Milky Way".to_owned(),
            x: 0.0,
            y: 0.0,
        }],
    )?;

    Ok(())
}
