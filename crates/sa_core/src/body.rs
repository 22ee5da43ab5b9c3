//! Celestial bodies.
//!
//! A body with a parent link holds an analytic circular orbit: each tick its
//! velocity and radial distance are snapped to the orbit solution and pairwise
//! gravity never moves it. The star and free bodies use semi-implicit Euler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ObjectId, ResourceId};
use crate::math::Vec2;
use crate::region::RegionId;
use crate::G;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Star,
    Planet,
    Asteroid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitLink {
    pub parent: ObjectId,
    /// 1 = counterclockwise, −1 = clockwise.
    pub direction: i8,
}

/// One band of a body's discrete region table: the region that applies while
/// a vessel's center distance is at most `max_range_km`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBand {
    pub max_range_km: f64,
    pub region: RegionId,
}

fn default_vacuum_tau() -> f64 {
    12.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub id: ObjectId,
    pub kind: BodyKind,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass_kg: f64,
    pub radius_km: f64,
    #[serde(default)]
    pub rotation_deg: f64,
    /// Axial spin, degrees per simulated second.
    #[serde(default)]
    pub spin_deg_per_s: f64,
    /// 0 = airless.
    #[serde(default)]
    pub atmosphere_km: f64,
    #[serde(default)]
    pub surface_temp_k: Option<f64>,
    /// Relative weights for rover/mining draws.
    #[serde(default)]
    pub resource_yield: BTreeMap<ResourceId, f64>,
    #[serde(default)]
    pub is_gas_giant: bool,
    #[serde(default)]
    pub is_moon: bool,
    /// Sun + named planets attract asteroids; everything else does not.
    #[serde(default)]
    pub major: bool,
    #[serde(default)]
    pub orbit: Option<OrbitLink>,
    /// Time constant of the vacuum descent damper, seconds.
    #[serde(default = "default_vacuum_tau")]
    pub vacuum_descent_tau_s: f64,
    /// Sorted ascending by range; first matching band wins.
    #[serde(default)]
    pub regions: Vec<RegionBand>,
}

impl Body {
    /// True for anything vessels can home to, land on, or sight (planets and
    /// moons — not the star, not asteroids).
    pub fn is_planet(&self) -> bool {
        self.kind == BodyKind::Planet
    }

    /// Surface gravity in km/s².
    pub fn surface_g_km_s2(&self) -> f64 {
        if self.radius_km <= 0.0 {
            return 0.0;
        }
        G * self.mass_kg / (self.radius_km * self.radius_km)
    }

    /// Classify a center distance against the region table.
    pub fn region_for_range(&self, range_km: f64) -> Option<RegionId> {
        self.regions
            .iter()
            .find(|band| range_km <= band.max_range_km)
            .map(|band| band.region)
    }

    /// Snap velocity and radial distance to the circular-orbit solution
    /// around `parent`. Position keeps its current bearing.
    pub fn correct_orbit(&mut self, parent_pos: Vec2, parent_vel: Vec2, parent_mass: f64) {
        let Some(link) = self.orbit else { return };
        let offset = self.position - parent_pos;
        let r = offset.length();
        if r <= 0.0 {
            return;
        }
        let tangent = Vec2::new(-offset.y, offset.x)
            .scaled(f64::from(link.direction))
            .normalized_or_x();
        let v = (G * parent_mass / r).sqrt();
        self.velocity = parent_vel + tangent.scaled(v);
        self.position = parent_pos + offset.scaled(1.0);
    }

    /// Semi-implicit Euler step plus axial spin.
    pub fn integrate(&mut self, dt: f64, acc: Vec2) {
        self.velocity += acc.scaled(dt);
        self.position += self.velocity.scaled(dt);
        self.advance_spin(dt);
    }

    pub fn advance_spin(&mut self, dt: f64) {
        if self.spin_deg_per_s != 0.0 {
            self.rotation_deg = (self.rotation_deg + self.spin_deg_per_s * dt) % 360.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun() -> Body {
        Body {
            id: ObjectId(1),
            kind: BodyKind::Star,
            name: "Sun".into(),
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            mass_kg: 1.989e30,
            radius_km: 695_700.0,
            rotation_deg: 0.0,
            spin_deg_per_s: 0.0,
            atmosphere_km: 0.0,
            surface_temp_k: None,
            resource_yield: BTreeMap::new(),
            is_gas_giant: false,
            is_moon: false,
            major: true,
            orbit: None,
            vacuum_descent_tau_s: 12.0,
            regions: Vec::new(),
        }
    }

    fn earth() -> Body {
        Body {
            id: ObjectId(2),
            kind: BodyKind::Planet,
            name: "Earth".into(),
            position: Vec2::new(152_000_000.0, 0.0),
            velocity: Vec2::new(0.0, -29.78),
            mass_kg: 5.972e24,
            radius_km: 6371.0,
            rotation_deg: 0.0,
            spin_deg_per_s: 360.0 / 86_400.0,
            atmosphere_km: 100.0,
            surface_temp_k: Some(288.15),
            resource_yield: BTreeMap::new(),
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

    #[test]
    fn orbit_correction_produces_circular_speed() {
        let sun = sun();
        let mut planet = earth();
        planet.correct_orbit(sun.position, sun.velocity, sun.mass_kg);
        let r = planet.position.distance(sun.position);
        let expected = (G * sun.mass_kg / r).sqrt();
        assert!(
            (planet.velocity.length() - expected).abs() < 1e-9,
            "speed {} vs expected {expected}",
            planet.velocity.length()
        );
    }

    #[test]
    fn region_table_picks_first_matching_band() {
        let mut planet = earth();
        planet.regions = vec![
            RegionBand {
                max_range_km: 10_000.0,
                region: RegionId(1),
            },
            RegionBand {
                max_range_km: 100_000.0,
                region: RegionId(2),
            },
        ];
        assert_eq!(planet.region_for_range(5_000.0), Some(RegionId(1)));
        assert_eq!(planet.region_for_range(50_000.0), Some(RegionId(2)));
        assert_eq!(planet.region_for_range(1e9), None);
    }

    #[test]
    fn spin_wraps_rotation() {
        let mut planet = earth();
        planet.spin_deg_per_s = 1.0;
        planet.integrate(720.0, Vec2::ZERO);
        assert!(planet.rotation_deg >= 0.0 && planet.rotation_deg < 360.0);
    }

    #[test]
    fn surface_gravity_close_to_earth_value() {
        // 9.81 m/s² == 0.00981 km/s²
        let g = earth().surface_g_km_s2();
        assert!((g - 0.00981).abs() < 0.0005, "g = {g}");
    }
}
