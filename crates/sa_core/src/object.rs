//! The tagged world-object variant owned by chunks.

use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::ids::{AgencyId, ComponentTypeId, ObjectId};
use crate::math::Vec2;
use crate::vessel::Vessel;

/// A short-lived physical object spawned when staging drops a component.
/// Subject to gravity like any other non-asteroid; removed when its lifetime
/// runs out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debris {
    pub id: ObjectId,
    pub component_type: ComponentTypeId,
    pub agency: AgencyId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass_kg: f64,
    pub radius_km: f64,
    pub rotation_deg: f64,
    /// Remaining lifetime in simulated seconds.
    pub lifetime_s: f64,
}

impl Debris {
    pub fn integrate(&mut self, dt: f64, acc: Vec2) {
        self.velocity += acc.scaled(dt);
        self.position += self.velocity.scaled(dt);
        self.lifetime_s -= dt;
    }

    pub fn expired(&self) -> bool {
        self.lifetime_s <= 0.0
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum GameObject {
    Body(Body),
    Vessel(Box<Vessel>),
    Debris(Debris),
}

impl GameObject {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Body(b) => b.id,
            Self::Vessel(v) => v.id,
            Self::Debris(d) => d.id,
        }
    }

    pub fn position(&self) -> Vec2 {
        match self {
            Self::Body(b) => b.position,
            Self::Vessel(v) => v.position,
            Self::Debris(d) => d.position,
        }
    }

    pub fn velocity(&self) -> Vec2 {
        match self {
            Self::Body(b) => b.velocity,
            Self::Vessel(v) => v.velocity,
            Self::Debris(d) => d.velocity,
        }
    }

    pub fn mass_kg(&self) -> f64 {
        match self {
            Self::Body(b) => b.mass_kg,
            Self::Vessel(v) => v.mass_kg,
            Self::Debris(d) => d.mass_kg,
        }
    }

    pub fn radius_km(&self) -> f64 {
        match self {
            Self::Body(b) => b.radius_km,
            Self::Vessel(v) => v.radius_km,
            Self::Debris(d) => d.radius_km,
        }
    }

    pub fn rotation_deg(&self) -> f64 {
        match self {
            Self::Body(b) => b.rotation_deg,
            Self::Vessel(v) => v.rotation_deg,
            Self::Debris(d) => d.rotation_deg,
        }
    }

    /// Participates in gravity and integration.
    pub fn is_physical(&self) -> bool {
        self.mass_kg() > 0.0
    }

    pub fn as_body(&self) -> Option<&Body> {
        match self {
            Self::Body(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_vessel(&self) -> Option<&Vessel> {
        match self {
            Self::Vessel(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vessel_mut(&mut self) -> Option<&mut Vessel> {
        match self {
            Self::Vessel(v) => Some(v),
            _ => None,
        }
    }
}
