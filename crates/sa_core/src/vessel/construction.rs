//! Vessel construction from a client request.
//!
//! Validation is atomic: the request is costed in full (money plus every
//! component's resource cost against the base planet's inventory) before any
//! state changes. Failures leave money, inventory, agency, and chunk exactly
//! as they were.

use serde::Deserialize;

use crate::chunk_manager::ChunkManager;
use crate::content::{ContentCatalog, ServerTuning};
use crate::ids::{ComponentTypeId, ObjectId, PlayerId, ResourceId};
use crate::math::Vec2;
use crate::object::GameObject;
use crate::vessel::{assign_stages, detect_payload_index, AttachedComponent, StagingNode, Vessel};
use crate::world::Directory;

/// Author grid center; placements arrive offset by this.
const GRID_CENTER: f64 = 2500.0;

#[derive(Debug, Clone, Deserialize)]
pub struct VesselRequest {
    #[serde(default = "default_name")]
    pub name: String,
    /// Base body id the vessel launches from.
    #[serde(default = "default_planet")]
    pub planet: u64,
    #[serde(default)]
    pub launchpad_data: LaunchpadData,
    pub vessel_data: Vec<ComponentPlacement>,
    #[serde(default)]
    pub connections: Vec<(usize, usize)>,
}

fn default_name() -> String {
    "Unnamed Vessel".to_owned()
}

fn default_planet() -> u64 {
    2
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchpadData {
    #[serde(rename = "type", default)]
    pub building_type: u16,
    #[serde(default)]
    pub position_angle: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentPlacement {
    pub id: u16,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub paint_1: u32,
    #[serde(default)]
    pub paint_2: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructError {
    UnknownComponent(ComponentTypeId),
    InsufficientFunds { cost: i64, have: i64 },
    NoAgency,
    NoBaseInventory(ObjectId),
    InsufficientResources(Vec<(ResourceId, u32, u32)>),
    ChunkNotLoaded,
    UnknownBody(ObjectId),
}

impl std::fmt::Display for ConstructError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownComponent(id) => write!(f, "invalid component id {id}"),
            Self::InsufficientFunds { cost, have } => {
                write!(f, "insufficient funds: cost {cost}, have {have}")
            }
            Self::NoAgency => write!(f, "requester has no agency"),
            Self::NoBaseInventory(planet) => {
                write!(f, "no base inventory on planet {planet}")
            }
            Self::InsufficientResources(shortages) => {
                write!(f, "insufficient resources:")?;
                for (resource, need, have) in shortages {
                    write!(f, " {resource}: need {need}, have {have};")?;
                }
                Ok(())
            }
            Self::ChunkNotLoaded => write!(f, "launch chunk is not loaded"),
            Self::UnknownBody(id) => write!(f, "launch body {id} not found"),
        }
    }
}

impl std::error::Error for ConstructError {}

/// Validate, pay for, stage, place, and register a new vessel. Returns the
/// new vessel id on success.
pub fn construct_vessel(
    request: &VesselRequest,
    requester: PlayerId,
    catalog: &ContentCatalog,
    tuning: &ServerTuning,
    dir: &mut Directory,
    chunks: &mut ChunkManager,
    next_object_id: &mut u64,
) -> Result<ObjectId, ConstructError> {
    let _ = tuning;
    let planet = ObjectId(request.planet);

    // --- Cost the whole request before touching anything.
    let mut components = Vec::with_capacity(request.vessel_data.len());
    let mut total_cost = 0i64;
    let mut required: std::collections::BTreeMap<ResourceId, u32> = Default::default();

    for placement in &request.vessel_data {
        let kind = ComponentTypeId(placement.id);
        let def = catalog
            .component(kind)
            .ok_or(ConstructError::UnknownComponent(kind))?;
        total_cost += def.cost;
        for (resource, amount) in &def.resource_cost {
            *required.entry(*resource).or_insert(0) += amount;
        }
        components.push(AttachedComponent {
            kind,
            x: placement.x - GRID_CENTER,
            y: placement.y - GRID_CENTER,
            paint1: placement.paint_1,
            paint2: placement.paint_2,
            stage: 0,
        });
    }

    let (player_galaxy, player_system, player_money, agency_id) = {
        let player = dir.players.get(&requester).ok_or(ConstructError::NoAgency)?;
        (player.galaxy, player.system, player.money, player.agency)
    };
    if player_money < total_cost {
        return Err(ConstructError::InsufficientFunds {
            cost: total_cost,
            have: player_money,
        });
    }
    if !dir.agencies.contains_key(&agency_id) {
        return Err(ConstructError::NoAgency);
    }

    if !required.is_empty() {
        let agency = dir.agencies.get(&agency_id).ok_or(ConstructError::NoAgency)?;
        let inventory = agency
            .inventories
            .get(&planet)
            .ok_or(ConstructError::NoBaseInventory(planet))?;
        let shortages: Vec<(ResourceId, u32, u32)> = required
            .iter()
            .filter_map(|(resource, need)| {
                let have = inventory.get(resource).copied().unwrap_or(0);
                (have < *need).then_some((*resource, *need, have))
            })
            .collect();
        if !shortages.is_empty() {
            return Err(ConstructError::InsufficientResources(shortages));
        }
    }

    let chunk = chunks
        .get_mut(player_galaxy, player_system)
        .ok_or(ConstructError::ChunkNotLoaded)?;
    let home = chunk
        .get(planet)
        .and_then(GameObject::as_body)
        .ok_or(ConstructError::UnknownBody(planet))?;
    let home_position = home.position;
    let home_velocity = home.velocity;
    let home_rotation = home.rotation_deg;
    let home_radius = home.radius_km;

    // --- Validation passed: deduct resources, then money.
    if !required.is_empty() {
        let agency = dir
            .agencies
            .get_mut(&agency_id)
            .ok_or(ConstructError::NoAgency)?;
        let inventory = agency
            .inventories
            .get_mut(&planet)
            .ok_or(ConstructError::NoBaseInventory(planet))?;
        for (resource, need) in &required {
            let have = inventory.get(resource).copied().unwrap_or(0);
            let left = have - need;
            if left == 0 {
                inventory.remove(resource);
            } else {
                inventory.insert(*resource, left);
            }
        }
    }
    if let Some(player) = dir.players.get_mut(&requester) {
        player.money -= total_cost;
    }

    // --- Stage assignment with masked stage-add collisions.
    let nodes: Vec<StagingNode> = components
        .iter()
        .map(|c| StagingNode { kind: c.kind })
        .collect();
    let payload_index = detect_payload_index(&nodes, catalog);
    let stages = assign_stages(&nodes, &request.connections, catalog, payload_index);
    for (component, stage) in components.iter_mut().zip(&stages) {
        component.stage = *stage;
    }
    let top_stage = stages.iter().max().copied().unwrap_or(0);

    let id = ObjectId(*next_object_id);
    *next_object_id += 1;

    let mut vessel = Vessel::new_empty(id, request.name.clone(), agency_id, requester);
    vessel.components = components;
    vessel.stage = top_stage;
    vessel.num_stages = top_stage + 1;
    vessel.payload = payload_index
        .map(|i| vessel.components[i].kind)
        .unwrap_or_default();
    vessel.launch_body = Some(planet);
    vessel.home_body = Some(planet);
    vessel.rebuild_stats(catalog);
    vessel.ensure_behavior();

    // --- Place on the launchpad, landed, matching the body's motion.
    vessel.landed = true;
    vessel.altitude_km = 0.0;
    vessel.z_velocity = 0.0;
    vessel.landed_angle_offset = request.launchpad_data.position_angle;
    let world_deg = -(home_rotation + vessel.landed_angle_offset);
    let ang = world_deg.to_radians();
    vessel.position = home_position + Vec2::new(ang.cos(), ang.sin()).scaled(home_radius);
    vessel.rotation_deg = -world_deg;
    vessel.rotation_vel_deg_s = 0.0;
    vessel.velocity = home_velocity;

    chunk.add(GameObject::Vessel(Box::new(vessel)));
    chunks.register_object(id, player_galaxy, player_system);
    if let Some(agency) = dir.agencies.get_mut(&agency_id) {
        agency.vessels.push(id);
    }

    Ok(id)
}
