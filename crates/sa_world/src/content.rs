//! Content catalog loading.
//!
//! Definitions arrive as JSON lists with explicit ids so authored files stay
//! diffable; the catalog itself indexes by id.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use sa_core::{
    BuildingDef, BuildingTypeId, ComponentDef, ComponentTypeId, ContentCatalog, ResourceDef,
    ResourceId,
};

#[derive(Deserialize)]
struct ComponentsFile {
    content_version: String,
    components: Vec<ComponentEntry>,
}

#[derive(Deserialize)]
struct ComponentEntry {
    id: u16,
    #[serde(flatten)]
    def: ComponentDef,
}

#[derive(Deserialize)]
struct BuildingsFile {
    buildings: Vec<BuildingEntry>,
}

#[derive(Deserialize)]
struct BuildingEntry {
    id: u16,
    #[serde(flatten)]
    def: BuildingDef,
}

#[derive(Deserialize)]
struct ResourcesFile {
    resources: Vec<ResourceEntry>,
}

#[derive(Deserialize)]
struct ResourceEntry {
    id: u16,
    #[serde(flatten)]
    def: ResourceDef,
}

/// Load the read-only catalog from a content directory containing
/// `components.json`, `buildings.json`, and `resources.json`.
pub fn load_content(content_dir: &Path) -> Result<ContentCatalog> {
    let components: ComponentsFile = read_json(&content_dir.join("components.json"))?;
    let buildings: BuildingsFile = read_json(&content_dir.join("buildings.json"))?;
    let resources: ResourcesFile = read_json(&content_dir.join("resources.json"))?;

    let mut catalog = ContentCatalog {
        content_version: components.content_version,
        ..ContentCatalog::default()
    };
    for entry in components.components {
        catalog
            .components
            .insert(ComponentTypeId(entry.id), entry.def);
    }
    for entry in buildings.buildings {
        catalog.buildings.insert(BuildingTypeId(entry.id), entry.def);
    }
    for entry in resources.resources {
        catalog.resources.insert(ResourceId(entry.id), entry.def);
    }
    Ok(catalog)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
