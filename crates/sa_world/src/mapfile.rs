//! `.sa2map` files: textual JSON lists of navigation points.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sa_core::MapPoint;

use crate::persist::atomic_write;

#[derive(Serialize, Deserialize)]
struct PointsFile {
    points: Vec<MapPoint>,
}

pub fn load_points(path: &Path) -> Result<Vec<MapPoint>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: PointsFile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(file.points)
}

pub fn save_points(path: &Path, points: &[MapPoint]) -> Result<()> {
    let file = PointsFile {
        points: points.to_vec(),
    };
    let bytes = serde_json::to_vec(&file).context("encoding map points")?;
    atomic_write(path, &bytes)
}
