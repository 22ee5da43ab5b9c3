//! World content, genesis, and persistence.
//!
//! Everything that touches the filesystem lives here: the content catalog,
//! the on-disk universe layout, atomic chunk/meta snapshots, and the big-bang
//! bootstrap that creates a fresh universe.

mod content;
mod genesis;
mod mapfile;
mod persist;

pub use content::load_content;
pub use genesis::{big_bang, home_system_bodies};
pub use mapfile::{load_points, save_points};
pub use persist::{
    atomic_write, load_chunk, load_meta, load_or_create_world, save_chunk, save_meta, save_world,
};

use std::path::{Path, PathBuf};

/// On-disk layout of one universe directory.
///
/// ```text
/// universe/bigBang.txt
/// universe/intergalacticMap.sa2map
/// universe/galaxies/<g>/interstellarMap.sa2map
/// universe/galaxies/<g>/systems/system_<s>.chunk
/// universe/agencies.sa2.json
/// universe/players.sa2.json
/// ```
#[derive(Debug, Clone)]
pub struct UniverseLayout {
    root: PathBuf,
}

impl UniverseLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Presence of the marker means the world has been initialized.
    pub fn big_bang_marker(&self) -> PathBuf {
        self.root.join("bigBang.txt")
    }

    pub fn is_initialized(&self) -> bool {
        self.big_bang_marker().exists()
    }

    pub fn chunk_path(&self, galaxy: u32, system: u32) -> PathBuf {
        if galaxy == 0 {
            self.root.join("intergalacticMap.sa2map")
        } else if system == 0 {
            self.root
                .join("galaxies")
                .join(galaxy.to_string())
                .join("interstellarMap.sa2map")
        } else {
            self.root
                .join("galaxies")
                .join(galaxy.to_string())
                .join("systems")
                .join(format!("system_{system}.chunk"))
        }
    }

    pub fn agencies_path(&self) -> PathBuf {
        self.root.join("agencies.sa2.json")
    }

    pub fn players_path(&self) -> PathBuf {
        self.root.join("players.sa2.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_the_convention() {
        let layout = UniverseLayout::new("/tmp/universe");
        assert!(layout
            .chunk_path(1, 5)
            .ends_with("galaxies/1/systems/system_5.chunk"));
        assert!(layout
            .chunk_path(3, 0)
            .ends_with("galaxies/3/interstellarMap.sa2map"));
        assert!(layout.chunk_path(0, 0).ends_with("intergalacticMap.sa2map"));
        assert!(layout.agencies_path().ends_with("agencies.sa2.json"));
    }
}
