//! Atomic persistence: versioned binary chunk snapshots and textual meta.
//!
//! Every write goes to a temp file, is fsynced, then renamed over the target,
//! so a crash mid-save never corrupts the previous snapshot.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use sa_core::{
    Agency, Chunk, ContentCatalog, Directory, GameObject, Player, PlayerId, ServerTuning, World,
};

use crate::{genesis, load_points, UniverseLayout};

const CHUNK_MAGIC: [u8; 4] = *b"SA2C";
const CHUNK_FORMAT_VERSION: u16 = 1;
const META_VERSION: u32 = 1;

/// Write-to-temp, fsync, rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_owned(),
    });
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} over {}", tmp.display(), path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Chunk snapshots
// ---------------------------------------------------------------------------

/// Serialize a chunk's object list behind a magic + version header.
pub fn save_chunk(layout: &UniverseLayout, chunk: &Chunk) -> Result<()> {
    let objects: Vec<&GameObject> = chunk.objects().collect();
    let body = bincode::serialize(&objects).context("encoding chunk objects")?;
    let mut bytes = Vec::with_capacity(body.len() + 6);
    bytes.extend_from_slice(&CHUNK_MAGIC);
    bytes.extend_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    atomic_write(&layout.chunk_path(chunk.galaxy, chunk.system), &bytes)
}

/// Load one system chunk. Returns `Ok(None)` when no snapshot exists yet.
///
/// Rebuild happens in two passes: bodies and debris first, then vessels, so
/// every vessel can resolve its home body by id inside the chunk. Transient
/// vessel state (behavior instance, controller binding, sight list) is
/// reinitialized.
pub fn load_chunk(
    layout: &UniverseLayout,
    galaxy: u32,
    system: u32,
    catalog: &ContentCatalog,
) -> Result<Option<Chunk>> {
    let path = layout.chunk_path(galaxy, system);
    if !path.exists() {
        return Ok(None);
    }
    let bytes =
        std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() < 6 || bytes[..4] != CHUNK_MAGIC {
        bail!("{} is not a chunk snapshot", path.display());
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != CHUNK_FORMAT_VERSION {
        bail!(
            "{}: unsupported chunk format {version} (expected {CHUNK_FORMAT_VERSION})",
            path.display()
        );
    }
    let objects: Vec<GameObject> =
        bincode::deserialize(&bytes[6..]).with_context(|| format!("decoding {}", path.display()))?;

    let mut chunk = Chunk::new(galaxy, system);
    let mut vessels = Vec::new();
    for object in objects {
        match object {
            GameObject::Vessel(vessel) => vessels.push(vessel),
            other => chunk.add(other),
        }
    }
    for mut vessel in vessels {
        // No sessions exist at load time; controller backrefs are rebuilt as
        // players reconnect and re-request control.
        vessel.controlled_by = PlayerId(0);
        vessel.control.clear();
        if vessel
            .home_body
            .is_some_and(|id| chunk.get(id).is_none())
        {
            vessel.home_body = None;
        }
        vessel.rebuild_stats(catalog);
        vessel.ensure_behavior();
        chunk.add(GameObject::Vessel(vessel));
    }
    Ok(Some(chunk))
}

// ---------------------------------------------------------------------------
// Meta (agencies + players)
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct AgenciesFile {
    version: u32,
    saved_at: String,
    agencies: Vec<Agency>,
}

#[derive(Serialize, Deserialize)]
struct PlayersFile {
    version: u32,
    saved_at: String,
    players: Vec<Player>,
}

/// Save agencies then players as compact JSON, both atomically.
pub fn save_meta(layout: &UniverseLayout, dir: &Directory) -> Result<()> {
    let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let agencies = AgenciesFile {
        version: META_VERSION,
        saved_at: saved_at.clone(),
        agencies: dir.agencies.values().cloned().collect(),
    };
    atomic_write(
        &layout.agencies_path(),
        &serde_json::to_vec(&agencies).context("encoding agencies")?,
    )?;

    let players = PlayersFile {
        version: META_VERSION,
        saved_at,
        players: dir.players.values().cloned().collect(),
    };
    atomic_write(
        &layout.players_path(),
        &serde_json::to_vec(&players).context("encoding players")?,
    )?;
    Ok(())
}

/// Load agencies and players into the directory. Missing files are fine: a
/// fresh world simply has neither.
pub fn load_meta(layout: &UniverseLayout, dir: &mut Directory) -> Result<()> {
    let agencies_path = layout.agencies_path();
    if agencies_path.exists() {
        let text = std::fs::read_to_string(&agencies_path)
            .with_context(|| format!("reading {}", agencies_path.display()))?;
        let file: AgenciesFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", agencies_path.display()))?;
        for agency in file.agencies {
            dir.agencies.insert(agency.id, agency);
        }
    }

    let players_path = layout.players_path();
    if players_path.exists() {
        let text = std::fs::read_to_string(&players_path)
            .with_context(|| format!("reading {}", players_path.display()))?;
        let file: PlayersFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", players_path.display()))?;
        for player in file.players {
            dir.players.insert(player.id, player);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Whole-world save / load
// ---------------------------------------------------------------------------

/// Autosave pass: every loaded system chunk, both map-point layers, and meta.
/// Vessels travelling on a map layer live only in memory, matching the map
/// files' point-list format.
pub fn save_world(world: &World, layout: &UniverseLayout) -> Result<()> {
    for chunk in world.chunks.chunks() {
        if !chunk.is_map_chunk() {
            save_chunk(layout, chunk)?;
        }
    }
    for (galaxy, points) in world.chunks.starmap_galaxies() {
        crate::save_points(&layout.chunk_path(*galaxy, 0), points)?;
    }
    crate::save_points(&layout.chunk_path(0, 0), world.chunks.universe_points())?;
    save_meta(layout, &world.dir)
}

/// Boot a world from disk, performing the big bang first on a fresh
/// directory. Loads the home chunk, every charted map layer, and meta, then
/// restores the id watermark.
pub fn load_or_create_world(
    layout: &UniverseLayout,
    catalog: ContentCatalog,
    tuning: ServerTuning,
    seed: u64,
) -> Result<World> {
    use rand::SeedableRng;
    if !layout.is_initialized() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        genesis::big_bang(layout, &mut rng)?;
    }

    let mut world = World::new(catalog, tuning, seed);

    let home = load_chunk(layout, 1, 1, &world.catalog)?
        .context("home chunk missing after big bang")?;
    world.chunks.insert_chunk(home);

    // Map layers: the universe file plus every charted galaxy.
    world
        .chunks
        .set_universe_points(load_points(&layout.chunk_path(0, 0))?);
    let galaxies_dir = layout.root().join("galaxies");
    if galaxies_dir.exists() {
        for entry in std::fs::read_dir(&galaxies_dir)
            .with_context(|| format!("listing {}", galaxies_dir.display()))?
        {
            let entry = entry?;
            let Ok(galaxy) = entry.file_name().to_string_lossy().parse::<u32>() else {
                continue;
            };
            let points = load_points(&layout.chunk_path(galaxy, 0))?;
            if !points.is_empty() {
                world.chunks.set_starmap_points(galaxy, points);
            }
        }
    }

    load_meta(layout, &mut world.dir)?;
    world.restore_id_watermark();
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_core::test_fixtures;
    use sa_core::{AgencyId, ObjectId, Vec2};

    fn layout() -> (tempfile::TempDir, UniverseLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = UniverseLayout::new(dir.path().join("universe"));
        (dir, layout)
    }

    #[test]
    fn chunk_snapshot_round_trips_with_two_pass_vessel_relink() {
        let (_guard, layout) = layout();
        let catalog = test_fixtures::catalog();

        let mut chunk = Chunk::new(1, 1);
        for body in test_fixtures::home_system_bodies() {
            chunk.add(GameObject::Body(body));
        }
        let mut vessel = test_fixtures::orbiting_vessel(&catalog);
        vessel.controlled_by = test_fixtures::PLAYER;
        vessel.control.forward = true;
        let vessel_id = vessel.id;
        let fuel = vessel.fuel_by_stage.clone();
        chunk.add(GameObject::Vessel(Box::new(vessel)));

        save_chunk(&layout, &chunk).unwrap();
        let loaded = load_chunk(&layout, 1, 1, &catalog).unwrap().unwrap();

        assert_eq!(loaded.len(), chunk.len());
        let vessel = loaded
            .get(vessel_id)
            .and_then(GameObject::as_vessel)
            .unwrap();
        assert_eq!(vessel.home_body, Some(test_fixtures::EARTH));
        assert_eq!(vessel.fuel_by_stage, fuel);
        // Session-bound state never survives a load.
        assert_eq!(vessel.controlled_by, PlayerId(0));
        assert!(!vessel.control.forward);
        assert!(vessel.behavior.is_some(), "behavior is rebuilt on load");
    }

    #[test]
    fn loading_a_missing_chunk_is_none() {
        let (_guard, layout) = layout();
        let catalog = test_fixtures::catalog();
        assert!(load_chunk(&layout, 1, 9, &catalog).unwrap().is_none());
    }

    #[test]
    fn corrupt_chunk_header_is_an_error() {
        let (_guard, layout) = layout();
        let catalog = test_fixtures::catalog();
        let path = layout.chunk_path(1, 1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"NOPE......").unwrap();
        assert!(load_chunk(&layout, 1, 1, &catalog).is_err());
    }

    #[test]
    fn meta_round_trip_is_byte_identical_modulo_saved_at() {
        let (_guard, layout) = layout();
        let mut dir = Directory::default();
        let mut player = Player::new(PlayerId(77), 12_345);
        player.agency = AgencyId(1);
        dir.players.insert(PlayerId(77), player);
        let mut agency = Agency::new(AgencyId(1), "Round Trip".to_owned(), false);
        agency.add_member(PlayerId(77));
        agency
            .inventories
            .insert(ObjectId(2), [(sa_core::ResourceId(1), 42)].into_iter().collect());
        dir.agencies.insert(AgencyId(1), agency);

        save_meta(&layout, &dir).unwrap();
        let first_agencies = std::fs::read_to_string(layout.agencies_path()).unwrap();
        let first_players = std::fs::read_to_string(layout.players_path()).unwrap();

        let mut reloaded = Directory::default();
        load_meta(&layout, &mut reloaded).unwrap();
        save_meta(&layout, &reloaded).unwrap();
        let second_agencies = std::fs::read_to_string(layout.agencies_path()).unwrap();
        let second_players = std::fs::read_to_string(layout.players_path()).unwrap();

        let strip = |s: &str| {
            let mut v: serde_json::Value = serde_json::from_str(s).unwrap();
            v.as_object_mut().unwrap().remove("saved_at");
            serde_json::to_string(&v).unwrap()
        };
        assert_eq!(strip(&first_agencies), strip(&second_agencies));
        assert_eq!(strip(&first_players), strip(&second_players));
    }

    #[test]
    fn atomic_write_replaces_previous_content() {
        let (_guard, layout) = layout();
        let path = layout.root().join("file.txt");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        // No temp file left behind.
        assert!(!path.with_extension("txt.tmp").exists());
    }

    #[test]
    fn fresh_directory_boots_through_big_bang() {
        let (_guard, layout) = layout();
        let world = load_or_create_world(
            &layout,
            test_fixtures::catalog(),
            test_fixtures::tuning(),
            7,
        )
        .unwrap();
        assert!(layout.is_initialized());
        let chunk = world.chunks.get(1, 1).unwrap();
        assert!(chunk.len() > 100, "planets plus the belt");
        assert!(chunk.get(ObjectId(2)).is_some(), "Earth is planet two");
        // Watermark cleared the genesis id range.
        assert!(world.next_object_id > 10);
    }

    #[test]
    fn world_survives_a_save_load_cycle() {
        let (_guard, layout) = layout();
        let mut world = load_or_create_world(
            &layout,
            test_fixtures::catalog(),
            test_fixtures::tuning(),
            7,
        )
        .unwrap();

        // Mutate: chart a system point and park a vessel.
        world.chunks.add_system_point_if_missing(1, 4);
        let vessel_id = test_fixtures::spawn_vessel(&mut world);
        {
            let vessel = world.chunks.find_vessel_mut(vessel_id).unwrap();
            vessel.position = Vec2::new(1.0e7, -2.0e7);
        }

        save_world(&world, &layout).unwrap();
        let reloaded = load_or_create_world(
            &layout,
            test_fixtures::catalog(),
            test_fixtures::tuning(),
            7,
        )
        .unwrap();

        let vessel = reloaded.chunks.find_vessel(vessel_id).unwrap();
        assert_eq!(vessel.position, Vec2::new(1.0e7, -2.0e7));
        let points: Vec<u32> = reloaded
            .chunks
            .starmap_galaxies()
            .flat_map(|(_, pts)| pts.iter().map(|p| p.id))
            .collect();
        assert!(points.contains(&4));
        assert!(reloaded.next_object_id > vessel_id.0);
    }
}
