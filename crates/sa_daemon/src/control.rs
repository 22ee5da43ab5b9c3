//! Ordered control channel: the TCP accept loop and per-session frame
//! handling.
//!
//! Frames are `[opcode: u16 LE][payload…]`; each opcode knows its own payload
//! shape and reads it field by field. A malformed or unknown frame drops the
//! session.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{info, warn};

use sa_core::wire::{self, Ordered};
use sa_core::{
    AstronautId, Audience, BuildingTypeId, ControlAux, ObjectId, PlayerId, ResourceId, UpgradeId,
    VesselControl, VesselRequest,
};

use crate::state::{SessionId, SharedState};
use crate::stream::flush_outbox;

pub async fn run_control(shared: SharedState, listener: TcpListener, udp: Arc<UdpSocket>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };
        info!("connection from {addr}");
        let shared = shared.clone();
        let udp = udp.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(shared, stream, udp).await {
                info!("session from {addr} ended: {err:#}");
            }
        });
    }
}

async fn handle_connection(
    shared: SharedState,
    stream: TcpStream,
    udp: Arc<UdpSocket>,
) -> Result<()> {
    let remote_ip = stream.peer_addr().context("peer address")?.ip();
    let (mut reader, mut writer) = stream.into_split();

    let (tcp_tx, mut tcp_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let session = shared.sessions.lock().open(remote_ip, tcp_tx);

    // Writer task: drains the session's ordered queue.
    let write_task = tokio::spawn(async move {
        while let Some(frame) = tcp_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let result = read_loop(&shared, &mut reader, session, &udp).await;

    // Teardown: registry mappings, controller backrefs, presence broadcast.
    let player = shared.sessions.lock().close(session);
    if let Some(player) = player {
        shared.world.lock().disconnect(player);
        flush_outbox(&shared, &udp);
    }
    write_task.abort();
    result
}

async fn read_loop(
    shared: &SharedState,
    reader: &mut (impl AsyncReadExt + Unpin),
    session: SessionId,
    udp: &UdpSocket,
) -> Result<()> {
    loop {
        let opcode = match reader.read_u16_le().await {
            Ok(opcode) => opcode,
            Err(_) => return Ok(()), // peer closed
        };
        let Some(opcode) = Ordered::from_u16(opcode) else {
            bail!("unknown opcode 0x{opcode:04X}");
        };
        shared.sessions.lock().touch(session);
        handle_frame(shared, reader, session, opcode).await?;
        flush_outbox(shared, udp);
    }
}

async fn read_cstr(reader: &mut (impl AsyncReadExt + Unpin)) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = reader.read_u8().await.context("reading string")?;
        if b == 0 {
            break;
        }
        if bytes.len() >= 64 * 1024 {
            bail!("string field too long");
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn session_player(shared: &SharedState, session: SessionId) -> Result<PlayerId> {
    shared
        .sessions
        .lock()
        .sessions
        .get(&session)
        .and_then(|handle| handle.player)
        .context("frame before hello")
}

fn send_to_session(shared: &SharedState, session: SessionId, frame: Vec<u8>) {
    if let Some(handle) = shared.sessions.lock().sessions.get(&session) {
        let _ = handle.tcp_tx.send(frame);
    }
}

async fn handle_frame(
    shared: &SharedState,
    reader: &mut (impl AsyncReadExt + Unpin),
    session: SessionId,
    opcode: Ordered,
) -> Result<()> {
    match opcode {
        // Identity handshake: trust the asserted id, bind the session, and
        // answer with the content catalog.
        Ordered::Hello => {
            let player = PlayerId(reader.read_u64_le().await.context("hello id")?);
            info!("player {player} identified on session {session}");
            shared.sessions.lock().bind_player(session, player);
            let description = {
                let mut world = shared.world.lock();
                world.connect(player);
                serde_json::json!({
                    "content_version": world.catalog.content_version,
                    "components": world.catalog.components,
                    "buildings": world.catalog.buildings,
                    "resources": world.catalog.resources,
                })
                .to_string()
            };
            send_to_session(shared, session, wire::game_description(&description));
        }

        // Chat: relay to everyone with the sender stamped in.
        Ordered::Chat => {
            let kind = reader.read_u8().await.context("chat kind")?;
            let message = read_cstr(reader).await?;
            let player = session_player(shared, session)?;
            shared
                .world
                .lock()
                .outbox
                .ordered(Audience::All, wire::chat_relay(kind, player, &message));
        }

        Ordered::Keepalive => {
            shared.sessions.lock().touch(session);
        }

        Ordered::AgencyList => {
            let listing = {
                let world = shared.world.lock();
                let entries: Vec<serde_json::Value> = world
                    .dir
                    .agencies
                    .values()
                    .map(|agency| {
                        serde_json::json!({
                            "id": agency.id,
                            "name": agency.name,
                            "public": agency.is_public,
                            "members": agency.members,
                        })
                    })
                    .collect();
                serde_json::json!({ "agencies": entries }).to_string()
            };
            let mut frame = wire::ByteWriter::ordered(Ordered::AgencyList);
            frame.cstr(&listing);
            send_to_session(shared, session, frame.finish());
        }

        Ordered::CreateAgency => {
            let is_public = reader.read_u8().await.context("agency flag")? != 0;
            let name = read_cstr(reader).await?;
            let player = session_player(shared, session)?;
            let taken = {
                let mut world = shared.world.lock();
                world.create_agency(name.clone(), is_public, player).is_err()
            };
            if taken {
                info!("agency name '{name}' rejected for {player}");
            }
            send_to_session(shared, session, wire::create_agency_result(taken));
        }

        Ordered::ConstructBuilding => {
            let planet = ObjectId(reader.read_u64_le().await.context("planet id")?);
            let kind = BuildingTypeId(reader.read_u16_le().await.context("building type")?);
            let angle = reader.read_u16_le().await.context("angle")?;
            let player = session_player(shared, session)?;
            let mut world = shared.world.lock();
            if let Err(reason) =
                world.construct_building(player, planet, kind, f64::from(angle))
            {
                world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(
                        wire::NOTIFY_FAILURE,
                        &format!("Construction failed: {reason}"),
                    ),
                );
            }
        }

        Ordered::ConstructVessel => {
            let raw = read_cstr(reader).await?;
            let player = session_player(shared, session)?;
            match serde_json::from_str::<VesselRequest>(&raw) {
                Ok(request) => {
                    let mut world = shared.world.lock();
                    match world.construct_vessel(player, &request) {
                        Ok(id) => info!("vessel {id} constructed for {player}"),
                        Err(err) => info!("vessel construction rejected: {err}"),
                    }
                }
                Err(err) => {
                    warn!("bad vessel request json: {err}");
                    let mut world = shared.world.lock();
                    world.outbox.datagram(
                        Audience::Player(player),
                        wire::notification(
                            wire::NOTIFY_FAILURE,
                            "Construction failed: malformed request",
                        ),
                    );
                }
            }
        }

        Ordered::VesselControl => {
            let vessel = ObjectId(reader.read_u64_le().await.context("vessel id")?);
            let control = reader.read_u8().await.context("control byte")?;
            let Some(control) = VesselControl::from_u8(control) else {
                bail!("unknown vessel control 0x{control:02X}");
            };
            let aux = match control {
                VesselControl::SetTelescopeTargetAngle => {
                    let mut raw = [0u8; 4];
                    reader.read_exact(&mut raw).await.context("target angle")?;
                    ControlAux::Angle(f32::from_le_bytes(raw))
                }
                VesselControl::SetSystemState => {
                    let kind = reader.read_u16_le().await.context("system kind")?;
                    let active = reader.read_u8().await.context("system state")? != 0;
                    ControlAux::System { kind, active }
                }
                _ => ControlAux::None,
            };
            let player = session_player(shared, session)?;
            let result = shared
                .world
                .lock()
                .vessel_control(player, vessel, control, aux);
            if let Err(reason) = result {
                tracing::debug!("control rejected for {player} on {vessel}: {reason}");
            }
        }

        Ordered::SellResource => {
            let planet = ObjectId(reader.read_u64_le().await.context("planet id")?);
            let resource = ResourceId(reader.read_u16_le().await.context("resource id")?);
            let count = reader.read_u32_le().await.context("count")?;
            let player = session_player(shared, session)?;
            let mut world = shared.world.lock();
            match world.sell_resource(player, planet, resource, count) {
                Ok(value) => world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(wire::NOTIFY_SUCCESS, &format!("Sold for {value}.")),
                ),
                Err(reason) => world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(wire::NOTIFY_FAILURE, &format!("Sale failed: {reason}")),
                ),
            }
        }

        Ordered::UpgradeBuilding => {
            let planet = ObjectId(reader.read_u64_le().await.context("planet id")?);
            let kind = BuildingTypeId(reader.read_u16_le().await.context("building type")?);
            let to_level = u32::from(reader.read_u16_le().await.context("target level")?);
            let player = session_player(shared, session)?;
            let mut world = shared.world.lock();
            if let Err(reason) = world.upgrade_building(player, planet, kind, to_level) {
                world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(wire::NOTIFY_FAILURE, &format!("Upgrade failed: {reason}")),
                );
            }
        }

        Ordered::UnlockUpgrade => {
            let vessel = ObjectId(reader.read_u64_le().await.context("vessel id")?);
            let upgrade = UpgradeId(reader.read_u16_le().await.context("upgrade id")?);
            let player = session_player(shared, session)?;
            let mut world = shared.world.lock();
            if let Err(reason) = world.unlock_vessel_upgrade(player, vessel, upgrade) {
                world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(wire::NOTIFY_FAILURE, &format!("Unlock failed: {reason}")),
                );
            }
        }

        // `direction`: 0 boards the astronaut, 1 disembarks.
        Ordered::AstronautMove => {
            let vessel = ObjectId(reader.read_u64_le().await.context("vessel id")?);
            let astronaut = AstronautId(reader.read_u32_le().await.context("astronaut id")?);
            let direction = reader.read_u8().await.context("direction")?;
            let player = session_player(shared, session)?;
            let mut world = shared.world.lock();
            let result = if direction == 0 {
                world.board_astronaut(player, vessel, astronaut)
            } else {
                world.disembark_astronaut(player, vessel, astronaut)
            };
            if let Err(reason) = result {
                world.outbox.datagram(
                    Audience::Player(player),
                    wire::notification(wire::NOTIFY_FAILURE, &format!("Transfer failed: {reason}")),
                );
            }
        }

        Ordered::AgencyGamestate => {
            let player = session_player(shared, session)?;
            let frame = {
                let world = shared.world.lock();
                world
                    .dir
                    .players
                    .get(&player)
                    .and_then(|p| world.dir.agencies.get(&p.agency))
                    .map(|agency| {
                        let snapshot = agency.gamestate_snapshot(&world.dir.players);
                        let json = serde_json::to_string(&snapshot)
                            .unwrap_or_else(|_| "{}".to_owned());
                        wire::agency_gamestate(agency.id, &json)
                    })
            };
            if let Some(frame) = frame {
                send_to_session(shared, session, frame);
            }
        }

        // Server-to-client opcodes arriving inbound are protocol violations.
        Ordered::PlayerJoined
        | Ordered::PlayerLeft
        | Ordered::GameDescription
        | Ordered::ForceResolve => {
            bail!("client sent server-only opcode {opcode:?}");
        }
    }
    Ok(())
}
