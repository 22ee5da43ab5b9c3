//! Datagram channel: the UDP socket, endpoint discovery, and outbound
//! fan-out for both channels.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use sa_core::{Audience, Channel, OutFrame, PlayerId};

use crate::state::SharedState;

/// Receive loop. The only inbound datagram traffic is endpoint discovery:
/// a client announces `[player_id: u64]` from the socket it wants streams on,
/// and that source address is pinned to its session.
pub async fn run_udp(shared: SharedState, socket: Arc<UdpSocket>) {
    let mut buf = [0u8; 2048];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!("udp recv failed: {err}");
                continue;
            }
        };
        if len < 8 {
            trace!("short datagram from {addr}, ignored");
            continue;
        }
        let Ok(raw) = <[u8; 8]>::try_from(&buf[..8]) else {
            continue;
        };
        let player = PlayerId(u64::from_le_bytes(raw));
        let mut sessions = shared.sessions.lock();
        if sessions.session_for_player(player).is_some() {
            sessions.pin_udp(player, addr);
            debug!("pinned udp endpoint {addr} for player {player}");
        }
    }
}

/// Resolve an audience to concrete targets and send. Ordered frames go to
/// each session's writer queue; datagrams go straight out the socket.
/// Failures are logged and dropped — a dead session never stalls the tick.
pub fn deliver(shared: &SharedState, socket: &UdpSocket, frames: Vec<OutFrame>) {
    if frames.is_empty() {
        return;
    }

    // Resolve audiences under short locks, send after.
    let mut sends: Vec<(Channel, Option<SocketAddr>, Option<tokio::sync::mpsc::UnboundedSender<Vec<u8>>>, Vec<u8>)> =
        Vec::new();
    {
        let world = shared.world.lock();
        let sessions = shared.sessions.lock();

        let mut push_for_player = |player: PlayerId, channel: Channel, bytes: &Vec<u8>| {
            let Some(handle) = sessions.session_for_player(player) else {
                return;
            };
            match channel {
                Channel::Ordered => {
                    sends.push((channel, None, Some(handle.tcp_tx.clone()), bytes.clone()));
                }
                Channel::Datagram => {
                    if let Some(addr) = handle.udp_addr {
                        sends.push((channel, Some(addr), None, bytes.clone()));
                    }
                }
            }
        };

        for frame in &frames {
            match &frame.audience {
                Audience::Player(player) => {
                    push_for_player(*player, frame.channel, &frame.bytes);
                }
                Audience::Agency(agency) => {
                    if let Some(agency) = world.dir.agencies.get(agency) {
                        for member in &agency.members {
                            push_for_player(*member, frame.channel, &frame.bytes);
                        }
                    }
                }
                Audience::Chunk(key) => {
                    for player in world.dir.players.values() {
                        if player.connected
                            && player.galaxy == key.galaxy
                            && player.system == key.system
                        {
                            push_for_player(player.id, frame.channel, &frame.bytes);
                        }
                    }
                }
                Audience::All => {
                    for player in world.dir.players.values() {
                        if player.connected {
                            push_for_player(player.id, frame.channel, &frame.bytes);
                        }
                    }
                }
            }
        }
    }

    for (channel, addr, tx, bytes) in sends {
        match channel {
            Channel::Ordered => {
                if let Some(tx) = tx {
                    // A closed channel means the session is tearing down.
                    let _ = tx.send(bytes);
                }
            }
            Channel::Datagram => {
                if let Some(addr) = addr {
                    if let Err(err) = socket.try_send_to(&bytes, addr) {
                        trace!("datagram to {addr} dropped: {err}");
                    }
                }
            }
        }
    }
}

/// Drain the world outbox (under the lock) and fan everything out.
pub fn flush_outbox(shared: &SharedState, socket: &UdpSocket) {
    let frames = {
        let mut world = shared.world.lock();
        world.outbox.drain()
    };
    deliver(shared, socket, frames);
}
