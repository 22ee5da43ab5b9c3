//! Space-agency server daemon: the authoritative world behind a TCP control
//! channel and a UDP stream channel.

mod control;
mod state;
mod stream;
mod tick_loop;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;

use sa_core::ServerTuning;
use sa_world::UniverseLayout;

use state::{SessionRegistry, Shared};

#[derive(Parser)]
#[command(name = "sa_daemon", about = "Space Agency Server Daemon")]
struct Cli {
    /// Directory holding (or receiving) the universe files.
    #[arg(long, default_value = "./universe")]
    universe_dir: String,
    /// Directory with the content catalog JSON files.
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Ordered control channel port (TCP).
    #[arg(long, default_value_t = 9001)]
    control_port: u16,
    /// Datagram stream channel port (UDP).
    #[arg(long, default_value_t = 9002)]
    stream_port: u16,
    /// Physics ticks per wall second.
    #[arg(long, default_value_t = 60)]
    tick_rate: u32,
    /// Simulated seconds per wall second.
    #[arg(long, default_value_t = 1.0)]
    sim_rate: f64,
    /// Seconds between autosaves.
    #[arg(long, default_value_t = 60)]
    autosave_interval: u64,
    /// World generation / rng seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Stop after this many ticks (testing).
    #[arg(long)]
    max_ticks: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let catalog = sa_world::load_content(std::path::Path::new(&cli.content_dir))
        .context("loading content catalog")?;
    info!(
        version = catalog.content_version,
        components = catalog.components.len(),
        "content catalog loaded"
    );

    let tuning = ServerTuning {
        tick_rate: cli.tick_rate,
        sim_rate: cli.sim_rate,
        autosave_interval_s: cli.autosave_interval,
        ..ServerTuning::default()
    };

    let layout = UniverseLayout::new(&cli.universe_dir);
    let world = sa_world::load_or_create_world(&layout, catalog, tuning, cli.seed)
        .context("loading world")?;
    info!(
        chunks = world.chunks.len(),
        agencies = world.dir.agencies.len(),
        players = world.dir.players.len(),
        "world ready"
    );

    let shared = Arc::new(Shared {
        world: Mutex::new(world),
        sessions: Mutex::new(SessionRegistry::default()),
        layout,
    });

    let udp = Arc::new(
        UdpSocket::bind(("0.0.0.0", cli.stream_port))
            .await
            .context("binding stream socket")?,
    );
    let listener = TcpListener::bind(("0.0.0.0", cli.control_port))
        .await
        .context("binding control socket")?;
    info!(
        control = cli.control_port,
        stream = cli.stream_port,
        "listening"
    );

    tokio::spawn(stream::run_udp(shared.clone(), udp.clone()));
    tokio::spawn(tick_loop::run_autosave_loop(shared.clone()));
    tokio::spawn(tick_loop::run_keepalive_sweep(shared.clone(), udp.clone()));

    if cli.max_ticks.is_some() {
        // Bounded run: finish the tick loop, then exit.
        tokio::spawn(control::run_control(
            shared.clone(),
            listener,
            udp.clone(),
        ));
        tick_loop::run_tick_loop(shared, udp, cli.max_ticks).await;
    } else {
        tokio::spawn(tick_loop::run_tick_loop(shared.clone(), udp.clone(), None));
        control::run_control(shared, listener, udp).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_core::test_fixtures;
    use sa_core::wire::{self, ByteReader, Datagram};
    use sa_core::{Audience, Channel, ObjectId, OutFrame, PlayerId};
    use tokio::io::AsyncWriteExt;

    fn make_shared(dir: &std::path::Path) -> state::SharedState {
        let layout = UniverseLayout::new(dir.join("universe"));
        let world = sa_world::load_or_create_world(
            &layout,
            test_fixtures::catalog(),
            test_fixtures::tuning(),
            3,
        )
        .unwrap();
        Arc::new(Shared {
            world: Mutex::new(world),
            sessions: Mutex::new(SessionRegistry::default()),
            layout,
        })
    }

    async fn test_sockets() -> (Arc<UdpSocket>, TcpListener) {
        let udp = Arc::new(UdpSocket::bind(("127.0.0.1", 0)).await.unwrap());
        let tcp = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        (udp, tcp)
    }

    #[tokio::test]
    async fn hello_binds_player_and_answers_with_game_description() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = make_shared(tmp.path());
        let (udp, listener) = test_sockets().await;
        let addr = listener.local_addr().unwrap();
        tokio::spawn(control::run_control(shared.clone(), listener, udp));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut hello = wire::ByteWriter::ordered(wire::Ordered::Hello);
        hello.u64(4242);
        client.write_all(&hello.finish()).await.unwrap();

        // First reply frame must be the game description.
        use tokio::io::AsyncReadExt;
        let opcode = client.read_u16_le().await.unwrap();
        assert_eq!(opcode, wire::Ordered::GameDescription as u16);
        let mut json = Vec::new();
        loop {
            let b = client.read_u8().await.unwrap();
            if b == 0 {
                break;
            }
            json.push(b);
        }
        let parsed: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed["content_version"], "fixture-1");

        // World-side: player exists, connected, with starting cash.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let world = shared.world.lock();
        let player = world.dir.players.get(&PlayerId(4242)).unwrap();
        assert!(player.connected);
        assert_eq!(player.money, world.tuning.starting_cash);
    }

    #[tokio::test]
    async fn unknown_opcode_drops_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = make_shared(tmp.path());
        let (udp, listener) = test_sockets().await;
        let addr = listener.local_addr().unwrap();
        tokio::spawn(control::run_control(shared.clone(), listener, udp));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(&0xBEEF_u16.to_le_bytes()).await.unwrap();

        // The server closes the connection: the next read returns EOF.
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 1];
        let read = client.read(&mut buf).await.unwrap();
        assert_eq!(read, 0, "server must drop the session");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(shared.sessions.lock().is_empty());
    }

    #[tokio::test]
    async fn disconnect_releases_controlled_vessel() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = make_shared(tmp.path());
        let (udp, listener) = test_sockets().await;
        let addr = listener.local_addr().unwrap();
        tokio::spawn(control::run_control(shared.clone(), listener, udp));

        let vessel_id = {
            let mut world = shared.world.lock();
            test_fixtures::spawn_vessel(&mut world)
        };

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut hello = wire::ByteWriter::ordered(wire::Ordered::Hello);
        hello.u64(7);
        client.write_all(&hello.finish()).await.unwrap();

        let mut take = wire::ByteWriter::ordered(wire::Ordered::VesselControl);
        take.u64(vessel_id.0);
        take.u8(0x08); // request control
        client.write_all(&take.finish()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        {
            let world = shared.world.lock();
            let vessel = world.chunks.find_vessel(vessel_id).unwrap();
            assert_eq!(vessel.controlled_by, PlayerId(7));
        }

        drop(client);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let world = shared.world.lock();
        let vessel = world.chunks.find_vessel(vessel_id).unwrap();
        assert_eq!(vessel.controlled_by, PlayerId(0));
        assert!(!world.dir.players[&PlayerId(7)].connected);
    }

    #[tokio::test]
    async fn udp_datagram_pins_the_endpoint_and_receives_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = make_shared(tmp.path());
        let (udp, listener) = test_sockets().await;
        let tcp_addr = listener.local_addr().unwrap();
        let udp_addr = udp.local_addr().unwrap();
        tokio::spawn(control::run_control(shared.clone(), listener, udp.clone()));
        tokio::spawn(stream::run_udp(shared.clone(), udp.clone()));

        let mut client = tokio::net::TcpStream::connect(tcp_addr).await.unwrap();
        let mut hello = wire::ByteWriter::ordered(wire::Ordered::Hello);
        hello.u64(9);
        client.write_all(&hello.finish()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Announce the client's stream endpoint.
        let client_udp = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        client_udp
            .send_to(&9_u64.to_le_bytes(), udp_addr)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(shared
            .sessions
            .lock()
            .session_for_player(PlayerId(9))
            .unwrap()
            .udp_addr
            .is_some());

        // Deliver an object-stream frame to the player's chunk audience.
        let frame = OutFrame {
            audience: Audience::Player(PlayerId(9)),
            channel: Channel::Datagram,
            bytes: wire::object_stream(
                1,
                &[wire::ObjectStreamItem {
                    id: ObjectId(2),
                    x_km: 1.0,
                    y_km: 2.0,
                    vx: 0.0,
                    vy: 0.0,
                    rotation: 0.0,
                }],
            ),
        };
        stream::deliver(&shared, &udp, vec![frame]);

        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            client_udp.recv_from(&mut buf),
        )
        .await
        .expect("datagram must arrive")
        .unwrap();
        assert_eq!(buf[0], Datagram::ObjectStream as u8);
        let mut r = ByteReader::new(&buf[1..len]);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 1);
    }
}
