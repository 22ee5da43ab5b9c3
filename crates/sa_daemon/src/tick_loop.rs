//! The physics tick worker, the autosave worker, and the keepalive sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::state::SharedState;
use crate::stream::{deliver, flush_outbox};

/// How often to log tick throughput.
const PERF_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Sessions silent for this long are dropped by the keepalive sweep.
const SESSION_TIMEOUT: Duration = Duration::from_secs(90);

/// Paced physics loop: every 1/tickrate wall seconds, advance the world by
/// `simrate / tickrate` simulated seconds under the lock, then fan the
/// outbound frames out after releasing it.
pub async fn run_tick_loop(shared: SharedState, udp: Arc<UdpSocket>, max_ticks: Option<u64>) {
    let (tick_rate, simsec_per_tick) = {
        let world = shared.world.lock();
        (world.tuning.tick_rate.max(1), world.tuning.simsec_per_tick())
    };
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate));

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut ticks: u64 = 0;
    let mut perf_window_start = Instant::now();
    let mut perf_window_ticks: u64 = 0;

    loop {
        interval.tick().await;

        let frames = {
            let mut world = shared.world.lock();
            world.tick(simsec_per_tick);
            world.outbox.drain()
        };
        deliver(&shared, &udp, frames);

        ticks += 1;
        perf_window_ticks += 1;
        let elapsed = perf_window_start.elapsed();
        if elapsed >= PERF_LOG_INTERVAL {
            let tps = perf_window_ticks as f64 / elapsed.as_secs_f64();
            info!(tps = format_args!("{tps:.0}"), "tick loop throughput");
            perf_window_start = Instant::now();
            perf_window_ticks = 0;
        }

        if max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
    }
}

/// Serialize every loaded chunk and the meta files on a fixed cadence. The
/// whole pass runs under the world lock so a snapshot is internally
/// consistent.
pub async fn run_autosave_loop(shared: SharedState) {
    let interval_s = shared.world.lock().tuning.autosave_interval_s.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_s));
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        interval.tick().await;
        let started = Instant::now();
        let result = {
            let world = shared.world.lock();
            sa_world::save_world(&world, &shared.layout)
        };
        match result {
            Ok(()) => info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "autosave complete"
            ),
            Err(err) => warn!("autosave failed: {err:#}"),
        }
    }
}

/// Periodically drop sessions that have gone silent past the keepalive
/// window, releasing their world-side bindings.
pub async fn run_keepalive_sweep(shared: SharedState, udp: Arc<UdpSocket>) {
    let mut interval = tokio::time::interval(Duration::from_secs(15));
    loop {
        interval.tick().await;
        let stale: Vec<_> = {
            let sessions = shared.sessions.lock();
            sessions
                .sessions
                .values()
                .filter(|handle| handle.last_seen.elapsed() > SESSION_TIMEOUT)
                .map(|handle| handle.id)
                .collect()
        };
        for session in stale {
            let player = shared.sessions.lock().close(session);
            if let Some(player) = player {
                info!("session for player {player} timed out");
                shared.world.lock().disconnect(player);
            }
        }
        flush_outbox(&shared, &udp);
    }
}
