//! Shared daemon state: the world behind its lock and the session registry.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use sa_core::{PlayerId, World};
use sa_world::UniverseLayout;

pub type SessionId = u64;

/// One live ordered-channel connection. The UDP endpoint is pinned later,
/// when the client's first datagram arrives.
pub struct SessionHandle {
    pub id: SessionId,
    pub remote_ip: IpAddr,
    pub player: Option<PlayerId>,
    pub udp_addr: Option<SocketAddr>,
    pub last_seen: Instant,
    /// Ordered frames queued for this session's writer task.
    pub tcp_tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[derive(Default)]
pub struct SessionRegistry {
    next_id: SessionId,
    pub sessions: HashMap<SessionId, SessionHandle>,
    pub by_player: HashMap<PlayerId, SessionId>,
    pub by_udp: HashMap<SocketAddr, SessionId>,
}

impl SessionRegistry {
    pub fn open(
        &mut self,
        remote_ip: IpAddr,
        tcp_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(
            id,
            SessionHandle {
                id,
                remote_ip,
                player: None,
                udp_addr: None,
                last_seen: Instant::now(),
                tcp_tx,
            },
        );
        id
    }

    /// Bind an identity to a session once the hello frame arrives. A stale
    /// binding for the same player (reconnect) is replaced.
    pub fn bind_player(&mut self, session: SessionId, player: PlayerId) {
        if let Some(old) = self.by_player.insert(player, session) {
            if old != session {
                if let Some(handle) = self.sessions.get_mut(&old) {
                    handle.player = None;
                }
            }
        }
        if let Some(handle) = self.sessions.get_mut(&session) {
            handle.player = Some(player);
        }
    }

    /// Pin the client's source UDP endpoint to its session.
    pub fn pin_udp(&mut self, player: PlayerId, addr: SocketAddr) {
        let Some(&session) = self.by_player.get(&player) else {
            return;
        };
        if let Some(handle) = self.sessions.get_mut(&session) {
            if let Some(previous) = handle.udp_addr.replace(addr) {
                self.by_udp.remove(&previous);
            }
            self.by_udp.insert(addr, session);
        }
    }

    pub fn touch(&mut self, session: SessionId) {
        if let Some(handle) = self.sessions.get_mut(&session) {
            handle.last_seen = Instant::now();
        }
    }

    /// Drop a session, releasing every mapping. Returns the bound player, if
    /// any, so the caller can clear world-side state.
    pub fn close(&mut self, session: SessionId) -> Option<PlayerId> {
        let handle = self.sessions.remove(&session)?;
        if let Some(addr) = handle.udp_addr {
            self.by_udp.remove(&addr);
        }
        if let Some(player) = handle.player {
            if self.by_player.get(&player) == Some(&session) {
                self.by_player.remove(&player);
            }
            return Some(player);
        }
        None
    }

    pub fn session_for_player(&self, player: PlayerId) -> Option<&SessionHandle> {
        self.by_player
            .get(&player)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct Shared {
    pub world: Mutex<World>,
    pub sessions: Mutex<SessionRegistry>,
    pub layout: UniverseLayout,
}

pub type SharedState = Arc<Shared>;

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_session() -> (SessionRegistry, SessionId) {
        let mut registry = SessionRegistry::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.open("127.0.0.1".parse().unwrap(), tx);
        (registry, id)
    }

    #[test]
    fn bind_and_close_release_all_mappings() {
        let (mut registry, id) = registry_with_session();
        registry.bind_player(id, PlayerId(7));
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        registry.pin_udp(PlayerId(7), addr);

        assert!(registry.session_for_player(PlayerId(7)).is_some());
        assert_eq!(registry.by_udp.get(&addr), Some(&id));

        let player = registry.close(id);
        assert_eq!(player, Some(PlayerId(7)));
        assert!(registry.session_for_player(PlayerId(7)).is_none());
        assert!(registry.by_udp.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn reconnect_steals_the_player_binding() {
        let (mut registry, first) = registry_with_session();
        let (tx, _rx) = mpsc::unbounded_channel();
        let second = registry.open("127.0.0.1".parse().unwrap(), tx);

        registry.bind_player(first, PlayerId(7));
        registry.bind_player(second, PlayerId(7));

        assert_eq!(registry.by_player.get(&PlayerId(7)), Some(&second));
        assert!(registry.sessions.get(&first).unwrap().player.is_none());
        // Closing the stale session must not clear the new binding.
        registry.close(first);
        assert_eq!(registry.by_player.get(&PlayerId(7)), Some(&second));
    }

    #[test]
    fn repinning_udp_drops_the_old_endpoint() {
        let (mut registry, id) = registry_with_session();
        registry.bind_player(id, PlayerId(7));
        let a: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:6666".parse().unwrap();
        registry.pin_udp(PlayerId(7), a);
        registry.pin_udp(PlayerId(7), b);
        assert!(!registry.by_udp.contains_key(&a));
        assert_eq!(registry.by_udp.get(&b), Some(&id));
    }
}
