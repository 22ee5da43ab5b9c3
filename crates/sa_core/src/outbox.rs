//! Outbound frame queue.
//!
//! Tick code never touches a socket: it pushes addressed frames here and the
//! daemon drains the queue after releasing the world lock. Sends that fail at
//! the socket layer are dropped by the daemon without feeding back.

use crate::chunk::ChunkKey;
use crate::ids::{AgencyId, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Per-session TCP stream, strictly FIFO.
    Ordered,
    /// UDP, fire-and-forget.
    Datagram,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Player(PlayerId),
    /// Every live session of an agency member.
    Agency(AgencyId),
    /// Every session whose player currently views this galaxy/system.
    Chunk(ChunkKey),
    All,
}

#[derive(Debug, Clone)]
pub struct OutFrame {
    pub audience: Audience,
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<OutFrame>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, audience: Audience, channel: Channel, bytes: Vec<u8>) {
        self.frames.push(OutFrame {
            audience,
            channel,
            bytes,
        });
    }

    pub fn datagram(&mut self, audience: Audience, bytes: Vec<u8>) {
        self.push(audience, Channel::Datagram, bytes);
    }

    pub fn ordered(&mut self, audience: Audience, bytes: Vec<u8>) {
        self.push(audience, Channel::Ordered, bytes);
    }

    pub fn drain(&mut self) -> Vec<OutFrame> {
        std::mem::take(&mut self.frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames currently queued, oldest first. Test/introspection helper.
    pub fn frames(&self) -> &[OutFrame] {
        &self.frames
    }
}
