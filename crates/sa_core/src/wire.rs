//! Wire codecs for both channels.
//!
//! Everything on the wire is little-endian. The ordered channel frames as
//! `[opcode: u16][payload…]`; datagrams as `[opcode: u8][payload…]`. Layouts
//! are fixed here and nowhere else — chunk, vessel, and daemon code build
//! frames exclusively through these helpers.

use crate::ids::{AgencyId, ObjectId, PlayerId, UpgradeId};
use crate::region::RegionId;

/// Datagram channel opcodes (first byte of every UDP payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Datagram {
    ObjectStream = 0x01,
    VesselStream = 0x02,
    Notification = 0x03,
    TelescopeSight = 0x04,
    MagnetometerField = 0x05,
    RegionCue = 0x06,
    CargoState = 0x07,
    UpgradeTree = 0x08,
    VesselDestroyed = 0x09,
}

/// Ordered channel opcodes (first two bytes of every TCP frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Ordered {
    Hello = 0x0000,
    PlayerJoined = 0x0001,
    Chat = 0x0002,
    PlayerLeft = 0x0003,
    Keepalive = 0x0004,
    GameDescription = 0x0005,
    AgencyList = 0x0006,
    CreateAgency = 0x0007,
    ConstructBuilding = 0x0008,
    ConstructVessel = 0x0009,
    VesselControl = 0x000A,
    SellResource = 0x000B,
    UpgradeBuilding = 0x000C,
    UnlockUpgrade = 0x000D,
    AstronautMove = 0x000E,
    AgencyGamestate = 0x000F,
    ForceResolve = 0x0010,
}

impl Ordered {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x0000 => Self::Hello,
            0x0001 => Self::PlayerJoined,
            0x0002 => Self::Chat,
            0x0003 => Self::PlayerLeft,
            0x0004 => Self::Keepalive,
            0x0005 => Self::GameDescription,
            0x0006 => Self::AgencyList,
            0x0007 => Self::CreateAgency,
            0x0008 => Self::ConstructBuilding,
            0x0009 => Self::ConstructVessel,
            0x000A => Self::VesselControl,
            0x000B => Self::SellResource,
            0x000C => Self::UpgradeBuilding,
            0x000D => Self::UnlockUpgrade,
            0x000E => Self::AstronautMove,
            0x000F => Self::AgencyGamestate,
            0x0010 => Self::ForceResolve,
            _ => return None,
        })
    }
}

/// Notification severities shared by the datagram notification frame.
pub const NOTIFY_FAILURE: u8 = 1;
pub const NOTIFY_SUCCESS: u8 = 2;

// ---------------------------------------------------------------------------
// Writer / reader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datagram(op: Datagram) -> Self {
        let mut w = Self::new();
        w.u8(op as u8);
        w
    }

    pub fn ordered(op: Ordered) -> Self {
        let mut w = Self::new();
        w.u16(op as u16);
        w
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Signed km coordinate reinterpreted as u64 (two's complement).
    pub fn coord_km(&mut self, v: f64) {
        self.u64(v.trunc() as i64 as u64);
    }

    /// NUL-terminated UTF-8 string.
    pub fn cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortFrame;

impl std::fmt::Display for ShortFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("frame ended before the expected field")
    }
}

impl std::error::Error for ShortFrame {}

#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ShortFrame> {
        if self.pos + n > self.buf.len() {
            return Err(ShortFrame);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ShortFrame> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ShortFrame> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32, ShortFrame> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> Result<u64, ShortFrame> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn f32(&mut self) -> Result<f32, ShortFrame> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn coord_km(&mut self) -> Result<f64, ShortFrame> {
        Ok(self.u64()? as i64 as f64)
    }

    /// Read up to the NUL terminator (consumed, not returned).
    pub fn cstr(&mut self) -> Result<String, ShortFrame> {
        let rest = &self.buf[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(ShortFrame)?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

// ---------------------------------------------------------------------------
// Datagram builders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ObjectStreamItem {
    pub id: ObjectId,
    pub x_km: f64,
    pub y_km: f64,
    pub vx: f32,
    pub vy: f32,
    pub rotation: f32,
}

/// `opcode | seq:u16 | count:u16 | (id:8, x:8, y:8, vx:4, vy:4, rot:4) × count`
pub fn object_stream(seq: u16, items: &[ObjectStreamItem]) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::ObjectStream);
    w.u16(seq);
    w.u16(items.len() as u16);
    for item in items {
        w.u64(item.id.0);
        w.coord_km(item.x_km);
        w.coord_km(item.y_km);
        w.f32(item.vx);
        w.f32(item.vy);
        w.f32(item.rotation);
    }
    w.finish()
}

/// `opcode | kind:u8 | message (NUL-terminated)`
pub fn notification(kind: u8, message: &str) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::Notification);
    w.u8(kind);
    w.cstr(message);
    w.finish()
}

/// `opcode | vessel:u64 | region:u32`
pub fn region_cue(vessel: ObjectId, region: RegionId) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::RegionCue);
    w.u64(vessel.0);
    w.u32(u32::from(region.0));
    w.finish()
}

/// `opcode | vessel:u64 | fov:f32 | count:u16 | (id:u64) × count`
pub fn telescope_sight(vessel: ObjectId, fov_deg: f32, ids: &[ObjectId]) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::TelescopeSight);
    w.u64(vessel.0);
    w.f32(fov_deg);
    w.u16(ids.len() as u16);
    for id in ids {
        w.u64(id.0);
    }
    w.finish()
}

#[derive(Debug, Clone, Copy)]
pub struct MagnetometerSample {
    pub body: ObjectId,
    pub direction_deg: f32,
    pub strength: f32,
    pub flags: u8,
}

/// `opcode | vessel:u64 | net_dir:f32 | net_strength:f32 | n:u8 | (body:u64, dir:f32, strength:f32, flags:u8) × n`
pub fn magnetometer_field(
    vessel: ObjectId,
    net_dir_deg: f32,
    net_strength: f32,
    samples: &[MagnetometerSample],
) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::MagnetometerField);
    w.u64(vessel.0);
    w.f32(net_dir_deg);
    w.f32(net_strength);
    w.u8(samples.len().min(255) as u8);
    for s in samples.iter().take(255) {
        w.u64(s.body.0);
        w.f32(s.direction_deg);
        w.f32(s.strength);
        w.u8(s.flags);
    }
    w.finish()
}

/// `opcode | vessel:u64 | planet:u64 | n:u16 | (resource:u16, count:u32) × n`
pub fn cargo_state(
    vessel: ObjectId,
    planet: ObjectId,
    cargo: impl IntoIterator<Item = (crate::ids::ResourceId, u32)>,
) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::CargoState);
    w.u64(vessel.0);
    w.u64(planet.0);
    let entries: Vec<_> = cargo.into_iter().collect();
    w.u16(entries.len() as u16);
    for (resource, count) in entries {
        w.u16(resource.0);
        w.u32(count);
    }
    w.finish()
}

/// `opcode | vessel:u64 | unlocked_n:u16 | (id:u16) × n | purchasable_n:u16 | (id:u16, cost:u64) × n`
pub fn upgrade_tree(
    vessel: ObjectId,
    unlocked: &[UpgradeId],
    purchasable: &[(UpgradeId, u64)],
) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::UpgradeTree);
    w.u64(vessel.0);
    w.u16(unlocked.len() as u16);
    for id in unlocked {
        w.u16(id.0);
    }
    w.u16(purchasable.len() as u16);
    for (id, cost) in purchasable {
        w.u16(id.0);
        w.u64(*cost);
    }
    w.finish()
}

/// `opcode | vessel:u64`
pub fn vessel_destroyed(vessel: ObjectId) -> Vec<u8> {
    let mut w = ByteWriter::datagram(Datagram::VesselDestroyed);
    w.u64(vessel.0);
    w.finish()
}

// ---------------------------------------------------------------------------
// Ordered-channel builders
// ---------------------------------------------------------------------------

/// `opcode | player:u64`
pub fn player_joined(player: PlayerId) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::PlayerJoined);
    w.u64(player.0);
    w.finish()
}

/// `opcode | player:u64`
pub fn player_left(player: PlayerId) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::PlayerLeft);
    w.u64(player.0);
    w.finish()
}

/// `opcode | kind:u8 | sender:u64 | message (NUL-terminated)`
pub fn chat_relay(kind: u8, sender: PlayerId, message: &str) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::Chat);
    w.u8(kind);
    w.u64(sender.0);
    w.cstr(message);
    w.finish()
}

/// `opcode | result:u8` — 0 = created, 1 = name taken.
pub fn create_agency_result(name_taken: bool) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::CreateAgency);
    w.u8(u8::from(name_taken));
    w.finish()
}

/// `opcode | vessel:u64 | controlled_by:u64`
pub fn control_transfer(vessel: ObjectId, controlled_by: PlayerId) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::VesselControl);
    w.u64(vessel.0);
    w.u64(controlled_by.0);
    w.finish()
}

/// `opcode | vessel:u64 | x:u64(km) | y:u64(km) | rotation:f32 | stage:u16`
pub fn force_resolve(vessel: ObjectId, x_km: f64, y_km: f64, rotation: f32, stage: u16) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::ForceResolve);
    w.u64(vessel.0);
    w.coord_km(x_km);
    w.coord_km(y_km);
    w.f32(rotation);
    w.u16(stage);
    w.finish()
}

/// `opcode | json (NUL-terminated)` — game description handshake payload.
pub fn game_description(json: &str) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::GameDescription);
    w.cstr(json);
    w.finish()
}

/// `opcode | agency:u64 | json (NUL-terminated)` — agency gamestate snapshot.
pub fn agency_gamestate(agency: AgencyId, json: &str) -> Vec<u8> {
    let mut w = ByteWriter::ordered(Ordered::AgencyGamestate);
    w.u64(agency.0);
    w.cstr(json);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_stream_layout_is_34_bytes_per_item() {
        let items = [ObjectStreamItem {
            id: ObjectId(42),
            x_km: -1500.0,
            y_km: 2500.9,
            vx: 1.5,
            vy: -2.5,
            rotation: 90.0,
        }];
        let bytes = object_stream(7, &items);
        assert_eq!(bytes.len(), 1 + 2 + 2 + 36);
        assert_eq!(bytes[0], Datagram::ObjectStream as u8);

        let mut r = ByteReader::new(&bytes[1..]);
        assert_eq!(r.u16().unwrap(), 7);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u64().unwrap(), 42);
        assert_eq!(r.coord_km().unwrap(), -1500.0);
        assert_eq!(r.coord_km().unwrap(), 2500.0); // truncated toward zero
        assert_eq!(r.f32().unwrap(), 1.5);
        assert_eq!(r.f32().unwrap(), -2.5);
        assert_eq!(r.f32().unwrap(), 90.0);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn negative_coordinates_round_trip_through_u64() {
        let mut w = ByteWriter::new();
        w.coord_km(-152_000_000.0);
        let buf = w.finish();
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.coord_km().unwrap(), -152_000_000.0);
    }

    #[test]
    fn cstr_round_trips_and_detects_missing_nul() {
        let mut w = ByteWriter::new();
        w.cstr("hello");
        w.u8(0xFF);
        let buf = w.finish();
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.cstr().unwrap(), "hello");
        assert_eq!(r.u8().unwrap(), 0xFF);

        let mut r2 = ByteReader::new(&[b'x', b'y']);
        assert!(r2.cstr().is_err());
    }

    #[test]
    fn short_frame_errors_instead_of_panicking() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert!(r.u16().is_ok());
        assert!(r.u16().is_err());
    }

    #[test]
    fn ordered_opcode_round_trip() {
        for op in [
            Ordered::Hello,
            Ordered::Chat,
            Ordered::VesselControl,
            Ordered::ForceResolve,
        ] {
            assert_eq!(Ordered::from_u16(op as u16), Some(op));
        }
        assert_eq!(Ordered::from_u16(0xBEEF), None);
    }

    #[test]
    fn upgrade_tree_frame_counts_match() {
        let bytes = upgrade_tree(
            ObjectId(9),
            &[UpgradeId(1), UpgradeId(2)],
            &[(UpgradeId(3), 20_000)],
        );
        let mut r = ByteReader::new(&bytes[1..]);
        assert_eq!(r.u64().unwrap(), 9);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 2);
        assert_eq!(r.u16().unwrap(), 1);
        assert_eq!(r.u16().unwrap(), 3);
        assert_eq!(r.u64().unwrap(), 20_000);
    }
}
