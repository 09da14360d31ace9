//! Safety message envelope and its wire layout
//!
//! A packet is immutable once created except for the TX stamp, which each
//! hop refreshes before transmitting. The wire layout is fixed-size and
//! big-endian:
//!
//! ```text
//! version:u8 | source:u32 | counter:u32 | created_us:u64 | lifetime_us:u64
//! | origin stamp | tx stamp
//!
//! stamp = time_us:u64 | lat:i32 | lon:i32 | speed:f32 | heading:f32
//!       | record:u32 | county:u32 | forwards:u8 | shape_point:u32
//!       | progress:f32 | address:u32
//! ```

use std::fmt;

use super::types::{Address, Coords, RecordId, SimTime};

pub const WIRE_VERSION: u8 = 1;
const STAMP_LEN: usize = 45;
pub const PACKET_LEN: usize = 1 + 4 + 4 + 8 + 8 + 2 * STAMP_LEN;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unsupported packet version {0}")]
    BadVersion(u8),
}

/// Network-wide identity of a flooded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId {
    pub source: Address,
    pub counter: u32,
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.counter)
    }
}

/// Where and how a node was moving when it sent (or originated) a packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketStamp {
    pub time: SimTime,
    pub position: Coords,
    pub speed: f64,
    pub heading: f64,
    pub record: RecordId,
    pub county: u32,
    pub forwards: bool,
    pub shape_point: u32,
    pub progress: f64,
    pub address: Address,
}

impl PacketStamp {
    /// A stamp for a node that is not on any road record
    pub fn fixed(time: SimTime, position: Coords, address: Address) -> Self {
        Self {
            time,
            position,
            speed: 0.0,
            heading: 0.0,
            record: RecordId::INVALID,
            county: 0,
            forwards: true,
            shape_point: 0,
            progress: 0.0,
            address,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.time.0.to_be_bytes());
        out.extend_from_slice(&self.position.lat.to_be_bytes());
        out.extend_from_slice(&self.position.lon.to_be_bytes());
        out.extend_from_slice(&(self.speed as f32).to_be_bytes());
        out.extend_from_slice(&(self.heading as f32).to_be_bytes());
        out.extend_from_slice(&self.record.0.to_be_bytes());
        out.extend_from_slice(&self.county.to_be_bytes());
        out.push(u8::from(self.forwards));
        out.extend_from_slice(&self.shape_point.to_be_bytes());
        out.extend_from_slice(&(self.progress as f32).to_be_bytes());
        out.extend_from_slice(&self.address.0.to_be_bytes());
    }

    fn read(reader: &mut WireReader<'_>) -> Self {
        Self {
            time: SimTime(reader.u64()),
            position: Coords::new(reader.i32(), reader.i32()),
            speed: reader.f32() as f64,
            heading: reader.f32() as f64,
            record: RecordId(reader.u32()),
            county: reader.u32(),
            forwards: reader.u8() != 0,
            shape_point: reader.u32(),
            progress: reader.f32() as f64,
            address: Address(reader.u32()),
        }
    }
}

/// A flooded safety message
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyPacket {
    pub id: SequenceId,
    pub created: SimTime,
    /// Seconds after `created` during which the message is live
    pub lifetime: f64,
    pub origin: PacketStamp,
    pub tx: PacketStamp,
}

impl SafetyPacket {
    pub fn new(id: SequenceId, lifetime: f64, origin: PacketStamp) -> Self {
        Self {
            id,
            created: origin.time,
            lifetime,
            origin,
            tx: origin,
        }
    }

    pub fn expires_at(&self) -> SimTime {
        self.created.after(self.lifetime)
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        now >= self.expires_at()
    }

    /// Position of the event the message reports on
    pub fn reference_position(&self) -> Coords {
        self.origin.position
    }

    /// A copy carrying a refreshed TX stamp
    pub fn restamped(&self, tx: PacketStamp) -> Self {
        Self { tx, ..self.clone() }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_LEN);
        out.push(WIRE_VERSION);
        out.extend_from_slice(&self.id.source.0.to_be_bytes());
        out.extend_from_slice(&self.id.counter.to_be_bytes());
        out.extend_from_slice(&self.created.0.to_be_bytes());
        out.extend_from_slice(&SimTime::from_secs(self.lifetime).0.to_be_bytes());
        self.origin.write(&mut out);
        self.tx.write(&mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < PACKET_LEN {
            return Err(PacketError::Truncated {
                expected: PACKET_LEN,
                actual: bytes.len(),
            });
        }
        let mut reader = WireReader { bytes, offset: 0 };
        let version = reader.u8();
        if version != WIRE_VERSION {
            return Err(PacketError::BadVersion(version));
        }
        let id = SequenceId {
            source: Address(reader.u32()),
            counter: reader.u32(),
        };
        let created = SimTime(reader.u64());
        let lifetime = SimTime(reader.u64()).as_secs();
        let origin = PacketStamp::read(&mut reader);
        let tx = PacketStamp::read(&mut reader);
        Ok(Self {
            id,
            created,
            lifetime,
            origin,
            tx,
        })
    }
}

/// Cursor over a buffer whose length was checked up front
struct WireReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl WireReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        buf
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_be_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_be_bytes(self.take())
    }
}
