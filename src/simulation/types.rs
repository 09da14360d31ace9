//! Core types for the VANET simulation
//!
//! Identifiers, fixed-point coordinates and simulation time. Nothing here
//! depends on the scheduler or the registry.

use std::fmt;
use std::str::FromStr;

/// Feet in one mile, used when converting comm ranges to road distances
pub const FEET_PER_MILE: f64 = 5280.0;

/// Fixed-point scale for latitude/longitude (microdegrees)
pub const MICRODEGREES: f64 = 1_000_000.0;

/// Mean earth radius in miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

slotmap::new_key_type! {
    /// Versioned handle to a model owned by the registry
    pub struct ModelHandle;
}

/// A road segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u32);

impl RecordId {
    /// Reserved sentinel; no real record can hold this value
    pub const INVALID: RecordId = RecordId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "R{}", self.0)
        } else {
            write!(f, "R-")
        }
    }
}

/// An intersection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// A 32-bit network address identifying a car or infrastructure node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u32);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Error returned when a dotted-quad or integer address cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(pub String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable address '{}'", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts `a.b.c.d` or a plain unsigned integer
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.contains('.') {
            return trimmed
                .parse::<u32>()
                .map(Address)
                .map_err(|_| AddressParseError(s.to_string()));
        }

        let octets: Vec<&str> = trimmed.split('.').collect();
        if octets.len() != 4 {
            return Err(AddressParseError(s.to_string()));
        }

        let mut bytes = [0u8; 4];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            *slot = octet
                .parse::<u8>()
                .map_err(|_| AddressParseError(s.to_string()))?;
        }
        Ok(Address(u32::from_be_bytes(bytes)))
    }
}

/// Simulation time in microseconds since the start of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_secs(secs: f64) -> Self {
        if secs <= 0.0 || !secs.is_finite() {
            return SimTime::ZERO;
        }
        SimTime((secs * 1_000_000.0).round() as u64)
    }

    pub fn as_secs(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// The instant `secs` seconds after this one (negative offsets clamp at zero)
    pub fn after(self, secs: f64) -> SimTime {
        SimTime::from_secs(self.as_secs() + secs)
    }

    /// Seconds elapsed since `earlier`, zero if `earlier` is later
    pub fn secs_since(self, earlier: SimTime) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / 1_000_000.0
    }

    /// The instant `secs` seconds before this one, saturating at zero
    pub fn before(self, secs: f64) -> SimTime {
        SimTime::from_secs(self.as_secs() - secs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs())
    }
}

/// A fixed-point latitude/longitude in microdegrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coords {
    pub lat: i32,
    pub lon: i32,
}

impl Coords {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * MICRODEGREES).round() as i32,
            lon: (lon * MICRODEGREES).round() as i32,
        }
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / MICRODEGREES
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / MICRODEGREES
    }

    /// Local planar offset to `other` in miles as (east, north)
    fn offset_miles(&self, other: &Coords) -> (f64, f64) {
        let mean_lat = ((self.lat_degrees() + other.lat_degrees()) / 2.0).to_radians();
        let dlat = (other.lat_degrees() - self.lat_degrees()).to_radians();
        let dlon = (other.lon_degrees() - self.lon_degrees()).to_radians();
        (
            dlon * mean_lat.cos() * EARTH_RADIUS_MILES,
            dlat * EARTH_RADIUS_MILES,
        )
    }

    /// Equirectangular distance in miles
    pub fn distance_miles(&self, other: &Coords) -> f64 {
        let (east, north) = self.offset_miles(other);
        (east * east + north * north).sqrt()
    }

    pub fn distance_feet(&self, other: &Coords) -> f64 {
        self.distance_miles(other) * FEET_PER_MILE
    }

    pub fn lerp(&self, other: &Coords, t: f64) -> Coords {
        Coords {
            lat: self.lat + ((other.lat - self.lat) as f64 * t).round() as i32,
            lon: self.lon + ((other.lon - self.lon) as f64 * t).round() as i32,
        }
    }

    /// Compass heading (degrees clockwise from north) from this point to `other`
    pub fn heading_to(&self, other: &Coords) -> f64 {
        let (east, north) = self.offset_miles(other);
        if east == 0.0 && north == 0.0 {
            return 0.0;
        }
        let heading = east.atan2(north).to_degrees();
        if heading < 0.0 {
            heading + 360.0
        } else {
            heading
        }
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat_degrees(), self.lon_degrees())
    }
}

/// A point on the road graph
///
/// The geometric point is always `lerp(points[shape_point], points[shape_point + 1], progress)`;
/// `forwards` only says which way the vehicle is travelling along the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadLocation {
    pub record: RecordId,
    pub shape_point: usize,
    pub progress: f64,
    pub forwards: bool,
}

impl RoadLocation {
    pub fn new(record: RecordId, shape_point: usize, progress: f64, forwards: bool) -> Self {
        Self {
            record,
            shape_point,
            progress: progress.clamp(0.0, 1.0),
            forwards,
        }
    }

    /// Monotonic position along the record, usable as an ordering key
    pub fn ordinal(&self) -> f64 {
        self.shape_point as f64 + self.progress
    }

    pub fn reversed(&self) -> Self {
        Self {
            forwards: !self.forwards,
            ..*self
        }
    }
}

/// Kind of node registered under an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Car,
    Infrastructure,
}
