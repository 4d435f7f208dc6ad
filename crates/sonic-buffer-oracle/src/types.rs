//! Buffer model type definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sonic_buffer_common::{BufferModelError, BufferModelResult};

/// Buffer pool name constant
pub const INGRESS_LOSSLESS_PG_POOL_NAME: &str = "ingress_lossless_pool";

/// Highest priority group index on a port
pub const MAX_PRIORITY_GROUP: u8 = 7;

/// Cable length in meters, written as `40m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CableLength(pub u32);

impl CableLength {
    pub fn meters(&self) -> u32 {
        self.0
    }
}

impl FromStr for CableLength {
    type Err = BufferModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_suffix('m').ok_or_else(|| {
            BufferModelError::invalid_config("cable_length", format!("'{}' has no 'm' suffix", s))
        })?;
        digits
            .parse::<u32>()
            .map(CableLength)
            .map_err(|_| BufferModelError::invalid_config("cable_length", format!("'{}' is not a length", s)))
    }
}

impl TryFrom<String> for CableLength {
    type Error = BufferModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CableLength> for String {
    fn from(c: CableLength) -> Self {
        c.to_string()
    }
}

impl fmt::Display for CableLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// A priority group index or inclusive range, written as `6` or `3-4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PgRange {
    start: u8,
    end: u8,
}

impl PgRange {
    pub fn new(start: u8, end: u8) -> BufferModelResult<Self> {
        if start > end || end > MAX_PRIORITY_GROUP {
            return Err(BufferModelError::invalid_config(
                "priority_group",
                format!("invalid range {}-{}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn single(pg: u8) -> BufferModelResult<Self> {
        Self::new(pg, pg)
    }

    /// Number of priority groups covered
    pub fn count(&self) -> u32 {
        u32::from(self.end - self.start) + 1
    }

    pub fn priorities(&self) -> impl Iterator<Item = u8> {
        self.start..=self.end
    }

    pub fn overlaps(&self, other: &PgRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl FromStr for PgRange {
    type Err = BufferModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |p: &str| {
            p.trim().parse::<u8>().map_err(|_| {
                BufferModelError::invalid_config("priority_group", format!("'{}' is not a PG", s))
            })
        };
        match s.split_once('-') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Self::single(parse(s)?),
        }
    }
}

impl fmt::Display for PgRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Headroom reservation of a lossless profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadroomParams {
    pub size: u64,
    pub xon: u64,
    pub xoff: u64,
}

/// One row of the headroom lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    pub headroom: HeadroomParams,
    pub threshold: String,
    pub xon_offset: Option<u64>,
}

impl LookupEntry {
    /// Parse a lookup entry from a lookup file line
    ///
    /// Format: speed cable size xon xoff threshold [xon_offset]
    /// Example: "40000 5m 34816 18432 16384 1 2496"
    pub fn from_line(line: &str) -> Option<(u32, CableLength, Self)> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            return None;
        }

        let speed = parts[0].parse().ok()?;
        let cable = parts[1].parse().ok()?;
        let entry = Self {
            headroom: HeadroomParams {
                size: parts[2].parse().ok()?,
                xon: parts[3].parse().ok()?,
                xoff: parts[4].parse().ok()?,
            },
            threshold: parts[5].to_string(),
            xon_offset: match parts.get(6) {
                Some(v) => Some(v.parse().ok()?),
                None => None,
            },
        };

        Some((speed, cable, entry))
    }
}

/// Threshold mode and value of a buffer profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threshold {
    Dynamic(i32),
    Static(u64),
}

impl Threshold {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Threshold::Dynamic(_))
    }

    pub fn value(&self) -> String {
        match self {
            Threshold::Dynamic(th) => th.to_string(),
            Threshold::Static(th) => th.to_string(),
        }
    }
}

/// Name of a buffer profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileIdentity(String);

impl ProfileIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Vendor class of the switching ASIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorClass {
    Mellanox,
    Broadcom,
    Barefoot,
    Other(String),
}

impl VendorClass {
    /// Classify the `asic_type` reported by the device
    pub fn from_asic_type(asic_type: &str) -> Self {
        match asic_type.trim() {
            "mellanox" => VendorClass::Mellanox,
            "broadcom" => VendorClass::Broadcom,
            "barefoot" => VendorClass::Barefoot,
            other => VendorClass::Other(other.to_string()),
        }
    }

    pub fn asic_type(&self) -> &str {
        match self {
            VendorClass::Mellanox => "mellanox",
            VendorClass::Broadcom => "broadcom",
            VendorClass::Barefoot => "barefoot",
            VendorClass::Other(name) => name,
        }
    }

    /// Check if the vendor shares headroom with the ingress pools
    pub fn shares_headroom_with_pool(&self) -> bool {
        matches!(self, VendorClass::Mellanox)
    }
}
