//! Headroom lookup table and its file parser

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::{info, warn};

use crate::types::{CableLength, LookupEntry};

/// Static (speed, cable length) -> headroom table, loaded once per device class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadroomLookup {
    entries: BTreeMap<u32, BTreeMap<CableLength, LookupEntry>>,
}

impl HeadroomLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, speed: u32, cable: CableLength, entry: LookupEntry) {
        self.entries.entry(speed).or_default().insert(cable, entry);
    }

    /// Exact-match lookup
    pub fn get(&self, speed: u32, cable: CableLength) -> Option<&LookupEntry> {
        self.entries.get(&speed)?.get(&cable)
    }

    /// All tabulated cable lengths for a speed
    pub fn for_speed(&self, speed: u32) -> Option<&BTreeMap<CableLength, LookupEntry>> {
        self.entries.get(&speed)
    }

    /// Number of speeds in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify that an untabulated cable length sits between its tabulated neighbors
    ///
    /// Every longer tabulated cable must have an xoff at least `xoff`, every
    /// shorter one at most `xoff`. Nothing is interpolated.
    pub fn check_xoff_monotonic(
        &self,
        speed: u32,
        cable: CableLength,
        xoff: u64,
    ) -> BufferModelResult<()> {
        let table = self.for_speed(speed).ok_or_else(|| {
            BufferModelError::entry_not_found("pg_profile_lookup", speed.to_string())
        })?;

        for (std_cable, std_entry) in table {
            let std_xoff = std_entry.headroom.xoff;
            if *std_cable > cable && std_xoff < xoff {
                return Err(BufferModelError::model_inconsistency(
                    format!("xoff of {} {} (longer cable {} has less)", speed, cable, std_cable),
                    format!("<= {}", std_xoff),
                    xoff,
                ));
            }
            if *std_cable <= cable && std_xoff > xoff {
                return Err(BufferModelError::model_inconsistency(
                    format!("xoff of {} {} (shorter cable {} has more)", speed, cable, std_cable),
                    format!(">= {}", std_xoff),
                    xoff,
                ));
            }
        }

        Ok(())
    }

    /// Largest tabulated reserved size at a cable length not longer than `cable`
    pub fn size_lower_bound(&self, speed: u32, cable: CableLength) -> Option<u64> {
        self.for_speed(speed)?
            .range(..=cable)
            .map(|(_, entry)| entry.headroom.size)
            .max()
    }

    /// Smallest tabulated reserved size at a cable length not shorter than `cable`
    pub fn size_upper_bound(&self, speed: u32, cable: CableLength) -> Option<u64> {
        self.for_speed(speed)?
            .range(cable..)
            .map(|(_, entry)| entry.headroom.size)
            .min()
    }

    /// Parse lookup table content
    ///
    /// Lines starting with '#' are comments, empty lines are ignored and
    /// malformed lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> BufferModelResult<Self> {
        let mut lookup = Self::new();

        for line in reader.lines() {
            let line = line.map_err(|e| {
                BufferModelError::internal(format!("Failed to read line: {}", e))
            })?;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match LookupEntry::from_line(trimmed) {
                Some((speed, cable, entry)) => {
                    info!(
                        "PG profile for speed {} and cable {}: size={}, xon={}, xoff={}, th={}",
                        speed,
                        cable,
                        entry.headroom.size,
                        entry.headroom.xon,
                        entry.headroom.xoff,
                        entry.threshold
                    );
                    lookup.insert(speed, cable, entry);
                }
                None => warn!("Skipping malformed PG lookup line: {}", trimmed),
            }
        }

        Ok(lookup)
    }
}

/// Parse PG profile lookup file
///
/// File format:
/// ```text
/// # speed cable size    xon   xoff threshold xon_offset
/// 40000   5m    34816   18432 16384 1        2496
/// 100000  300m  184320  18432 165888 1
/// ```
pub fn parse_pg_lookup_file(path: impl AsRef<Path>) -> BufferModelResult<HeadroomLookup> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        BufferModelError::internal(format!(
            "Failed to open PG lookup file {}: {}",
            path.display(),
            e
        ))
    })?;

    HeadroomLookup::from_reader(BufReader::new(file))
}
