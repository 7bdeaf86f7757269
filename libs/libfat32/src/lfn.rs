//! VFAT long filename (LFN) support.
//!
//! Long names are stored as UCS-2 across a run of 32-byte entries that
//! immediately precede their 8.3 entry, highest-order fragment first. Each
//! fragment carries 13 code units split over three regions (5 + 6 + 2) and
//! the checksum of the short name it decorates.

/// Compute the VFAT checksum of an 8.3 name (11 bytes).
pub fn checksum(name83: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in name83 {
        sum = ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b);
    }
    sum
}

/// Extract the 13 UCS-2 code units from a 32-byte LFN entry.
pub fn extract_units(slot: &[u8]) -> [u16; 13] {
    let mut units = [0u16; 13];
    // Units 1-5: bytes 1..11
    for j in 0..5 {
        units[j] = u16::from_le_bytes([slot[1 + j * 2], slot[2 + j * 2]]);
    }
    // Units 6-11: bytes 14..26
    for j in 0..6 {
        units[5 + j] = u16::from_le_bytes([slot[14 + j * 2], slot[15 + j * 2]]);
    }
    // Units 12-13: bytes 28..32
    for j in 0..2 {
        units[11 + j] = u16::from_le_bytes([slot[28 + j * 2], slot[29 + j * 2]]);
    }
    units
}

/// Accumulates LFN fragments until the short entry they decorate arrives.
///
/// Fragments are kept in arrival order (highest order first on disk) and
/// reversed at assembly time so the name reads left to right.
#[derive(Default)]
pub(crate) struct LongNameAssembler {
    fragments: Vec<[u16; 13]>,
    checksum: u8,
    active: bool,
}

impl LongNameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any accumulated fragments.
    pub fn reset(&mut self) {
        self.fragments.clear();
        self.active = false;
    }

    /// Feed one 32-byte LFN slot.
    pub fn push(&mut self, slot: &[u8]) {
        let order = slot[0];
        let fragment_checksum = slot[13];
        if order & 0x40 != 0 {
            // Terminal (highest-order) fragment: any prior incomplete run is stale.
            self.reset();
            self.checksum = fragment_checksum;
            self.active = true;
        } else if !self.active || fragment_checksum != self.checksum {
            self.reset();
            return;
        }
        self.fragments.push(extract_units(slot));
    }

    /// Assemble the long name for the short entry now being emitted, or
    /// `None` when no valid run precedes it. Mismatch between the stored
    /// checksum and the 8.3 name invalidates the run.
    pub fn take(&mut self, name83: &[u8; 11]) -> Option<String> {
        if !self.active {
            return None;
        }
        let valid = self.checksum == checksum(name83);
        let mut units = Vec::with_capacity(self.fragments.len() * 13);
        if valid {
            for fragment in self.fragments.iter().rev() {
                for &unit in fragment {
                    if unit == 0x0000 || unit == 0xFFFF {
                        break;
                    }
                    units.push(unit);
                }
            }
        }
        self.reset();
        if units.is_empty() {
            return None;
        }
        let name: String = char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        Some(name)
    }
}
