//! Directory parsing: 32-byte slots, the long-filename overlay, and the
//! cluster-chain walker.
//!
//! A directory is a stream of 32-byte slots. A slot whose first byte is 0x00
//! terminates the directory; 0xE5 marks a free slot; an attribute byte of
//! 0x0F (under the 0x3F mask) marks a long-filename fragment decorating the
//! next short entry. Everything else is an 8.3 entry.

use std::io::{Read, Seek};

use bitflags::bitflags;

use crate::bpb::DIR_ENTRY_SIZE;
use crate::datetime::{DosDate, DosDatetime};
use crate::error::Result;
use crate::lfn::LongNameAssembler;
use crate::volume::Volume;

bitflags! {
    /// Directory-entry attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// Attribute signature of a long-filename fragment.
pub const ATTR_LONG_NAME: u8 = 0x0F;

/// One logical directory entry: the 8.3 record plus any long-name overlay.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Raw 8.3 name field (8 name + 3 extension, space padded).
    pub short_name: [u8; 11],
    /// Reconstructed long filename, when the entry carries one.
    pub long_name: Option<String>,
    /// Logical name: the long name if present, else the dotted short name.
    pub name: String,
    pub attributes: Attributes,
    pub nt_reserved: u8,
    pub creation_time_tenths: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub last_accessed_date: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub first_cluster_high: u16,
    pub first_cluster_low: u16,
    /// File size in bytes; 0 for directories.
    pub size: u32,
}

impl DirectoryEntry {
    pub fn first_cluster(&self) -> u32 {
        (self.first_cluster_high as u32) << 16 | self.first_cluster_low as u32
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(Attributes::READ_ONLY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(Attributes::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.attributes.contains(Attributes::SYSTEM)
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes.contains(Attributes::VOLUME_ID)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    pub fn is_archive(&self) -> bool {
        self.attributes.contains(Attributes::ARCHIVE)
    }

    pub fn creation_datetime(&self) -> DosDatetime {
        DosDatetime::from_packed(self.creation_date, self.creation_time)
    }

    pub fn modification_datetime(&self) -> DosDatetime {
        DosDatetime::from_packed(self.last_mod_date, self.last_mod_time)
    }

    pub fn accessed_date(&self) -> DosDate {
        DosDate::from_packed(self.last_accessed_date)
    }
}

/// Convert a raw 11-byte 8.3 field into the dotted display form, preserving
/// case ("A       TXT" becomes "A.TXT").
fn parse_83_name(raw: &[u8]) -> String {
    let base_end = raw[0..8].iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
    let ext_end = raw[8..11].iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
    let mut name = String::with_capacity(12);
    name.push_str(&String::from_utf8_lossy(&raw[..base_end]));
    if ext_end > 0 {
        name.push('.');
        name.push_str(&String::from_utf8_lossy(&raw[8..8 + ext_end]));
    }
    name
}

fn decode_short_entry(slot: &[u8], long_name: Option<String>) -> DirectoryEntry {
    let mut short_name = [0u8; 11];
    short_name.copy_from_slice(&slot[0..11]);
    let mut name = match &long_name {
        Some(long) => long.clone(),
        None => parse_83_name(&short_name),
    };
    name.truncate(name.trim_end().len());

    DirectoryEntry {
        short_name,
        long_name,
        name,
        attributes: Attributes::from_bits_truncate(slot[11]),
        nt_reserved: slot[12],
        creation_time_tenths: slot[13],
        creation_time: u16::from_le_bytes([slot[14], slot[15]]),
        creation_date: u16::from_le_bytes([slot[16], slot[17]]),
        last_accessed_date: u16::from_le_bytes([slot[18], slot[19]]),
        first_cluster_high: u16::from_le_bytes([slot[20], slot[21]]),
        last_mod_time: u16::from_le_bytes([slot[22], slot[23]]),
        last_mod_date: u16::from_le_bytes([slot[24], slot[25]]),
        first_cluster_low: u16::from_le_bytes([slot[26], slot[27]]),
        size: u32::from_le_bytes([slot[28], slot[29], slot[30], slot[31]]),
    }
}

/// Run the slot state machine over a directory's raw bytes, producing logical
/// entries in on-disk order. Volume-label slots are skipped; `.` and `..`
/// are retained.
pub(crate) fn parse_dir_entries(buf: &[u8]) -> Vec<DirectoryEntry> {
    let mut entries = Vec::new();
    let mut assembler = LongNameAssembler::new();

    let mut i = 0;
    while i + DIR_ENTRY_SIZE <= buf.len() {
        let slot = &buf[i..i + DIR_ENTRY_SIZE];
        i += DIR_ENTRY_SIZE;

        let first_byte = slot[0];
        if first_byte == 0x00 {
            break;
        }
        if first_byte == 0xE5 {
            assembler.reset();
            continue;
        }

        let attributes = slot[11];
        if attributes & 0x3F == ATTR_LONG_NAME {
            assembler.push(slot);
            continue;
        }
        if attributes & Attributes::VOLUME_ID.bits() != 0 {
            assembler.reset();
            continue;
        }

        let mut short_name = [0u8; 11];
        short_name.copy_from_slice(&slot[0..11]);
        let long_name = assembler.take(&short_name);
        entries.push(decode_short_entry(slot, long_name));
    }
    entries
}

impl<R: Read + Seek> Volume<R> {
    /// Read the raw bytes of a directory by walking its cluster chain.
    pub fn read_dir_raw(&mut self, cluster: u32) -> Result<Vec<u8>> {
        if cluster < 2 {
            return Ok(Vec::new());
        }
        let cluster_size = self.bytes_per_cluster() as usize;
        let mut data = Vec::new();
        let mut current = cluster;
        loop {
            let start = data.len();
            data.resize(start + cluster_size, 0);
            self.read_cluster(current, &mut data[start..])?;
            match self.next_cluster(current)? {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(data)
    }

    /// List the entries of the directory starting at `cluster`, in on-disk
    /// order.
    pub fn read_dir(&mut self, cluster: u32) -> Result<Vec<DirectoryEntry>> {
        let raw = self.read_dir_raw(cluster)?;
        let entries = parse_dir_entries(&raw);
        log::trace!("directory at cluster {cluster}: {} entries", entries.len());
        Ok(entries)
    }
}
