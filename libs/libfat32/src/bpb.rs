//! Boot-sector structures: BPB, extended BPB, and the FSInfo sector.
//!
//! All three are decoded field-by-field from explicit offsets; nothing here
//! depends on struct layout or padding.

use crate::error::{FsError, Result};
use crate::reader::ImageReader;
use std::io::{Read, Seek};

/// Size of one directory entry slot on disk.
pub const DIR_ENTRY_SIZE: usize = 32;
/// FAT32 end-of-chain marker threshold (after masking).
pub const FAT32_EOC: u32 = 0x0FFF_FFF8;
/// FAT32 bad-cluster sentinel (after masking).
pub const FAT32_BAD_CLUSTER: u32 = 0x0FFF_FFF7;
/// FAT32 entry mask (upper 4 bits are reserved).
pub const FAT32_MASK: u32 = 0x0FFF_FFFF;
/// Bootable-sector signature at offset 510.
pub const BOOT_SIGNATURE: u16 = 0xAA55;
/// Minimum cluster count for a volume to be FAT32 at all.
pub const FAT32_MIN_CLUSTERS: u32 = 65525;

/// FSInfo lead signature at offset 0 of the FSInfo sector.
pub const FSINFO_LEAD_SIGNATURE: u32 = 0x41615252;
/// FSInfo struct signature at offset 484.
pub const FSINFO_STRUCT_SIGNATURE: u32 = 0x61417272;
/// FSInfo trail signature at offset 508.
pub const FSINFO_TRAIL_SIGNATURE: u32 = 0xAA55_0000;
/// Marker for "unknown" in the FSInfo free-cluster fields.
pub const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// BIOS Parameter Block, the first 36 bytes of the boot sector.
#[derive(Debug, Clone)]
pub struct BiosParameterBlock {
    pub jmp: [u8; 3],
    pub oem: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub count_fats: u8,
    /// FAT12/16 only; must be 0 on FAT32.
    pub root_dir_entries_16: u16,
    /// FAT12/16 only; must be 0 on FAT32.
    pub sectors_count_16: u16,
    pub media_descriptor: u8,
    /// FAT12/16 only; must be 0 on FAT32.
    pub sectors_per_fat_16: u16,
    pub sectors_per_track: u16,
    pub heads_count: u16,
    pub hidden_sectors: u32,
    pub sectors_count_32: u32,
}

impl BiosParameterBlock {
    /// Decode the BPB from the reader's current position (offset 0).
    pub fn decode<R: Read + Seek>(r: &mut ImageReader<R>) -> Result<Self> {
        let mut jmp = [0u8; 3];
        r.read_bytes(&mut jmp)?;
        let mut oem = [0u8; 8];
        r.read_bytes(&mut oem)?;
        Ok(BiosParameterBlock {
            jmp,
            oem,
            bytes_per_sector: r.read_u16()?,
            sectors_per_cluster: r.read_u8()?,
            reserved_sectors: r.read_u16()?,
            count_fats: r.read_u8()?,
            root_dir_entries_16: r.read_u16()?,
            sectors_count_16: r.read_u16()?,
            media_descriptor: r.read_u8()?,
            sectors_per_fat_16: r.read_u16()?,
            sectors_per_track: r.read_u16()?,
            heads_count: r.read_u16()?,
            hidden_sectors: r.read_u32()?,
            sectors_count_32: r.read_u32()?,
        })
    }

    /// Check the invariants that make this block a FAT32 BPB.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(FsError::InvalidImage("unsupported sector size"));
        }
        if !self.sectors_per_cluster.is_power_of_two() || self.sectors_per_cluster > 128 {
            return Err(FsError::InvalidImage("invalid sectors-per-cluster"));
        }
        if self.reserved_sectors == 0 {
            return Err(FsError::InvalidImage("no reserved sectors"));
        }
        if self.count_fats == 0 {
            return Err(FsError::InvalidImage("no FATs"));
        }
        if self.root_dir_entries_16 != 0
            || self.sectors_count_16 != 0
            || self.sectors_per_fat_16 != 0
        {
            return Err(FsError::InvalidImage("FAT12/16 fields are non-zero"));
        }
        if self.sectors_count_32 == 0 {
            return Err(FsError::InvalidImage("zero total sectors"));
        }
        Ok(())
    }

    /// OEM identifier with trailing spaces removed.
    pub fn oem_string(&self) -> String {
        trim_padded(&self.oem)
    }
}

/// FAT32-specific extension of the BPB, contiguous at offset 36.
#[derive(Debug, Clone)]
pub struct ExtendedBiosParameterBlock {
    pub sectors_per_fat: u32,
    pub flags: u16,
    pub fat_version: u16,
    /// Starting cluster of the root directory.
    pub root_dir_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    /// Must be 0x28 or 0x29.
    pub signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub system_type: [u8; 8],
}

impl ExtendedBiosParameterBlock {
    /// Decode the EBPB from the reader's current position (offset 36),
    /// consuming the rest of the boot sector including the 0xAA55 signature.
    pub fn decode<R: Read + Seek>(r: &mut ImageReader<R>) -> Result<Self> {
        let sectors_per_fat = r.read_u32()?;
        let flags = r.read_u16()?;
        let fat_version = r.read_u16()?;
        let root_dir_cluster = r.read_u32()?;
        let fs_info_sector = r.read_u16()?;
        let backup_boot_sector = r.read_u16()?;
        r.skip(12)?; // reserved
        let drive_number = r.read_u8()?;
        r.skip(1)?; // reserved
        let signature = r.read_u8()?;
        let volume_id = r.read_u32()?;
        let mut volume_label = [0u8; 11];
        r.read_bytes(&mut volume_label)?;
        let mut system_type = [0u8; 8];
        r.read_bytes(&mut system_type)?;
        r.skip(420)?; // boot code
        if r.read_u16()? != BOOT_SIGNATURE {
            return Err(FsError::InvalidImage("missing 0xAA55 boot signature"));
        }
        Ok(ExtendedBiosParameterBlock {
            sectors_per_fat,
            flags,
            fat_version,
            root_dir_cluster,
            fs_info_sector,
            backup_boot_sector,
            drive_number,
            signature,
            volume_id,
            volume_label,
            system_type,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.signature != 0x28 && self.signature != 0x29 {
            return Err(FsError::InvalidImage("bad EBPB signature"));
        }
        if self.sectors_per_fat == 0 {
            return Err(FsError::InvalidImage("zero sectors per FAT"));
        }
        if self.root_dir_cluster < 2 {
            return Err(FsError::InvalidImage("root cluster below 2"));
        }
        Ok(())
    }

    pub fn volume_label_string(&self) -> String {
        trim_padded(&self.volume_label)
    }

    pub fn system_type_string(&self) -> String {
        trim_padded(&self.system_type)
    }
}

/// The advisory FSInfo sector with cached free-cluster bookkeeping.
#[derive(Debug, Clone)]
pub struct FileSystemInformation {
    pub lead_signature: u32,
    pub struct_signature: u32,
    pub free_clusters: u32,
    pub available_cluster_start: u32,
    pub trail_signature: u32,
}

impl FileSystemInformation {
    /// Decode FSInfo from the reader's current position (the start of the
    /// FSInfo sector).
    pub fn decode<R: Read + Seek>(r: &mut ImageReader<R>) -> Result<Self> {
        let lead_signature = r.read_u32()?;
        r.skip(480)?; // reserved
        let struct_signature = r.read_u32()?;
        let free_clusters = r.read_u32()?;
        let available_cluster_start = r.read_u32()?;
        r.skip(12)?; // reserved
        let trail_signature = r.read_u32()?;
        Ok(FileSystemInformation {
            lead_signature,
            struct_signature,
            free_clusters,
            available_cluster_start,
            trail_signature,
        })
    }

    /// Whether all three signatures carry their expected values.
    pub fn is_consistent(&self) -> bool {
        self.lead_signature == FSINFO_LEAD_SIGNATURE
            && self.struct_signature == FSINFO_STRUCT_SIGNATURE
            && self.trail_signature == FSINFO_TRAIL_SIGNATURE
    }

    /// Last known free-cluster count, if the volume recorded one.
    pub fn free_clusters(&self) -> Option<u32> {
        (self.free_clusters != FSINFO_UNKNOWN).then_some(self.free_clusters)
    }

    /// First cluster to start a free-cluster search at, if recorded.
    pub fn available_cluster_start(&self) -> Option<u32> {
        (self.available_cluster_start != FSINFO_UNKNOWN).then_some(self.available_cluster_start)
    }
}

/// Cluster count derived from the BPB/EBPB geometry.
pub fn total_clusters(bpb: &BiosParameterBlock, ebpb: &ExtendedBiosParameterBlock) -> u32 {
    let fat_sectors = bpb.count_fats as u32 * ebpb.sectors_per_fat;
    let data_sectors = bpb
        .sectors_count_32
        .saturating_sub(bpb.reserved_sectors as u32 + fat_sectors);
    data_sectors / bpb.sectors_per_cluster as u32
}

fn trim_padded(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |p| p + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
