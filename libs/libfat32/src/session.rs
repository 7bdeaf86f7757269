//! A session over an opened image file: root enumeration, path resolution,
//! and the current-directory cache.
//!
//! The session is single-threaded and synchronous. It owns the image handle;
//! the handle's seek position is shared state mutated by every operation.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::dir::DirectoryEntry;
use crate::error::{FsError, Result};
use crate::path;
use crate::volume::Volume;

/// Read-only view of a FAT32 image file.
pub struct FileSystem {
    image_path: PathBuf,
    volume: Volume<File>,
    root_entries: Vec<DirectoryEntry>,
    /// Normalized path of the cached listing; empty string is the root.
    current_path: String,
    current_entries: Vec<DirectoryEntry>,
}

impl FileSystem {
    /// Open an image file, decode its headers, and enumerate the root
    /// directory. Header failures are terminal: no session is produced.
    pub fn open(image_path: impl AsRef<Path>) -> Result<Self> {
        let image_path = image_path.as_ref().to_path_buf();
        let file = File::open(&image_path)?;
        let mut volume = Volume::open(file)?;
        let root_cluster = volume.root_dir_cluster();
        let root_entries = volume.read_dir(root_cluster)?;
        log::debug!(
            "opened '{}': {} root entries",
            image_path.display(),
            root_entries.len(),
        );
        Ok(FileSystem {
            image_path,
            volume,
            current_path: String::new(),
            current_entries: root_entries.clone(),
            root_entries,
        })
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Entries of the root directory, in on-disk order.
    pub fn root_entries(&self) -> &[DirectoryEntry] {
        &self.root_entries
    }

    /// Entries of the current directory, in on-disk order.
    pub fn current_entries(&self) -> &[DirectoryEntry] {
        &self.current_entries
    }

    /// Resolve a directory path from the root, walking each segment's
    /// cluster chain. The empty path (or `/`) is the root itself.
    fn resolve_dir(&mut self, normalized: &str) -> Result<Vec<DirectoryEntry>> {
        let mut entries = self.root_entries.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            let found = entries
                .iter()
                .find(|e| e.name == segment)
                .ok_or(FsError::NotFound)?;
            if !found.is_directory() {
                return Err(FsError::NotADirectory);
            }
            let cluster = found.first_cluster();
            entries = self.volume.read_dir(cluster)?;
        }
        Ok(entries)
    }

    /// Make `path` the current directory. A repeated change to the already
    /// current path is served from the cache.
    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        let normalized = path::normalize(path);
        if normalized == self.current_path {
            return Ok(());
        }
        let entries = self.resolve_dir(&normalized)?;
        self.current_path = normalized;
        self.current_entries = entries;
        Ok(())
    }

    /// Find the entry a path names: resolve the parent directory, then match
    /// the final segment against the entry names.
    pub fn find_entry(&mut self, path: &str) -> Result<DirectoryEntry> {
        let normalized = path::normalize(path);
        if normalized.is_empty() {
            // The root has no entry of its own.
            return Err(FsError::NotFound);
        }
        let (parent, name) = path::split_parent_name(&normalized);
        let entries = self.resolve_dir(parent)?;
        entries
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or(FsError::NotFound)
    }

    /// Read part of a file found by `find_entry`.
    pub fn read_at(&mut self, entry: &DirectoryEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.volume.read_at(entry, offset, buf)
    }

    /// Read a whole file found by `find_entry`.
    pub fn read_to_end(&mut self, entry: &DirectoryEntry) -> Result<Vec<u8>> {
        self.volume.read_to_end(entry)
    }

    /// Re-open and re-parse the image, tolerating changes to the backing
    /// file. Atomic from the caller's perspective: either the fresh state
    /// replaces this one wholesale, or `Transient` is returned and the
    /// previous state remains usable. The current directory resets to root.
    pub fn refresh(&mut self) -> Result<()> {
        match FileSystem::open(&self.image_path) {
            Ok(fresh) => {
                *self = fresh;
                Ok(())
            }
            Err(err) => {
                log::warn!("refresh of '{}' failed: {err}", self.image_path.display());
                Err(FsError::Transient)
            }
        }
    }

    /// Decoded header summary for diagnostics.
    pub fn info(&self) -> VolumeInfo {
        let bpb = self.volume.bpb();
        let ebpb = self.volume.ebpb();
        let fs_info = self.volume.fs_info();
        VolumeInfo {
            oem: bpb.oem_string(),
            bytes_per_sector: bpb.bytes_per_sector,
            sectors_per_cluster: bpb.sectors_per_cluster,
            reserved_sectors: bpb.reserved_sectors,
            count_fats: bpb.count_fats,
            media_descriptor: bpb.media_descriptor,
            total_sectors: bpb.sectors_count_32,
            hidden_sectors: bpb.hidden_sectors,
            sectors_per_fat: ebpb.sectors_per_fat,
            fat_version: ebpb.fat_version,
            root_dir_cluster: ebpb.root_dir_cluster,
            fs_info_sector: ebpb.fs_info_sector,
            backup_boot_sector: ebpb.backup_boot_sector,
            drive_number: ebpb.drive_number,
            volume_id: ebpb.volume_id,
            volume_label: ebpb.volume_label_string(),
            system_type: ebpb.system_type_string(),
            total_clusters: self.volume.total_clusters(),
            fs_info_consistent: fs_info.is_consistent(),
            free_clusters: fs_info.free_clusters(),
            available_cluster_start: fs_info.available_cluster_start(),
        }
    }

    /// Volume label from the EBPB, trailing padding removed.
    pub fn volume_label(&self) -> String {
        self.volume.ebpb().volume_label_string()
    }
}

/// Decoded BPB/EBPB/FSInfo summary, printable as a report.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub oem: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub count_fats: u8,
    pub media_descriptor: u8,
    pub total_sectors: u32,
    pub hidden_sectors: u32,
    pub sectors_per_fat: u32,
    pub fat_version: u16,
    pub root_dir_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
    pub drive_number: u8,
    pub volume_id: u32,
    pub volume_label: String,
    pub system_type: String,
    pub total_clusters: u32,
    pub fs_info_consistent: bool,
    pub free_clusters: Option<u32>,
    pub available_cluster_start: Option<u32>,
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OEM identifier: {}", self.oem)?;
        writeln!(f, "Volume label: {}", self.volume_label)?;
        writeln!(f, "Volume ID: {:08X}", self.volume_id)?;
        writeln!(f, "System type: {}", self.system_type)?;
        writeln!(f, "Bytes per sector: {}", self.bytes_per_sector)?;
        writeln!(f, "Sectors per cluster: {}", self.sectors_per_cluster)?;
        writeln!(f, "Reserved sectors: {}", self.reserved_sectors)?;
        writeln!(f, "Number of FATs: {}", self.count_fats)?;
        writeln!(f, "Sectors per FAT: {}", self.sectors_per_fat)?;
        writeln!(f, "Media descriptor: 0x{:02X}", self.media_descriptor)?;
        writeln!(f, "Total sectors: {}", self.total_sectors)?;
        writeln!(f, "Hidden sectors: {}", self.hidden_sectors)?;
        writeln!(f, "Total clusters: {}", self.total_clusters)?;
        writeln!(
            f,
            "FAT version: {}.{}",
            self.fat_version >> 8,
            self.fat_version & 0xFF
        )?;
        writeln!(f, "Root directory cluster: {}", self.root_dir_cluster)?;
        writeln!(f, "FSInfo sector: {}", self.fs_info_sector)?;
        writeln!(f, "Backup boot sector: {}", self.backup_boot_sector)?;
        writeln!(f, "Drive number: 0x{:02X}", self.drive_number)?;
        match self.free_clusters {
            Some(n) => writeln!(f, "Last known free clusters: {n}")?,
            None => writeln!(f, "Last known free clusters: N/A")?,
        }
        match self.available_cluster_start {
            Some(n) => write!(f, "Free cluster search start: {n}"),
            None => write!(f, "Free cluster search start: N/A"),
        }
    }
}
