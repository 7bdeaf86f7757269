//! An opened FAT32 volume: decoded headers plus cluster arithmetic.
//!
//! Headers are decoded once at open time and treated as immutable
//! configuration afterwards. The underlying reader's position is shared
//! state; every operation seeks explicitly before reading.

use std::io::{Read, Seek};

use crate::bpb::{
    self, BiosParameterBlock, ExtendedBiosParameterBlock, FileSystemInformation, FAT32_BAD_CLUSTER,
    FAT32_EOC, FAT32_MASK, FAT32_MIN_CLUSTERS,
};
use crate::error::{FsError, Result};
use crate::reader::ImageReader;

#[derive(Debug)]
pub struct Volume<R> {
    pub(crate) reader: ImageReader<R>,
    bpb: BiosParameterBlock,
    ebpb: ExtendedBiosParameterBlock,
    fs_info: FileSystemInformation,
    // Geometry derived once from the headers.
    first_fat_sector: u32,
    first_data_sector: u32,
    total_clusters: u32,
}

impl<R: Read + Seek> Volume<R> {
    /// Decode and validate the headers of a FAT32 image.
    ///
    /// Reads the BPB from offset 0, the EBPB contiguously after it (verifying
    /// the 0xAA55 signature at offset 510), then FSInfo from the sector the
    /// EBPB names. Any invariant violation yields `InvalidImage`.
    pub fn open(inner: R) -> Result<Self> {
        let mut reader = ImageReader::new(inner);
        reader.seek(0)?;
        let bpb = BiosParameterBlock::decode(&mut reader)?;
        bpb.validate()?;
        let ebpb = ExtendedBiosParameterBlock::decode(&mut reader)?;
        ebpb.validate()?;

        let total_clusters = bpb::total_clusters(&bpb, &ebpb);
        if total_clusters < FAT32_MIN_CLUSTERS {
            return Err(FsError::InvalidImage("cluster count below the FAT32 minimum"));
        }

        reader.seek(ebpb.fs_info_sector as u64 * bpb.bytes_per_sector as u64)?;
        let fs_info = FileSystemInformation::decode(&mut reader)?;
        if !fs_info.is_consistent() {
            log::warn!("FSInfo signatures do not match; ignoring its hints");
        }

        let first_fat_sector = bpb.reserved_sectors as u32;
        let first_data_sector = first_fat_sector + bpb.count_fats as u32 * ebpb.sectors_per_fat;

        log::debug!(
            "FAT32 volume: OEM '{}', {} bytes/sector, {} sectors/cluster, {} clusters",
            bpb.oem_string(),
            bpb.bytes_per_sector,
            bpb.sectors_per_cluster,
            total_clusters,
        );
        log::debug!(
            "FAT32 layout: FAT at sector {}, data at sector {}, root cluster {}",
            first_fat_sector,
            first_data_sector,
            ebpb.root_dir_cluster,
        );

        Ok(Volume {
            reader,
            bpb,
            ebpb,
            fs_info,
            first_fat_sector,
            first_data_sector,
            total_clusters,
        })
    }

    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn ebpb(&self) -> &ExtendedBiosParameterBlock {
        &self.ebpb
    }

    pub fn fs_info(&self) -> &FileSystemInformation {
        &self.fs_info
    }

    pub fn total_clusters(&self) -> u32 {
        self.total_clusters
    }

    /// Starting cluster of the root directory.
    pub fn root_dir_cluster(&self) -> u32 {
        self.ebpb.root_dir_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bpb.sectors_per_cluster as u32 * self.bpb.bytes_per_sector as u32
    }

    /// Absolute byte offset of a cluster's first byte. Cluster numbers start
    /// at 2.
    pub fn cluster_address(&self, cluster: u32) -> u64 {
        (self.first_data_sector as u64
            + (cluster as u64 - 2) * self.bpb.sectors_per_cluster as u64)
            * self.bpb.bytes_per_sector as u64
    }

    fn fat_entry_address(&self, cluster: u32) -> u64 {
        self.first_fat_sector as u64 * self.bpb.bytes_per_sector as u64 + cluster as u64 * 4
    }

    /// Follow the FAT link for `cluster`.
    ///
    /// Returns `Ok(Some(next))` for a chain link, `Ok(None)` at end of chain,
    /// and `BadCluster` when the chain runs into the bad-cluster sentinel.
    /// Free or reserved links (below 2) also terminate the chain.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<Option<u32>> {
        let address = self.fat_entry_address(cluster);
        self.reader.seek(address)?;
        let value = self.reader.read_u32()? & FAT32_MASK;
        if value == FAT32_BAD_CLUSTER {
            return Err(FsError::BadCluster(cluster));
        }
        if value >= FAT32_EOC || value < 2 {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Read one whole cluster into `buf` (which must hold at least
    /// `bytes_per_cluster` bytes).
    pub(crate) fn read_cluster(&mut self, cluster: u32, buf: &mut [u8]) -> Result<()> {
        let address = self.cluster_address(cluster);
        let size = self.bytes_per_cluster() as usize;
        self.reader.seek(address)?;
        self.reader.read_bytes(&mut buf[..size])?;
        Ok(())
    }
}
