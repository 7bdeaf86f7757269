//! Hand-built in-memory FAT32 images for tests.
//!
//! The builder lays out a minimal valid volume: 512-byte sectors, one sector
//! per cluster, 32 reserved sectors, two 512-sector FATs, and a claimed
//! sector count large enough to clear the FAT32 cluster minimum. Only the
//! region the tests actually touch is materialized.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use crate::error::Result;
use crate::lfn;
use crate::volume::Volume;

const BYTES_PER_SECTOR: usize = 512;
const RESERVED_SECTORS: u32 = 32;
const SECTORS_PER_FAT: u32 = 512;
const COUNT_FATS: u32 = 2;
const SECTORS_COUNT: u32 = 67_000;
const DATA_START_SECTOR: u32 = RESERVED_SECTORS + COUNT_FATS * SECTORS_PER_FAT;
const SLOTS_PER_CLUSTER: usize = BYTES_PER_SECTOR / 32;
// Clusters available to the builder beyond the root.
const DATA_CLUSTERS: u32 = 512;

// 2023-05-17 12:34:56 stamped on every fixture entry.
const DEFAULT_DATE: u16 = ((2023 - 1980) << 9) | (5 << 5) | 17;
const DEFAULT_TIME: u16 = (12 << 11) | (34 << 5) | (56 / 2);

#[derive(Clone, Copy)]
struct DirState {
    last_cluster: u32,
    used_slots: usize,
}

pub(crate) struct ImageBuilder {
    data: Vec<u8>,
    next_free: u32,
    dirs: HashMap<u32, DirState>,
}

impl ImageBuilder {
    /// A valid, empty volume whose root directory is cluster 2.
    pub fn new() -> Self {
        let size = (DATA_START_SECTOR + DATA_CLUSTERS) as usize * BYTES_PER_SECTOR;
        let mut builder = ImageBuilder {
            data: vec![0u8; size],
            next_free: 3,
            dirs: HashMap::new(),
        };

        // BPB
        builder.corrupt(0, &[0xEB, 0x58, 0x90]);
        builder.corrupt(3, b"mkfs.fat");
        builder.put_u16(11, BYTES_PER_SECTOR as u16);
        builder.data[13] = 1; // sectors per cluster
        builder.put_u16(14, RESERVED_SECTORS as u16);
        builder.data[16] = COUNT_FATS as u8;
        builder.data[21] = 0xF8; // media descriptor
        builder.put_u16(24, 32); // sectors per track
        builder.put_u16(26, 64); // heads
        builder.put_u32(32, SECTORS_COUNT);

        // EBPB
        builder.put_u32(36, SECTORS_PER_FAT);
        builder.put_u32(44, 2); // root directory cluster
        builder.put_u16(48, 1); // FSInfo sector
        builder.put_u16(50, 6); // backup boot sector
        builder.data[64] = 0x80; // drive number
        builder.data[66] = 0x29; // EBPB signature
        builder.put_u32(67, 0x2A1B_3C4D); // volume id
        builder.corrupt(71, b"TESTVOL    ");
        builder.corrupt(82, b"FAT32   ");
        builder.put_u16(510, 0xAA55);

        // FSInfo sector
        builder.put_u32(512, 0x41615252);
        builder.put_u32(512 + 484, 0x61417272);
        builder.put_u32(512 + 488, 0xFFFF_FFFF); // free clusters unknown
        builder.put_u32(512 + 492, 3); // first free hint
        builder.put_u32(512 + 508, 0xAA55_0000);

        // Reserved FAT entries plus the root chain.
        builder.set_fat(0, 0x0FFF_FFF8);
        builder.set_fat(1, 0x0FFF_FFFF);
        builder.set_fat(2, 0x0FFF_FFFF);

        builder
    }

    fn put_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite arbitrary bytes, e.g. to break an invariant.
    pub fn corrupt(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Set a FAT entry in the first FAT.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        let offset = RESERVED_SECTORS as usize * BYTES_PER_SECTOR + cluster as usize * 4;
        self.put_u32(offset, value);
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        (DATA_START_SECTOR + (cluster - 2)) as usize * BYTES_PER_SECTOR
    }

    fn alloc_cluster(&mut self) -> u32 {
        let cluster = self.next_free;
        assert!(cluster < 2 + DATA_CLUSTERS, "fixture image out of clusters");
        self.next_free += 1;
        self.set_fat(cluster, 0x0FFF_FFFF);
        cluster
    }

    fn alloc_chain(&mut self, count: usize) -> Vec<u32> {
        let clusters: Vec<u32> = (0..count).map(|_| self.alloc_cluster()).collect();
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        clusters
    }

    fn write_slot(&mut self, dir: u32, slot: &[u8; 32]) {
        let mut state = self
            .dirs
            .get(&dir)
            .copied()
            .unwrap_or(DirState { last_cluster: dir, used_slots: 0 });
        if state.used_slots == SLOTS_PER_CLUSTER {
            let extension = self.alloc_cluster();
            self.set_fat(state.last_cluster, extension);
            state = DirState { last_cluster: extension, used_slots: 0 };
        }
        let offset = self.cluster_offset(state.last_cluster) + state.used_slots * 32;
        self.data[offset..offset + 32].copy_from_slice(slot);
        state.used_slots += 1;
        self.dirs.insert(dir, state);
    }

    fn write_payload(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return 0;
        }
        let count = data.len().div_ceil(BYTES_PER_SECTOR);
        let clusters = self.alloc_chain(count);
        for (chunk, &cluster) in data.chunks(BYTES_PER_SECTOR).zip(&clusters) {
            let offset = self.cluster_offset(cluster);
            self.data[offset..offset + chunk.len()].copy_from_slice(chunk);
        }
        clusters[0]
    }

    /// Add a file with a plain 8.3 name. Returns its first cluster (0 when
    /// empty).
    pub fn add_file83(&mut self, dir: u32, name83: &[u8; 11], data: &[u8]) -> u32 {
        let first = self.write_payload(data);
        self.write_slot(dir, &short_slot(name83, 0x20, first, data.len() as u32));
        first
    }

    /// Add a file with a long filename overlay. Returns its first cluster.
    pub fn add_file_long(
        &mut self,
        dir: u32,
        long_name: &str,
        name83: &[u8; 11],
        data: &[u8],
    ) -> u32 {
        let first = self.write_payload(data);
        for slot in lfn_slots(long_name, name83) {
            self.write_slot(dir, &slot);
        }
        self.write_slot(dir, &short_slot(name83, 0x20, first, data.len() as u32));
        first
    }

    /// Add a subdirectory with `.` and `..` entries. Returns its cluster.
    pub fn add_dir(&mut self, parent: u32, name83: &[u8; 11]) -> u32 {
        let cluster = self.alloc_cluster();
        self.write_slot(parent, &short_slot(name83, 0x10, cluster, 0));
        self.write_slot(cluster, &short_slot(b".          ", 0x10, cluster, 0));
        let dotdot_cluster = if parent == 2 { 0 } else { parent };
        self.write_slot(cluster, &short_slot(b"..         ", 0x10, dotdot_cluster, 0));
        cluster
    }

    /// Add a volume-label slot to the root directory.
    pub fn add_volume_label(&mut self, label11: &[u8; 11]) {
        self.write_slot(2, &short_slot(label11, 0x08, 0, 0));
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn try_into_volume(self) -> Result<Volume<Cursor<Vec<u8>>>> {
        Volume::open(Cursor::new(self.data))
    }

    pub fn into_volume(self) -> Volume<Cursor<Vec<u8>>> {
        self.try_into_volume().expect("fixture image must be valid")
    }
}

/// Build one 32-byte 8.3 directory slot with the fixture timestamp.
pub(crate) fn short_slot(name83: &[u8; 11], attr: u8, first_cluster: u32, size: u32) -> [u8; 32] {
    let mut slot = [0u8; 32];
    slot[0..11].copy_from_slice(name83);
    slot[11] = attr;
    slot[14..16].copy_from_slice(&DEFAULT_TIME.to_le_bytes());
    slot[16..18].copy_from_slice(&DEFAULT_DATE.to_le_bytes());
    slot[18..20].copy_from_slice(&DEFAULT_DATE.to_le_bytes());
    slot[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
    slot[22..24].copy_from_slice(&DEFAULT_TIME.to_le_bytes());
    slot[24..26].copy_from_slice(&DEFAULT_DATE.to_le_bytes());
    slot[26..28].copy_from_slice(&(first_cluster as u16).to_le_bytes());
    slot[28..32].copy_from_slice(&size.to_le_bytes());
    slot
}

/// Build the LFN slot run for a name, in disk order (highest order first).
pub(crate) fn lfn_slots(long_name: &str, name83: &[u8; 11]) -> Vec<[u8; 32]> {
    let checksum = lfn::checksum(name83);
    let units: Vec<u16> = long_name.encode_utf16().collect();
    let count = units.len().div_ceil(13);

    let mut slots = Vec::with_capacity(count);
    for seq in (1..=count).rev() {
        let mut slot = [0u8; 32];
        slot[0] = seq as u8 | if seq == count { 0x40 } else { 0 };
        slot[11] = 0x0F;
        slot[13] = checksum;

        let start = (seq - 1) * 13;
        let mut padded = [0xFFFFu16; 13];
        for j in 0..13 {
            let idx = start + j;
            if idx < units.len() {
                padded[j] = units[idx];
            } else if idx == units.len() {
                padded[j] = 0x0000;
            }
        }
        for (j, unit) in padded.iter().enumerate() {
            let bytes = unit.to_le_bytes();
            let at = match j {
                0..=4 => 1 + j * 2,
                5..=10 => 14 + (j - 5) * 2,
                _ => 28 + (j - 11) * 2,
            };
            slot[at] = bytes[0];
            slot[at + 1] = bytes[1];
        }
        slots.push(slot);
    }
    slots
}

/// A fixture image written to a real file, removed on drop.
pub(crate) struct TempImage {
    pub path: PathBuf,
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub(crate) fn temp_image(bytes: &[u8]) -> TempImage {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "libfat32-test-{}-{n}.img",
        std::process::id()
    ));
    std::fs::write(&path, bytes).expect("fixture image must be writable");
    TempImage { path }
}
