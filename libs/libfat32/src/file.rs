//! File reads along a cluster chain, honouring an offset/length window.

use std::io::{Read, Seek};

use crate::dir::DirectoryEntry;
use crate::error::Result;
use crate::volume::Volume;

impl<R: Read + Seek> Volume<R> {
    /// Read up to `buf.len()` bytes of `entry`'s payload starting at the
    /// given logical offset.
    ///
    /// The window is clamped to the file size: an offset at or past the end
    /// reads nothing. Returns the number of bytes written into `buf`. The
    /// chain ending early (EOC before the window is filled) also ends the
    /// read; only the bad-cluster sentinel is an error.
    pub fn read_at(&mut self, entry: &DirectoryEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = entry.size as u64;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let length = buf.len().min((size - offset) as usize);
        let mut cluster = entry.first_cluster();
        if cluster < 2 {
            return Ok(0);
        }

        let cluster_size = self.bytes_per_cluster() as u64;
        // Logical byte index at the start of the current cluster.
        let mut pos = 0u64;
        while pos + cluster_size <= offset {
            pos += cluster_size;
            match self.next_cluster(cluster)? {
                Some(next) => cluster = next,
                None => return Ok(0),
            }
        }

        let mut written = 0usize;
        loop {
            let start_in_cluster = (offset.max(pos) - pos) as usize;
            let available = cluster_size as usize - start_in_cluster;
            let to_read = available.min(length - written);

            let address = self.cluster_address(cluster) + start_in_cluster as u64;
            self.reader.seek(address)?;
            self.reader.read_bytes(&mut buf[written..written + to_read])?;

            written += to_read;
            pos += cluster_size;
            if written >= length {
                break;
            }
            match self.next_cluster(cluster)? {
                Some(next) => cluster = next,
                None => break,
            }
        }

        log::trace!(
            "read {} of {} requested bytes at offset {} from '{}'",
            written,
            buf.len(),
            offset,
            entry.name,
        );
        Ok(written)
    }

    /// Read an entire file. Successful iff the returned buffer holds exactly
    /// `entry.size` bytes.
    pub fn read_to_end(&mut self, entry: &DirectoryEntry) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; entry.size as usize];
        let n = self.read_at(entry, 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}
