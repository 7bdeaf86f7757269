//! Typed little-endian reads over a seekable byte source.
//!
//! Every multi-byte integer on a FAT32 volume is little-endian; the reader
//! converts to host order on every read. All structure decoding goes through
//! this wrapper so that no code relies on in-memory struct layout.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::Result;

/// A thin wrapper over a seekable byte source.
#[derive(Debug)]
pub struct ImageReader<R> {
    inner: R,
}

impl<R: Read + Seek> ImageReader<R> {
    pub fn new(inner: R) -> Self {
        ImageReader { inner }
    }

    /// Seek to an absolute byte offset.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Skip `count` bytes forward from the current position.
    pub fn skip(&mut self, count: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(count))?;
        Ok(())
    }

    /// Current absolute position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    /// Fill `buf` exactly; a short read is an error.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }
}
