use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::core::{Error, Result};

/// Writable mapping of a whole file, used for the segment being appended.
pub struct MmapFile {
    file: File,
    map: MmapMut,
    len: usize,
}

impl MmapFile {
    pub fn create(path: &Path, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::Unsupported("mmap length must be non-zero"));
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        Ok(Self { file, map, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn range_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let end = offset.checked_add(len).ok_or(Error::Corrupt("range overflow"))?;
        if end > self.len {
            return Err(Error::Corrupt("range out of bounds"));
        }
        Ok(&mut self.map[offset..end])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn flush_sync(&self) -> Result<()> {
        self.map.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Read-only mapping of a published segment.
pub struct MmapView {
    map: Mmap,
}

impl MmapView {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(Error::Unsupported("mmap length must be non-zero"));
        }
        let map = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(Self { map })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(Error::Corrupt("range overflow"))?;
        if end > self.map.len() {
            return Err(Error::Corrupt("range out of bounds"));
        }
        Ok(&self.map[offset..end])
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
