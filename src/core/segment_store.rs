//! Segment file lifecycle management.
//!
//! Pure file operations for log segments, with no state of their own. The
//! writer creates segments as `.q.tmp`, seals them and publishes them with an
//! atomic rename; readers only ever see published `.q` files.
//!
//! ```text
//! {log_dir}/
//!   000000000.q      <- sealed, published
//!   000000001.q      <- sealed, published
//!   000000002.q.tmp  <- being written
//! ```

use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::core::header::HEADER_SIZE;
use crate::core::mmap::{MmapFile, MmapView};
use crate::core::{Error, Result};

/// Default segment size (128 MB)
pub const DEFAULT_SEGMENT_SIZE: usize = 128 * 1024 * 1024;

/// Size of segment header
pub const SEG_HEADER_SIZE: usize = 64;

/// Offset where data begins (after header)
pub const SEG_DATA_OFFSET: usize = 64;

/// Segment magic number ('SEG0')
pub const SEG_MAGIC: u32 = 0x53454730;

/// Segment version
pub const SEG_VERSION: u32 = 2;

/// Flag indicating segment is sealed (immutable)
pub const SEG_FLAG_SEALED: u32 = 1;

/// Segment header stored at the beginning of each segment file.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub magic: u32,
    pub version: u32,
    pub segment_id: u32,
    pub flags: u32,
    pub _pad: [u8; 48],
}

impl SegmentHeader {
    pub fn is_sealed(&self) -> bool {
        (self.flags & SEG_FLAG_SEALED) != 0
    }
}

/// Published segment name, e.g. `000000042.q`.
pub fn segment_filename(id: u64) -> String {
    format!("{id:09}.q")
}

/// In-progress segment name, e.g. `000000042.q.tmp`.
pub fn segment_temp_filename(id: u64) -> String {
    format!("{id:09}.q.tmp")
}

pub fn segment_path(root: &Path, id: u64) -> PathBuf {
    root.join(segment_filename(id))
}

pub fn segment_temp_path(root: &Path, id: u64) -> PathBuf {
    root.join(segment_temp_filename(id))
}

/// A file name that belongs to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentFile {
    Published(u64),
    Temp(u64),
}

impl SegmentFile {
    fn classify(name: &str) -> Option<Self> {
        if let Some(base) = name.strip_suffix(".q.tmp") {
            return parse_segment_id(base).map(SegmentFile::Temp);
        }
        name.strip_suffix(".q")
            .and_then(parse_segment_id)
            .map(SegmentFile::Published)
    }
}

/// Segment id of a published segment file name, or `None` for anything else.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    match SegmentFile::classify(name)? {
        SegmentFile::Published(id) => Some(id),
        SegmentFile::Temp(_) => None,
    }
}

fn parse_segment_id(base: &str) -> Option<u64> {
    // Exactly nine digits.
    if base.len() != 9 || !base.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    base.parse().ok()
}

/// Regular files in `dir` that belong to the log. A missing `dir` has none.
fn segment_files(dir: &Path) -> Result<Vec<(PathBuf, SegmentFile)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let kind = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(SegmentFile::classify);
        if let Some(kind) = kind {
            files.push((path, kind));
        }
    }
    Ok(files)
}

/// Published segment ids in `dir`, ascending. Temp files are invisible.
pub fn discover_segments(dir: &Path) -> Result<Vec<u64>> {
    let mut ids: Vec<u64> = segment_files(dir)?
        .into_iter()
        .filter_map(|(_, kind)| match kind {
            SegmentFile::Published(id) => Some(id),
            SegmentFile::Temp(_) => None,
        })
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

/// Delete every published and temp segment in `dir`, leaving other files.
///
/// Returns the number of files removed.
pub fn remove_segments(dir: &Path) -> Result<usize> {
    let files = segment_files(dir)?;
    for (path, _) in &files {
        std::fs::remove_file(path)?;
    }
    Ok(files.len())
}

/// Validate segment size is within acceptable bounds.
///
/// # Errors
///
/// - `Error::Unsupported`: Size too small or too large
pub fn validate_segment_size(segment_size: u64) -> Result<usize> {
    let size = usize::try_from(segment_size)
        .map_err(|_| Error::Unsupported("segment size exceeds addressable range"))?;

    let min_size = SEG_DATA_OFFSET + HEADER_SIZE; // Header + at least one message
    if size < min_size {
        return Err(Error::Unsupported("segment size too small"));
    }

    Ok(size)
}

/// Open a published segment for reading.
///
/// Validates the header and that it belongs to segment `id`.
pub fn open_segment(root: &Path, id: u64) -> Result<MmapView> {
    let path = segment_path(root, id);
    let mmap = MmapView::open(&path)?;

    let header = read_segment_header(mmap.as_slice())?;
    if u64::from(header.segment_id) != id {
        return Err(Error::Corrupt("segment id mismatch"));
    }

    Ok(mmap)
}

/// Create a segment as `.q.tmp`, to be published later via `publish_segment()`.
///
/// Removes any existing temp file first.
pub fn prepare_segment_temp(root: &Path, id: u64, segment_size: usize) -> Result<MmapFile> {
    let header_id = u32::try_from(id).map_err(|_| Error::Unsupported("segment id out of range"))?;
    let temp_path = segment_temp_path(root, id);
    let _ = std::fs::remove_file(&temp_path);

    let mut mmap = MmapFile::create(&temp_path, segment_size)?;
    write_segment_header(&mut mmap, header_id, 0)?;

    Ok(mmap)
}

/// Atomically publish a temp segment file to its final name.
///
/// On Linux, uses `renameat2(RENAME_NOREPLACE)` so an existing segment is
/// never overwritten.
///
/// # Errors
///
/// - `Error::Io(AlreadyExists)`: Final path already exists
/// - `Error::Io`: Rename failed
pub fn publish_segment(temp_path: &Path, final_path: &Path) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::ffi::OsStrExt;

        let temp_c = CString::new(temp_path.as_os_str().as_bytes())
            .map_err(|_| Error::Unsupported("segment temp path contains null byte"))?;
        let final_c = CString::new(final_path.as_os_str().as_bytes())
            .map_err(|_| Error::Unsupported("segment path contains null byte"))?;

        let rc = unsafe {
            libc::renameat2(
                libc::AT_FDCWD,
                temp_c.as_ptr(),
                libc::AT_FDCWD,
                final_c.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };

        if rc == 0 {
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ENOSYS)
            && err.raw_os_error() != Some(libc::EINVAL)
        {
            return Err(Error::Io(err));
        }
    }

    // Fallback for non-Linux or if renameat2 not available
    if final_path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "segment already exists",
        )));
    }

    std::fs::rename(temp_path, final_path)?;
    Ok(())
}

/// Parse the segment header at the start of a mapped segment.
pub fn read_segment_header(bytes: &[u8]) -> Result<SegmentHeader> {
    if bytes.len() < SEG_HEADER_SIZE {
        return Err(Error::Corrupt("segment too small for header"));
    }

    let word = |offset: usize| {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[offset..offset + 4]);
        u32::from_le_bytes(buf)
    };
    let magic = word(0);
    let version = word(4);
    let segment_id = word(8);
    let flags = word(12);

    if magic != SEG_MAGIC {
        return Err(Error::Corrupt("segment magic mismatch"));
    }
    if version != SEG_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok(SegmentHeader {
        magic,
        version,
        segment_id,
        flags,
        _pad: [0u8; 48],
    })
}

/// Write segment header to mmap.
pub fn write_segment_header(mmap: &mut MmapFile, segment_id: u32, flags: u32) -> Result<()> {
    if mmap.len() < SEG_HEADER_SIZE {
        return Err(Error::Corrupt("segment too small for header"));
    }

    let mut buf = [0u8; SEG_HEADER_SIZE];
    buf[0..4].copy_from_slice(&SEG_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&SEG_VERSION.to_le_bytes());
    buf[8..12].copy_from_slice(&segment_id.to_le_bytes());
    buf[12..16].copy_from_slice(&flags.to_le_bytes());

    mmap.range_mut(0, SEG_HEADER_SIZE)?.copy_from_slice(&buf);
    Ok(())
}

/// Seal a segment by setting the SEALED flag in its header.
///
/// Idempotent.
pub fn seal_segment(mmap: &mut MmapFile) -> Result<()> {
    let header = read_segment_header(mmap.as_slice())?;

    if header.is_sealed() {
        return Ok(());
    }

    write_segment_header(mmap, header.segment_id, header.flags | SEG_FLAG_SEALED)?;
    Ok(())
}
