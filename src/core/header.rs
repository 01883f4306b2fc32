use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::{Error, Result};

pub const HEADER_SIZE: usize = 64;
pub const RECORD_ALIGN: usize = 64;
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize - 1;

/// Type id of a padding record; the rest of its segment is unused.
pub const PAD_TYPE_ID: u16 = 0xFFFF;
/// Type id of the internal record that binds a topic id to its name.
pub const TOPIC_TYPE_ID: u16 = 0xFFFE;
/// Highest type id usable as a topic id.
pub const MAX_TOPIC_ID: u16 = TOPIC_TYPE_ID - 1;

pub const COMMIT_LEN_OFFSET: usize = 0;
pub const CHECKSUM_OFFSET: usize = 4;
pub const SEQ_OFFSET: usize = 8;
pub const TIMESTAMP_OFFSET: usize = 16;
pub const TYPE_ID_OFFSET: usize = 24;
pub const FLAGS_OFFSET: usize = 26;

#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Commit word:
    /// 0 = uncommitted
    /// >0 = committed payload length + 1
    pub commit_len: u32,
    pub checksum: u32,
    pub seq: u64,
    pub timestamp_ns: u64,
    pub type_id: u16,
    pub flags: u16,
    pub _pad: [u8; 36],
}

impl MessageHeader {
    pub fn new_uncommitted(seq: u64, timestamp_ns: u64, type_id: u16, checksum: u32) -> Self {
        Self {
            commit_len: 0,
            checksum,
            seq,
            timestamp_ns,
            type_id,
            flags: 0,
            _pad: [0u8; 36],
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[COMMIT_LEN_OFFSET..COMMIT_LEN_OFFSET + 4]
            .copy_from_slice(&self.commit_len.to_le_bytes());
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[SEQ_OFFSET..SEQ_OFFSET + 8].copy_from_slice(&self.seq.to_le_bytes());
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]
            .copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[TYPE_ID_OFFSET..TYPE_ID_OFFSET + 2].copy_from_slice(&self.type_id.to_le_bytes());
        buf[FLAGS_OFFSET..FLAGS_OFFSET + 2].copy_from_slice(&self.flags.to_le_bytes());
        buf[28..64].copy_from_slice(&self._pad);
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let commit_len = u32::from_le_bytes(read_array(bytes, COMMIT_LEN_OFFSET));
        let checksum = u32::from_le_bytes(read_array(bytes, CHECKSUM_OFFSET));
        let seq = u64::from_le_bytes(read_array(bytes, SEQ_OFFSET));
        let timestamp_ns = u64::from_le_bytes(read_array(bytes, TIMESTAMP_OFFSET));
        let type_id = u16::from_le_bytes(read_array(bytes, TYPE_ID_OFFSET));
        let flags = u16::from_le_bytes(read_array(bytes, FLAGS_OFFSET));
        let mut _pad = [0u8; 36];
        _pad.copy_from_slice(&bytes[28..64]);
        Ok(Self {
            commit_len,
            checksum,
            seq,
            timestamp_ns,
            type_id,
            flags,
            _pad,
        })
    }

    pub fn commit_len_for_payload(payload_len: usize) -> Result<u32> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }
        Ok((payload_len as u32) + 1)
    }

    pub fn payload_len_from_commit(commit_len: u32) -> Result<usize> {
        if commit_len == 0 {
            return Err(Error::Corrupt("commit length is zero"));
        }
        Ok((commit_len - 1) as usize)
    }

    pub fn store_commit_len(ptr: *mut u8, commit_len: u32) {
        // SAFETY: commit_len is at offset 0 and every record starts on a 64-byte boundary.
        let atomic = unsafe { &*(ptr as *const AtomicU32) };
        atomic.store(commit_len, Ordering::Release);
    }

    pub fn crc32(payload: &[u8]) -> u32 {
        use crc32fast::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(payload);
        hasher.finalize()
    }

    pub fn validate_crc(&self, payload: &[u8]) -> Result<()> {
        if Self::crc32(payload) == self.checksum {
            Ok(())
        } else {
            Err(Error::Corrupt("crc mismatch"))
        }
    }
}

/// Size of a record on disk: header plus payload, rounded up to `RECORD_ALIGN`.
#[inline]
pub fn record_len(payload_len: usize) -> usize {
    align_up(HEADER_SIZE + payload_len, RECORD_ALIGN)
}

#[inline]
fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

fn read_array<const N: usize>(bytes: &[u8; HEADER_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
