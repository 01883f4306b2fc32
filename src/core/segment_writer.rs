//! Single-segment append primitive.
//!
//! Writes `MessageHeader + payload` records into one memory-mapped `.q.tmp`
//! segment at a time. When the caller rolls, the current segment is sealed,
//! synced and published under its final name. Topic bookkeeping lives one
//! level up in `LogWriter`.

use std::path::PathBuf;

use crate::core::header::{record_len, MessageHeader, HEADER_SIZE, MAX_PAYLOAD_LEN, RECORD_ALIGN};
use crate::core::mmap::MmapFile;
use crate::core::segment_store::{
    prepare_segment_temp, publish_segment, seal_segment, segment_path, segment_temp_path,
    SEG_DATA_OFFSET,
};
use crate::core::{Error, Result};

pub struct SegmentWriter {
    /// Directory containing segments
    dir: PathBuf,
    /// Current segment ID
    segment_id: u64,
    /// Segment size in bytes
    segment_size: usize,
    /// Current write offset within segment
    write_offset: usize,
    /// Sequence number of the next record
    seq: u64,
    /// Current segment mmap, created lazily on first append
    mmap: Option<MmapFile>,
    segments_published: u64,
    has_records: bool,
}

impl SegmentWriter {
    pub fn new(dir: impl Into<PathBuf>, segment_id: u64, segment_size: usize) -> Self {
        Self {
            dir: dir.into(),
            segment_id,
            segment_size,
            write_offset: SEG_DATA_OFFSET,
            seq: 0,
            mmap: None,
            segments_published: 0,
            has_records: false,
        }
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn segments_published(&self) -> u64 {
        self.segments_published
    }

    pub fn has_records(&self) -> bool {
        self.has_records
    }

    /// Largest payload that fits in an otherwise empty segment.
    pub fn max_payload_len(&self) -> usize {
        let usable = self.segment_size.saturating_sub(SEG_DATA_OFFSET + HEADER_SIZE);
        // Round down to the record alignment so record_len(max) still fits.
        usable - usable % RECORD_ALIGN
    }

    /// True when a record of `record_len` bytes does not fit after the current offset.
    pub fn needs_roll(&self, record_len: usize) -> bool {
        self.write_offset + record_len > self.segment_size
    }

    /// Append a record to the current segment.
    ///
    /// The caller is responsible for rolling first when `needs_roll()` says so.
    ///
    /// # Errors
    ///
    /// - `Error::PayloadTooLarge`: payload can never fit in a segment
    /// - `Error::Corrupt`: the record would overrun the current segment
    /// - `Error::Io`: creating the segment file failed
    pub fn append(&mut self, type_id: u16, timestamp_ns: u64, payload: &[u8]) -> Result<()> {
        let payload_len = payload.len();
        if payload_len > MAX_PAYLOAD_LEN || payload_len > self.max_payload_len() {
            return Err(Error::PayloadTooLarge);
        }

        let len = record_len(payload_len);
        if self.needs_roll(len) {
            return Err(Error::Corrupt("append past end of segment"));
        }

        self.ensure_segment()?;

        let offset = self.write_offset;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or(Error::Corrupt("segment mmap missing"))?;

        // Payload first, then header, then the commit word last.
        if payload_len > 0 {
            mmap.range_mut(offset + HEADER_SIZE, payload_len)?
                .copy_from_slice(payload);
        }

        let checksum = MessageHeader::crc32(payload);
        let header = MessageHeader::new_uncommitted(self.seq, timestamp_ns, type_id, checksum);
        mmap.range_mut(offset, HEADER_SIZE)?
            .copy_from_slice(&header.to_bytes());

        let commit_len = MessageHeader::commit_len_for_payload(payload_len)?;
        let header_ptr = mmap.range_mut(offset, HEADER_SIZE)?.as_mut_ptr();
        MessageHeader::store_commit_len(header_ptr, commit_len);

        self.seq = self.seq.wrapping_add(1);
        self.write_offset += len;
        self.has_records = true;

        Ok(())
    }

    /// Publish the current segment (if it has records) and move to the next id.
    pub fn roll(&mut self) -> Result<()> {
        if self.has_records {
            self.seal_and_publish_current()?;
        } else {
            self.discard_empty_temp();
        }

        self.segment_id += 1;
        self.write_offset = SEG_DATA_OFFSET;
        self.has_records = false;
        self.mmap = None;

        Ok(())
    }

    /// Seal and publish the current segment. Empty segments are discarded.
    pub fn finish(&mut self) -> Result<()> {
        if !self.has_records {
            self.discard_empty_temp();
            return Ok(());
        }

        self.seal_and_publish_current()?;
        self.segment_id += 1;
        self.write_offset = SEG_DATA_OFFSET;
        self.has_records = false;
        Ok(())
    }

    fn seal_and_publish_current(&mut self) -> Result<()> {
        if let Some(mut mmap) = self.mmap.take() {
            seal_segment(&mut mmap)?;
            mmap.flush_sync()?;

            // Release the mapping before the rename.
            drop(mmap);

            let temp_path = segment_temp_path(&self.dir, self.segment_id);
            let final_path = segment_path(&self.dir, self.segment_id);
            publish_segment(&temp_path, &final_path)?;
            log::debug!("published segment {}", final_path.display());

            self.segments_published += 1;
        }

        Ok(())
    }

    fn discard_empty_temp(&mut self) {
        if let Some(mmap) = self.mmap.take() {
            drop(mmap);
            let _ = std::fs::remove_file(segment_temp_path(&self.dir, self.segment_id));
        }
    }

    fn ensure_segment(&mut self) -> Result<()> {
        if self.mmap.is_some() {
            return Ok(());
        }

        let mmap = prepare_segment_temp(&self.dir, self.segment_id, self.segment_size)?;
        self.write_offset = SEG_DATA_OFFSET;
        self.has_records = false;
        self.mmap = Some(mmap);
        Ok(())
    }
}
