//! Append-only, topic-tagged message log.
//!
//! A log is a directory of fixed-size segments written by `SegmentWriter`:
//! ```text
//! {log_dir}/
//!   000000000.q      <- Segment 0
//!   000000001.q      <- Segment 1
//! ```
//!
//! Each data record stores a topic id, a nanosecond timestamp and an opaque
//! payload. Topic names are declared in-band (see `core::topic`), so a log is
//! self-describing and segments never need a side file.
//!
//! # Example
//!
//! ```no_run
//! use logslice::core::{LogReader, LogWriter, Timestamp};
//!
//! let mut log = LogWriter::create("./recording", 0)?;
//! log.write("/imu", Timestamp::from_secs(1), b"sample")?;
//! log.finish()?;
//!
//! let mut reader = LogReader::open("./recording")?;
//! while let Some(record) = reader.next()? {
//!     println!("{} {} {} bytes", record.timestamp, record.topic, record.payload.len());
//! }
//! # Ok::<(), logslice::core::Error>(())
//! ```

use std::path::{Path, PathBuf};

use crate::core::header::{
    record_len, MessageHeader, HEADER_SIZE, MAX_TOPIC_ID, PAD_TYPE_ID, TOPIC_TYPE_ID,
};
use crate::core::mmap::MmapView;
use crate::core::segment_store::{
    discover_segments, open_segment, remove_segments, segment_path, validate_segment_size,
    DEFAULT_SEGMENT_SIZE, SEG_DATA_OFFSET,
};
use crate::core::segment_writer::SegmentWriter;
use crate::core::time::Timestamp;
use crate::core::topic::{decode_declaration, encode_declaration, TopicTable};
use crate::core::{Error, Result};

/// One record as stored in a log. Borrowed from the reader's mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Position of the record within its log (declarations included).
    pub seq: u64,
    pub topic: &'a str,
    pub timestamp: Timestamp,
    pub payload: &'a [u8],
}

/// Writer for a fresh log. Records are appended in call order.
///
/// Dropping an unfinished writer publishes what has been written so far.
pub struct LogWriter {
    dir: PathBuf,
    writer: SegmentWriter,
    topics: TopicTable,
    records_written: u64,
    finished: bool,
}

impl LogWriter {
    /// Create a log at `dir`, replacing any log already there.
    ///
    /// All segment files in `dir` are removed first; other files are kept.
    /// A `segment_size` of 0 selects `DEFAULT_SEGMENT_SIZE`.
    ///
    /// # Errors
    ///
    /// - `Error::Io`: the directory cannot be created or cleared
    /// - `Error::Unsupported`: segment size too small
    pub fn create(dir: impl AsRef<Path>, segment_size: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let segment_size = if segment_size == 0 {
            DEFAULT_SEGMENT_SIZE
        } else {
            validate_segment_size(segment_size as u64)?
        };

        std::fs::create_dir_all(&dir)?;
        let removed = remove_segments(&dir)?;
        if removed > 0 {
            log::info!(
                "replaced existing log at {} ({} segment files removed)",
                dir.display(),
                removed
            );
        }

        Ok(Self {
            writer: SegmentWriter::new(&dir, 0, segment_size),
            dir,
            topics: TopicTable::new(),
            records_written: 0,
            finished: false,
        })
    }

    pub fn segment_size(&self) -> usize {
        self.writer.segment_size()
    }

    /// Number of data records written (topic declarations excluded).
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Number of segments sealed and published so far.
    pub fn segments_written(&self) -> u64 {
        self.writer.segments_published()
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// - `Error::PayloadTooLarge`: the payload cannot fit in one segment
    /// - `Error::InvalidTopic`: empty topic name
    /// - `Error::TooManyTopics`: a new topic would exceed the id space
    /// - `Error::WriterFinished`: `finish` was already called
    /// - `Error::Io`: segment I/O failed
    pub fn write(&mut self, topic: &str, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        if self.finished {
            return Err(Error::WriterFinished);
        }
        if payload.len() > self.writer.max_payload_len() {
            return Err(Error::PayloadTooLarge);
        }

        let topic_id = match self.topics.id_of(topic) {
            Some(id) => id,
            None => self.declare_topic(topic, timestamp)?,
        };

        self.append(topic_id, timestamp, payload)?;
        self.records_written += 1;
        Ok(())
    }

    /// Seal, sync and publish the open segment. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.finish()
    }

    fn declare_topic(&mut self, topic: &str, timestamp: Timestamp) -> Result<u16> {
        if topic.is_empty() {
            return Err(Error::InvalidTopic(topic.to_string()));
        }
        let id = u16::try_from(self.topics.len())
            .ok()
            .filter(|id| *id <= MAX_TOPIC_ID)
            .ok_or(Error::TooManyTopics)?;
        let declaration = encode_declaration(id, topic);
        if declaration.len() > self.writer.max_payload_len() {
            return Err(Error::PayloadTooLarge);
        }
        // Register only once the declaration is on disk.
        self.append(TOPIC_TYPE_ID, timestamp, &declaration)?;
        self.topics.register(topic)
    }

    fn append(&mut self, type_id: u16, timestamp: Timestamp, payload: &[u8]) -> Result<()> {
        if self.writer.needs_roll(record_len(payload.len())) {
            self.writer.roll()?;
        }
        self.writer.append(type_id, timestamp.as_nanos(), payload)
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.finish() {
            log::warn!("failed to finish log {}: {err}", self.dir.display());
        }
    }
}

/// Location of a data record inside the current segment.
#[derive(Clone, Copy)]
struct RecordRef {
    seq: u64,
    timestamp_ns: u64,
    topic_id: u16,
    payload_offset: usize,
    payload_len: usize,
}

/// Sequential reader over the published segments of a log.
pub struct LogReader {
    dir: PathBuf,
    segments: Vec<u64>,
    current_segment_idx: usize,
    current: Option<MmapView>,
    offset: usize,
    topics: TopicTable,
}

impl LogReader {
    /// Open the log at `dir` for reading.
    ///
    /// # Errors
    ///
    /// - `Error::Io(NotFound)`: `dir` does not exist
    /// - `Error::Io(InvalidInput)`: `dir` is not a directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("log directory not found: {}", dir.display()),
            )));
        }
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a log directory: {}", dir.display()),
            )));
        }

        let segments = discover_segments(&dir)?;

        Ok(Self {
            dir,
            segments,
            current_segment_idx: 0,
            current: None,
            offset: SEG_DATA_OFFSET,
            topics: TopicTable::new(),
        })
    }

    /// Published segment ids, in read order.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Size of the log's segments, or `None` for an empty log.
    pub fn segment_size(&self) -> Result<Option<usize>> {
        let Some(&first) = self.segments.first() else {
            return Ok(None);
        };
        let len = std::fs::metadata(segment_path(&self.dir, first))?.len();
        Ok(Some(validate_segment_size(len)?))
    }

    /// Topics declared so far during the scan.
    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// Read the next data record.
    ///
    /// Returns `None` at the end of the last segment.
    ///
    /// # Errors
    ///
    /// - `Error::Corrupt`: checksum mismatch, truncated record, undeclared topic
    /// - `Error::Io`: a segment could not be mapped
    pub fn next(&mut self) -> Result<Option<Record<'_>>> {
        let Some(found) = self.advance()? else {
            return Ok(None);
        };

        let mmap = self
            .current
            .as_ref()
            .ok_or(Error::Corrupt("segment mmap missing"))?;
        let payload = mmap.range(found.payload_offset, found.payload_len)?;
        let topic = self
            .topics
            .name(found.topic_id)
            .ok_or(Error::Corrupt("record references undeclared topic"))?;

        Ok(Some(Record {
            seq: found.seq,
            topic,
            timestamp: Timestamp::from_nanos(found.timestamp_ns),
            payload,
        }))
    }

    /// Move past declarations and segment ends to the next data record.
    fn advance(&mut self) -> Result<Option<RecordRef>> {
        loop {
            let Some(mmap) = self.current.as_ref() else {
                if !self.load_next_segment()? {
                    return Ok(None);
                }
                continue;
            };

            let start = self.offset;
            if start + HEADER_SIZE > mmap.len() {
                self.end_segment();
                continue;
            }

            let mut header_buf = [0u8; HEADER_SIZE];
            header_buf.copy_from_slice(mmap.range(start, HEADER_SIZE)?);
            let header = MessageHeader::from_bytes(&header_buf)?;

            // Zero commit word or padding marks the unused tail of a segment.
            if header.commit_len == 0 || header.type_id == PAD_TYPE_ID {
                self.end_segment();
                continue;
            }

            let payload_len = MessageHeader::payload_len_from_commit(header.commit_len)?;
            let len = record_len(payload_len);
            if start + len > mmap.len() {
                return Err(Error::Corrupt("record overruns segment"));
            }

            let payload_offset = start + HEADER_SIZE;
            let payload = mmap.range(payload_offset, payload_len)?;
            header.validate_crc(payload)?;
            self.offset = start + len;

            if header.type_id == TOPIC_TYPE_ID {
                let (id, name) = decode_declaration(payload)?;
                self.topics.declare(id, name)?;
                continue;
            }

            return Ok(Some(RecordRef {
                seq: header.seq,
                timestamp_ns: header.timestamp_ns,
                topic_id: header.type_id,
                payload_offset,
                payload_len,
            }));
        }
    }

    fn end_segment(&mut self) {
        self.current = None;
        self.current_segment_idx += 1;
        self.offset = SEG_DATA_OFFSET;
    }

    fn load_next_segment(&mut self) -> Result<bool> {
        let Some(&segment_id) = self.segments.get(self.current_segment_idx) else {
            return Ok(false);
        };

        self.current = Some(open_segment(&self.dir, segment_id)?);
        self.offset = SEG_DATA_OFFSET;
        Ok(true)
    }
}
