//! Segmented, memory-mapped message log.
//!
//! Records are written once, in order, into fixed-size segment files and
//! read back sequentially. This is the container the slice pipeline reads
//! from and writes to.

pub mod clock;
pub mod error;
pub mod header;
pub mod log;
pub mod mmap;
pub mod segment_store;
pub mod segment_writer;
pub mod time;
pub mod topic;

pub use clock::{initialize, Clock, QuantaClock};
pub use error::{Error, Result};
pub use log::{LogReader, LogWriter, Record};
pub use segment_store::DEFAULT_SEGMENT_SIZE;
pub use time::Timestamp;
pub use topic::TopicTable;
