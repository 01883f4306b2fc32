//! Time-window slicing for segmented message logs.
//!
//! `core` holds the log container (segments, record headers, topics, time);
//! `slice` holds the single streaming pass that copies a time window of one
//! log into a new one.

pub mod core;
pub mod slice;

pub use crate::core::{Error, LogReader, LogWriter, Record, Result, Timestamp};
pub use crate::slice::{slice, slice_with, ScanMode, SliceOptions, SliceStats, TimeWindow};
