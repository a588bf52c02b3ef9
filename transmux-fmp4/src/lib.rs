//! # transmux-fmp4
//!
//! ISO BMFF (fragmented MP4) generation for the transmux pipeline.
//!
//! [`boxes`] builds `ftyp`+`moov` initialization segments and `moof`+`mdat`
//! media segments by concatenation. [`Mp4Remuxer`] drives it: it drains the
//! demuxer's sample batches, corrects decode timestamps against a shared
//! base, interpolates durations, patches audio timestamp gaps with silent
//! AAC frames, and keeps per-track segment bookkeeping for seeking.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boxes;
pub mod remuxer;
pub mod silent;

pub use boxes::{generate_init_segment, generate_moof, mdat, mp4_box, FragmentHeader, Mp4Sample};
pub use remuxer::{Mp4Remuxer, RemuxerConfig, SegmentSink};
pub use silent::silent_frame;
