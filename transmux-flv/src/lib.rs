//! # transmux-flv
//!
//! Push-based FLV demuxer for the transmux pipeline.
//!
//! The demuxer consumes borrowed byte slices fed by the I/O controller,
//! refuses records that are not fully buffered (the controller stashes the
//! remainder), and queues typed, timestamped samples into per-track batches
//! for the fMP4 remuxer.
//!
//! ## Supported input
//!
//! - FLV container per the Adobe specification (header, tag stream)
//! - Video: H.264/AVC (`avcC` sequence headers, length-prefixed NALUs)
//! - Audio: AAC (AudioSpecificConfig, raw frames) and MP3
//! - AMF0 `onMetaData` script tags, including the `keyframes` seek index
//!
//! ## Example
//!
//! ```no_run
//! use transmux_flv::{DemuxerConfig, FlvDemuxer};
//!
//! # fn feed(chunk: &[u8], sink: &mut impl transmux_flv::DemuxSink) {
//! let probe = FlvDemuxer::probe(chunk).expect("not an FLV stream");
//! let mut demuxer = FlvDemuxer::new(probe, DemuxerConfig::default());
//! let consumed = demuxer.parse_chunks(chunk, 0, sink).unwrap();
//! // bytes past `consumed` must be re-presented with the next chunk
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod amf;
pub mod audio;
pub mod demuxer;
pub mod error;
pub mod exp_golomb;
pub mod probe;
pub mod sps;
pub mod tag;
pub mod video;

pub use amf::AmfValue;
pub use audio::{AacConfig, AacPromotion, AudioTagHeader, Mp3Info};
pub use demuxer::{DemuxSink, DemuxerConfig, FlvDemuxer};
pub use error::{FlvError, Result};
pub use probe::{probe, FlvProbe, FLV_HEADER_SIZE};
pub use sps::{parse_sps, SpsInfo};
pub use tag::{TagHeader, TagType, TAG_HEADER_SIZE};
pub use video::{AvcConfig, AvcPacketType, FrameType};
