//! FLV demuxer error types.

use thiserror::Error;
use transmux_core::DemuxError;

/// FLV parsing errors.
///
/// The conversion into [`transmux_core::Error`] classifies each variant into
/// the consumer-facing taxonomy (format / codec-unsupported / internal).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlvError {
    /// The stream does not start with a valid FLV header.
    #[error("Invalid FLV header")]
    InvalidHeader,

    /// An audio SoundFormat other than MP3 or AAC.
    #[error("Unsupported audio codec idx: {0}")]
    UnsupportedAudioCodec(u8),

    /// A video CodecID other than AVC.
    #[error("Unsupported codec in video frame: {0}")]
    UnsupportedVideoCodec(u8),

    /// Audio sample rate index outside the FLV table.
    #[error("Invalid audio sample rate idx: {0}")]
    InvalidAudioSampleRate(u8),

    /// AAC sampling frequency index outside the MPEG table.
    #[error("AAC invalid sampling frequency index: {0}")]
    InvalidSamplingIndex(u8),

    /// AAC channel configuration outside 0..=7.
    #[error("AAC invalid channel configuration: {0}")]
    InvalidChannelConfig(u8),

    /// Malformed AVCDecoderConfigurationRecord.
    #[error("Invalid AVCDecoderConfigurationRecord: {0}")]
    InvalidAvcConfig(String),

    /// AVCPacketType outside the defined 0..=2 set.
    #[error("Invalid video packet type: {0}")]
    InvalidAvcPacketType(u8),

    /// Malformed SPS.
    #[error("Invalid SPS: {0}")]
    InvalidSps(String),

    /// Malformed AMF script data.
    #[error("Invalid AMF data: {0}")]
    InvalidAmf(String),

    /// A record spans past the validated slice; indicates a demuxer bug
    /// because the tag loop only enters fully-buffered records.
    #[error("Unexpected end of tag data at offset {offset}")]
    UnexpectedEnd {
        /// Offset within the tag body.
        offset: usize,
    },
}

impl From<FlvError> for transmux_core::Error {
    fn from(err: FlvError) -> Self {
        let demux = match &err {
            FlvError::UnsupportedAudioCodec(_) | FlvError::UnsupportedVideoCodec(_) => {
                DemuxError::CodecUnsupported(err.to_string())
            }
            FlvError::UnexpectedEnd { .. } => DemuxError::Internal(err.to_string()),
            _ => DemuxError::Format(err.to_string()),
        };
        transmux_core::Error::Demux(demux)
    }
}

/// Result type for FLV parsing.
pub type Result<T> = std::result::Result<T, FlvError>;
