//! Video tag parsing: AVC decoder configuration records and NALU framing.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::warn;

use crate::error::{FlvError, Result};
use crate::sps::{parse_sps, SpsInfo};

/// FLV CodecID for H.264/AVC, the only accepted value.
pub const CODEC_ID_AVC: u8 = 7;

/// Video frame type from the tag's high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Keyframe (type 1).
    Key,
    /// Inter frame (type 2).
    Inter,
    /// Disposable inter frame (H.263 only, type 3).
    DisposableInter,
    /// Generated keyframe (type 4).
    GeneratedKey,
    /// Video info/command frame (type 5).
    VideoInfo,
}

impl FrameType {
    /// Create from the raw 4-bit value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Key),
            2 => Some(Self::Inter),
            3 => Some(Self::DisposableInter),
            4 => Some(Self::GeneratedKey),
            5 => Some(Self::VideoInfo),
            _ => None,
        }
    }

    /// Whether this frame type is a keyframe.
    pub fn is_keyframe(self) -> bool {
        matches!(self, Self::Key | Self::GeneratedKey)
    }
}

/// AVC packet type following the frame/codec byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord.
    SequenceHeader,
    /// One or more NALUs.
    Nalu,
    /// End of sequence marker.
    EndOfSequence,
}

impl AvcPacketType {
    /// Create from the raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SequenceHeader),
            1 => Some(Self::Nalu),
            2 => Some(Self::EndOfSequence),
            _ => None,
        }
    }
}

/// Sign-extend the 24-bit composition time offset.
pub fn composition_time(cts_u24: u32) -> i32 {
    ((cts_u24 << 8) as i32) >> 8
}

/// Parsed AVCDecoderConfigurationRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct AvcConfig {
    /// AVCProfileIndication.
    pub avc_profile: u8,
    /// profile_compatibility.
    pub profile_compatibility: u8,
    /// AVCLevelIndication.
    pub avc_level: u8,
    /// `lengthSizeMinusOne + 1`; 3 or 4.
    pub nalu_length_size: u8,
    /// RFC 6381 codec string from the first SPS bytes (`avc1.PPCCLL`).
    pub codec: String,
    /// Parsed first SPS.
    pub sps_info: SpsInfo,
    /// The raw record, kept verbatim for the `avcC` box.
    pub raw: Vec<u8>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 7 {
            return Err(FlvError::InvalidAvcConfig("lack of data".into()));
        }

        let version = data[0];
        let avc_profile = data[1];
        let profile_compatibility = data[2];
        let avc_level = data[3];
        if version != 1 || avc_profile == 0 {
            return Err(FlvError::InvalidAvcConfig(format!(
                "configurationVersion {version}, AVCProfileIndication {avc_profile}"
            )));
        }

        let nalu_length_size = (data[4] & 0x03) + 1;
        if nalu_length_size != 3 && nalu_length_size != 4 {
            return Err(FlvError::InvalidAvcConfig(format!(
                "strange NaluLengthSizeMinusOne: {}",
                nalu_length_size - 1
            )));
        }

        let sps_count = data[5] & 0x1F;
        if sps_count == 0 {
            return Err(FlvError::InvalidAvcConfig("no SPS".into()));
        }
        if sps_count > 1 {
            warn!(sps_count, "Strange AVCDecoderConfigurationRecord: multiple SPS");
        }

        let mut cursor = Cursor::new(&data[6..]);
        let mut first_sps: Option<(String, SpsInfo)> = None;
        for i in 0..sps_count {
            let len = cursor
                .read_u16::<BigEndian>()
                .map_err(|_| FlvError::InvalidAvcConfig("truncated SPS length".into()))?
                as usize;
            if len == 0 {
                continue;
            }
            let start = 6 + cursor.position() as usize;
            let end = start + len;
            if end > data.len() {
                return Err(FlvError::InvalidAvcConfig("truncated SPS".into()));
            }
            cursor.set_position(cursor.position() + len as u64);

            // only the first SPS is interpreted
            if i != 0 {
                continue;
            }
            let sps = &data[start..end];
            let codec = format!(
                "avc1.{:02x}{:02x}{:02x}",
                sps[1], sps[2], sps[3]
            );
            first_sps = Some((codec, parse_sps(sps)?));
        }

        let (codec, sps_info) =
            first_sps.ok_or_else(|| FlvError::InvalidAvcConfig("no usable SPS".into()))?;

        let pps_offset = 6 + cursor.position() as usize;
        if pps_offset >= data.len() {
            return Err(FlvError::InvalidAvcConfig("truncated PPS count".into()));
        }
        let pps_count = data[pps_offset] & 0x1F;
        if pps_count == 0 {
            return Err(FlvError::InvalidAvcConfig("no PPS".into()));
        }
        if pps_count > 1 {
            warn!(pps_count, "Strange AVCDecoderConfigurationRecord: multiple PPS");
        }
        // PPS contents are not interpreted

        Ok(Self {
            avc_profile,
            profile_compatibility,
            avc_level,
            nalu_length_size,
            codec,
            sps_info,
            raw: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Baseline 3.1 640x360 SPS wrapped in an avcC with one PPS
    const AVCC: &[u8] = &[
        0x01, 0x42, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x14, 0x67, 0x42, 0x00, 0x1F, 0xF4, 0x05, 0x01,
        0x7F, 0xCB, 0x80, 0x88, 0x00, 0x00, 0x1F, 0x40, 0x00, 0x07, 0x53, 0x04, 0x20, 0x01, 0x00,
        0x04, 0x68, 0xCE, 0x3C, 0x80,
    ];

    #[test]
    fn test_parse_avcc() {
        let config = AvcConfig::parse(AVCC).unwrap();
        assert_eq!(config.avc_profile, 0x42);
        assert_eq!(config.avc_level, 0x1F);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.codec, "avc1.42001f");
        assert_eq!(config.sps_info.codec_size.width, 640);
        assert_eq!(config.sps_info.codec_size.height, 360);
        assert_eq!(config.raw, AVCC);
    }

    #[test]
    fn test_parse_avcc_rejects_bad_version() {
        let mut bad = AVCC.to_vec();
        bad[0] = 0;
        assert!(AvcConfig::parse(&bad).is_err());
    }

    #[test]
    fn test_parse_avcc_rejects_odd_nalu_length_size() {
        let mut bad = AVCC.to_vec();
        bad[4] = 0xFC; // lengthSizeMinusOne = 0 -> size 1
        assert!(matches!(
            AvcConfig::parse(&bad),
            Err(FlvError::InvalidAvcConfig(_))
        ));
    }

    #[test]
    fn test_parse_avcc_requires_sps_and_pps() {
        let mut bad = AVCC.to_vec();
        bad[5] = 0xE0; // SPS count 0
        assert!(AvcConfig::parse(&bad).is_err());

        let mut bad = AVCC.to_vec();
        let pps_count_offset = AVCC.len() - 7;
        bad[pps_count_offset] = 0;
        assert!(AvcConfig::parse(&bad).is_err());
    }

    #[test]
    fn test_composition_time_sign_extension() {
        assert_eq!(composition_time(0x000010), 16);
        assert_eq!(composition_time(0xFFFFF0), -16);
        assert_eq!(composition_time(0x800000), -8_388_608);
    }

    #[test]
    fn test_frame_type() {
        assert!(FrameType::from_u8(1).unwrap().is_keyframe());
        assert!(!FrameType::from_u8(2).unwrap().is_keyframe());
        assert!(FrameType::from_u8(0).is_none());
    }

    #[test]
    fn test_avc_packet_type() {
        assert_eq!(AvcPacketType::from_u8(0), Some(AvcPacketType::SequenceHeader));
        assert_eq!(AvcPacketType::from_u8(1), Some(AvcPacketType::Nalu));
        assert_eq!(AvcPacketType::from_u8(2), Some(AvcPacketType::EndOfSequence));
        assert_eq!(AvcPacketType::from_u8(3), None);
    }
}
