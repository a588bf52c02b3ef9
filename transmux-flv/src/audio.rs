//! Audio tag parsing: AAC AudioSpecificConfig and MP3 frame headers.
//!
//! The first byte of an FLV audio tag packs `format:4, rate:2, size:1,
//! type:1`. Only AAC (10) and MP3 (2) are accepted. For AAC the second byte
//! is the AACPacketType: 0 carries the AudioSpecificConfig, 1 a raw frame.

use tracing::warn;

use crate::error::{FlvError, Result};

/// FLV SoundFormat value for MP3.
pub const SOUND_FORMAT_MP3: u8 = 2;

/// FLV SoundFormat value for AAC.
pub const SOUND_FORMAT_AAC: u8 = 10;

/// FLV sound-rate table indexed by the 2-bit rate field.
pub const FLV_SOUND_RATE_TABLE: [u32; 4] = [5500, 11025, 22050, 44100];

/// MPEG-4 sampling frequencies indexed by the ASC sampling index.
pub const MPEG_SAMPLING_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const MPEG_AUDIO_V10_SAMPLE_RATES: [u32; 4] = [44100, 48000, 32000, 0];
const MPEG_AUDIO_V20_SAMPLE_RATES: [u32; 4] = [22050, 24000, 16000, 0];
const MPEG_AUDIO_V25_SAMPLE_RATES: [u32; 4] = [11025, 12000, 8000, 0];

const MPEG_AUDIO_L1_BIT_RATES: [u32; 16] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
];
const MPEG_AUDIO_L2_BIT_RATES: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
];
const MPEG_AUDIO_L3_BIT_RATES: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];

/// Parsed first byte of an audio tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    /// SoundFormat (2 = MP3, 10 = AAC).
    pub sound_format: u8,
    /// Sample rate from the FLV rate field (AAC streams override this from
    /// the ASC).
    pub sound_rate: u32,
    /// 0 = 8-bit, 1 = 16-bit.
    pub sound_size: u8,
    /// 0 = mono, 1 = stereo.
    pub sound_type: u8,
}

impl AudioTagHeader {
    /// Parse the packed spec byte.
    pub fn parse(spec: u8) -> Result<Self> {
        let sound_format = spec >> 4;
        if sound_format != SOUND_FORMAT_MP3 && sound_format != SOUND_FORMAT_AAC {
            return Err(FlvError::UnsupportedAudioCodec(sound_format));
        }
        let rate_index = (spec & 0x0C) >> 2;
        let sound_rate = FLV_SOUND_RATE_TABLE
            .get(rate_index as usize)
            .copied()
            .ok_or(FlvError::InvalidAudioSampleRate(rate_index))?;
        Ok(Self {
            sound_format,
            sound_rate,
            sound_size: (spec & 0x02) >> 1,
            sound_type: spec & 0x01,
        })
    }
}

/// Codec-promotion policy applied while decoding the ASC.
///
/// Browser players choose between these based on a user-agent probe; here
/// the embedder picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AacPromotion {
    /// Keep the declared object type.
    #[default]
    None,
    /// Always report LC-AAC.
    AlwaysLc,
    /// Promote to HE-AAC, except for mono LC streams.
    PreferHe,
}

/// Decoded AudioSpecificConfig plus the canonical config blob.
#[derive(Debug, Clone, PartialEq)]
pub struct AacConfig {
    /// Canonical 2- or 4-byte AudioSpecificConfig.
    pub config: Vec<u8>,
    /// Sampling rate from the (original) sampling index.
    pub sampling_rate: u32,
    /// Channel configuration.
    pub channel_count: u8,
    /// Codec string after promotion, `mp4a.40.N`.
    pub codec: String,
    /// Codec string for the declared object type.
    pub original_codec: String,
}

/// Decode an AudioSpecificConfig per ISO 14496-3, applying the promotion
/// policy and rebuilding a canonical config blob.
pub fn parse_audio_specific_config(data: &[u8], promotion: AacPromotion) -> Result<AacConfig> {
    if data.len() < 2 {
        return Err(FlvError::InvalidAmf("AudioSpecificConfig too short".into()));
    }

    let mut audio_object_type = data[0] >> 3;
    let original_audio_object_type = audio_object_type;
    let sampling_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);
    if sampling_index as usize >= MPEG_SAMPLING_RATES.len() {
        return Err(FlvError::InvalidSamplingIndex(sampling_index));
    }
    let sampling_rate = MPEG_SAMPLING_RATES[sampling_index as usize];
    let channel_config = (data[1] & 0x78) >> 3;
    if channel_config > 7 {
        return Err(FlvError::InvalidChannelConfig(channel_config));
    }

    // HE-AAC carries an extension sampling index after the channel config
    let mut extension_sampling_index = if audio_object_type == 5 {
        if data.len() < 3 {
            return Err(FlvError::InvalidAmf(
                "HE AudioSpecificConfig too short".into(),
            ));
        }
        ((data[1] & 0x07) << 1) | (data[2] >> 7)
    } else {
        sampling_index
    };

    match promotion {
        AacPromotion::AlwaysLc => {
            audio_object_type = 2;
            extension_sampling_index = sampling_index;
        }
        AacPromotion::PreferHe => {
            audio_object_type = 5;
            extension_sampling_index = sampling_index;
            if sampling_index >= 6 {
                // the HE output rate doubles; point the extension at it
                extension_sampling_index = sampling_index - 3;
            } else if channel_config == 1 {
                // mono stays LC
                audio_object_type = 2;
                extension_sampling_index = sampling_index;
            }
        }
        AacPromotion::None => {}
    }

    let config = if audio_object_type == 5 {
        vec![
            (audio_object_type << 3) | (sampling_index >> 1),
            (sampling_index << 7) | (channel_config << 3) | (extension_sampling_index >> 1),
            (extension_sampling_index << 7) | 0x08,
            0,
        ]
    } else {
        vec![
            (audio_object_type << 3) | (sampling_index >> 1),
            (sampling_index << 7) | (channel_config << 3),
        ]
    };

    Ok(AacConfig {
        config,
        sampling_rate,
        channel_count: channel_config,
        codec: format!("mp4a.40.{audio_object_type}"),
        original_codec: format!("mp4a.40.{original_audio_object_type}"),
    })
}

/// Decoded MPEG audio frame header.
#[derive(Debug, Clone, PartialEq)]
pub struct Mp3Info {
    /// Bit rate in kbps.
    pub bit_rate: u32,
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
    /// Channel count (1 or 2).
    pub channel_count: u8,
    /// Always "mp3".
    pub codec: String,
}

/// Decode the 4-byte MPEG audio frame header at the start of `data`.
///
/// Returns `None` (after a warning) for unusable headers; the demuxer keeps
/// parsing in that case.
pub fn parse_mp3_header(data: &[u8]) -> Option<Mp3Info> {
    if data.len() < 4 {
        warn!("Invalid MP3 packet, header missing!");
        return None;
    }
    if data[0] != 0xFF || (data[1] & 0xE0) != 0xE0 {
        warn!("Invalid MP3 frame sync word");
        return None;
    }

    let version = (data[1] >> 3) & 0x03; // 0 = v2.5, 2 = v2, 3 = v1
    let layer = (data[1] & 0x06) >> 1; // 1 = L3, 2 = L2, 3 = L1
    let bitrate_index = (data[2] & 0xF0) >> 4;
    let sampling_index = ((data[2] & 0x0C) >> 2) as usize;
    let channel_mode = (data[3] >> 6) & 0x03;

    let sample_rates = match version {
        0 => MPEG_AUDIO_V25_SAMPLE_RATES,
        2 => MPEG_AUDIO_V20_SAMPLE_RATES,
        3 => MPEG_AUDIO_V10_SAMPLE_RATES,
        _ => {
            warn!(version, "Reserved MPEG version in MP3 header");
            return None;
        }
    };
    let sampling_rate = sample_rates[sampling_index];
    if sampling_rate == 0 {
        warn!("Reserved MPEG sampling frequency in MP3 header");
        return None;
    }

    let bit_rate = match layer {
        1 => MPEG_AUDIO_L3_BIT_RATES[bitrate_index as usize],
        2 => MPEG_AUDIO_L2_BIT_RATES[bitrate_index as usize],
        3 => MPEG_AUDIO_L1_BIT_RATES[bitrate_index as usize],
        _ => {
            warn!(layer, "Reserved MPEG layer in MP3 header");
            return None;
        }
    };

    Some(Mp3Info {
        bit_rate,
        sampling_rate,
        channel_count: if channel_mode == 3 { 1 } else { 2 },
        codec: "mp3".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_tag_header() {
        // AAC, 44.1 kHz, 16-bit, stereo: 0xAF
        let header = AudioTagHeader::parse(0xAF).unwrap();
        assert_eq!(header.sound_format, SOUND_FORMAT_AAC);
        assert_eq!(header.sound_rate, 44100);
        assert_eq!(header.sound_size, 1);
        assert_eq!(header.sound_type, 1);

        // MP3, 22.05 kHz, 16-bit, mono: 0x2A
        let header = AudioTagHeader::parse(0x2A).unwrap();
        assert_eq!(header.sound_format, SOUND_FORMAT_MP3);
        assert_eq!(header.sound_rate, 22050);
        assert_eq!(header.sound_type, 0);
    }

    #[test]
    fn test_audio_tag_header_rejects_codec() {
        // Speex is format 11
        assert!(matches!(
            AudioTagHeader::parse(0xBF),
            Err(FlvError::UnsupportedAudioCodec(11))
        ));
    }

    #[test]
    fn test_asc_lc_no_promotion() {
        // objectType=2, samplingIndex=4 (44100), channels=2: 0x12 0x10
        let config = parse_audio_specific_config(&[0x12, 0x10], AacPromotion::None).unwrap();
        assert_eq!(config.codec, "mp4a.40.2");
        assert_eq!(config.original_codec, "mp4a.40.2");
        assert_eq!(config.sampling_rate, 44100);
        assert_eq!(config.channel_count, 2);
        assert_eq!(config.config, vec![0x12, 0x10]);
    }

    #[test]
    fn test_asc_he_promotion_stereo() {
        let config = parse_audio_specific_config(&[0x12, 0x10], AacPromotion::PreferHe).unwrap();
        assert_eq!(config.codec, "mp4a.40.5");
        assert_eq!(config.original_codec, "mp4a.40.2");
        assert_eq!(config.config.len(), 4);
        // extension sampling index equals the original for low rates
        assert_eq!(config.config[0], (5 << 3) | (4 >> 1));
    }

    #[test]
    fn test_asc_he_promotion_skips_mono() {
        // samplingIndex=4, channels=1: 0x12 0x08
        let config = parse_audio_specific_config(&[0x12, 0x08], AacPromotion::PreferHe).unwrap();
        assert_eq!(config.codec, "mp4a.40.2");
        assert_eq!(config.config.len(), 2);
    }

    #[test]
    fn test_asc_he_promotion_high_sampling_index() {
        // samplingIndex=6 (24000), channels=2: objectType=2
        // 0x13 0x10: 00010 011 0 0010 000
        let config = parse_audio_specific_config(&[0x13, 0x10], AacPromotion::PreferHe).unwrap();
        assert_eq!(config.codec, "mp4a.40.5");
        assert_eq!(config.sampling_rate, 24000);
        // extension index points at the doubled output rate (6 - 3 = 3)
        assert_eq!(config.config[1] & 0x07, 3 >> 1);
    }

    #[test]
    fn test_asc_always_lc() {
        let config = parse_audio_specific_config(&[0x2B, 0x10], AacPromotion::AlwaysLc).unwrap();
        assert_eq!(config.codec, "mp4a.40.2");
        assert_eq!(config.original_codec, "mp4a.40.5");
    }

    #[test]
    fn test_asc_invalid() {
        assert!(parse_audio_specific_config(&[0x12], AacPromotion::None).is_err());
        // sampling index 13 is reserved: 00010 110 1...
        assert!(matches!(
            parse_audio_specific_config(&[0x16, 0x90], AacPromotion::None),
            Err(FlvError::InvalidSamplingIndex(13))
        ));
    }

    #[test]
    fn test_mp3_header_44100_layer3() {
        // MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo
        let header = [0xFF, 0xFB, 0x90, 0x00];
        let info = parse_mp3_header(&header).unwrap();
        assert_eq!(info.sampling_rate, 44100);
        assert_eq!(info.bit_rate, 128);
        assert_eq!(info.channel_count, 2);
        assert_eq!(info.codec, "mp3");
    }

    #[test]
    fn test_mp3_header_mono() {
        // channel mode 3 (mono)
        let header = [0xFF, 0xFB, 0x90, 0xC0];
        let info = parse_mp3_header(&header).unwrap();
        assert_eq!(info.channel_count, 1);
    }

    #[test]
    fn test_mp3_header_invalid() {
        assert!(parse_mp3_header(&[0xFF, 0xFB]).is_none());
        assert!(parse_mp3_header(&[0xFE, 0xFB, 0x90, 0x00]).is_none());
    }
}
