//! Pipeline configuration and media source description.

use serde::{Deserialize, Serialize};

/// How byte-range seeks are encoded onto the upstream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekType {
    /// HTTP `Range:` request header.
    #[default]
    Range,
    /// URL query parameters (names configurable).
    Param,
    /// A custom handler injected by the embedder.
    Custom,
}

/// Description of the stream to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDataSource {
    /// Stream URL.
    pub url: String,
    /// Container kind; only "flv" is supported.
    #[serde(default = "MediaDataSource::default_kind")]
    pub kind: String,
    /// Whether this is a live stream (disables seek and segment bookkeeping).
    #[serde(default)]
    pub is_live: bool,
    /// CORS mode hint for the transport.
    #[serde(default)]
    pub cors: bool,
    /// Credentials hint for the transport.
    #[serde(default)]
    pub with_credentials: bool,
    /// Audio-presence override; `None` defers to the FLV header flags.
    #[serde(default)]
    pub has_audio: Option<bool>,
    /// Video-presence override; `None` defers to the FLV header flags.
    #[serde(default)]
    pub has_video: Option<bool>,
    /// Total file size in bytes, when known upfront.
    #[serde(default)]
    pub filesize: Option<u64>,
    /// Total duration in milliseconds, when known upfront.
    #[serde(default)]
    pub duration: Option<u64>,
}

impl MediaDataSource {
    fn default_kind() -> String {
        "flv".to_string()
    }

    /// Create a VOD source for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: Self::default_kind(),
            is_live: false,
            cors: false,
            with_credentials: false,
            has_audio: None,
            has_video: None,
            filesize: None,
            duration: None,
        }
    }

    /// Create a live source for a URL.
    pub fn live(url: impl Into<String>) -> Self {
        Self {
            is_live: true,
            ..Self::new(url)
        }
    }

    /// Set the known file size.
    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }

    /// Override audio presence.
    pub fn with_has_audio(mut self, has_audio: bool) -> Self {
        self.has_audio = Some(has_audio);
        self
    }

    /// Override video presence.
    pub fn with_has_video(mut self, has_video: bool) -> Self {
        self.has_video = Some(has_video);
        self
    }
}

/// Pipeline configuration.
///
/// The platform-workaround switches (`force_first_idr`,
/// `fill_silent_after_seek`, `prefer_he_aac`, `always_lc_aac`) replace the
/// user-agent sniffing of browser players; embedders that know their target
/// runtime turn them on explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmuxConfig {
    /// Enable the I/O controller's stash buffer.
    pub enable_stash_buffer: bool,
    /// Initial stash size in bytes (pre-ladder); `None` uses the default.
    pub stash_initial_size: Option<usize>,
    /// Live-stream mode.
    pub is_live: bool,

    /// Pause loading when enough is buffered.
    pub lazy_load: bool,
    /// Buffered seconds beyond which loading pauses.
    pub lazy_load_max_duration: f64,
    /// Buffered seconds at which loading resumes.
    pub lazy_load_recover_duration: f64,
    /// Defer loading until the media source is open.
    pub defer_load_after_source_open: bool,

    /// Seek request encoding.
    pub seek_type: SeekType,
    /// Query parameter carrying the range start (param seek).
    pub seek_param_start: String,
    /// Query parameter carrying the range end (param seek).
    pub seek_param_end: String,
    /// Send `Range: bytes=0-` on the initial full request (range seek).
    pub range_load_zero_start: bool,
    /// Seek precisely to the requested time instead of the keyframe.
    pub accurate_seek: bool,
    /// Reuse the redirected URL for subsequent range requests.
    pub reuse_redirected_url: bool,

    /// Insert silent AAC frames over large audio timestamp gaps.
    pub fix_audio_timestamp_gap: bool,
    /// Force the first sample of each video segment to be flagged IDR.
    pub force_first_idr: bool,
    /// Prepend a silent audio frame after keyframe seeks so audio and video
    /// segments begin together.
    pub fill_silent_after_seek: bool,
    /// Promote AAC object type to HE-AAC where the promotion rules allow.
    pub prefer_he_aac: bool,
    /// Always report LC-AAC regardless of the declared object type.
    pub always_lc_aac: bool,
    /// Emit MP3 audio as a raw MPEG stream (`audio/mpeg`) instead of
    /// boxed fMP4 segments.
    pub mp3_use_mpeg_audio: bool,

    /// Reference frame rate substituted for unusable stream rates.
    pub reference_frame_rate: f64,
}

impl Default for TransmuxConfig {
    fn default() -> Self {
        Self {
            enable_stash_buffer: true,
            stash_initial_size: None,
            is_live: false,
            lazy_load: true,
            lazy_load_max_duration: 3.0 * 60.0,
            lazy_load_recover_duration: 30.0,
            defer_load_after_source_open: true,
            seek_type: SeekType::Range,
            seek_param_start: "bstart".to_string(),
            seek_param_end: "bend".to_string(),
            range_load_zero_start: false,
            accurate_seek: false,
            reuse_redirected_url: false,
            fix_audio_timestamp_gap: true,
            force_first_idr: false,
            fill_silent_after_seek: false,
            prefer_he_aac: false,
            always_lc_aac: false,
            mp3_use_mpeg_audio: false,
            reference_frame_rate: 23.976,
        }
    }
}

impl TransmuxConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration tuned for live streams.
    pub fn live() -> Self {
        Self {
            is_live: true,
            lazy_load: false,
            ..Self::default()
        }
    }

    /// Set live mode.
    pub fn with_is_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    /// Enable or disable the stash buffer.
    pub fn with_stash_buffer(mut self, enabled: bool) -> Self {
        self.enable_stash_buffer = enabled;
        self
    }

    /// Set the initial stash size in bytes.
    pub fn with_stash_initial_size(mut self, bytes: usize) -> Self {
        self.stash_initial_size = Some(bytes);
        self
    }

    /// Set the seek encoding.
    pub fn with_seek_type(mut self, seek_type: SeekType) -> Self {
        self.seek_type = seek_type;
        self
    }

    /// Enable or disable silent-frame gap filling.
    pub fn with_fix_audio_timestamp_gap(mut self, enabled: bool) -> Self {
        self.fix_audio_timestamp_gap = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransmuxConfig::default();
        assert!(config.enable_stash_buffer);
        assert!(config.fix_audio_timestamp_gap);
        assert!(!config.is_live);
        assert_eq!(config.seek_type, SeekType::Range);
        assert_eq!(config.seek_param_start, "bstart");
        assert!((config.reference_frame_rate - 23.976).abs() < 1e-9);
    }

    #[test]
    fn test_live_preset() {
        let config = TransmuxConfig::live();
        assert!(config.is_live);
        assert!(!config.lazy_load);
    }

    #[test]
    fn test_media_data_source_builders() {
        let source = MediaDataSource::new("https://example.com/a.flv")
            .with_filesize(1_000_000)
            .with_has_audio(true);
        assert_eq!(source.kind, "flv");
        assert!(!source.is_live);
        assert_eq!(source.filesize, Some(1_000_000));
        assert_eq!(source.has_audio, Some(true));

        let live = MediaDataSource::live("wss://example.com/live");
        assert!(live.is_live);
    }
}
