//! HTTP encodings for byte-range seeks.
//!
//! Two built-in encodings are provided: the `Range:` request header and URL
//! query parameters with configurable names. Embedders with bespoke servers
//! inject their own [`SeekHandler`].

use crate::loader::SeekRange;

/// Computed request adjustments for one range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekConfig {
    /// Request URL (query-parameter handlers rewrite it).
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

/// Maps a byte range onto a concrete request.
pub trait SeekHandler {
    /// Compute the URL and headers for requesting `range` of `url`.
    fn get_config(&self, url: &str, range: SeekRange) -> SeekConfig;
}

/// `Range: bytes=from-to` header encoding.
#[derive(Debug, Clone, Default)]
pub struct RangeSeekHandler {
    /// Send `Range: bytes=0-` even for the full request. Some CDNs only
    /// disable transfer-encoding chunking when a range header is present.
    pub zero_start: bool,
}

impl RangeSeekHandler {
    /// Create a handler; `zero_start` forces a range header on full loads.
    pub fn new(zero_start: bool) -> Self {
        Self { zero_start }
    }
}

impl SeekHandler for RangeSeekHandler {
    fn get_config(&self, url: &str, range: SeekRange) -> SeekConfig {
        let mut headers = Vec::new();
        if !range.is_full() {
            let value = match range.to {
                Some(to) => format!("bytes={}-{}", range.from, to),
                None => format!("bytes={}-", range.from),
            };
            headers.push(("Range".to_string(), value));
        } else if self.zero_start {
            headers.push(("Range".to_string(), "bytes=0-".to_string()));
        }
        SeekConfig {
            url: url.to_string(),
            headers,
        }
    }
}

/// Query-parameter encoding, e.g. `?bstart=1000&bend=1999`.
#[derive(Debug, Clone)]
pub struct ParamSeekHandler {
    /// Parameter name carrying the range start.
    pub start_name: String,
    /// Parameter name carrying the range end.
    pub end_name: String,
}

impl ParamSeekHandler {
    /// Create a handler with the given parameter names.
    pub fn new(start_name: impl Into<String>, end_name: impl Into<String>) -> Self {
        Self {
            start_name: start_name.into(),
            end_name: end_name.into(),
        }
    }
}

impl SeekHandler for ParamSeekHandler {
    fn get_config(&self, base_url: &str, range: SeekRange) -> SeekConfig {
        let mut url = base_url.to_string();
        if !range.is_full() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&format!("{}={}", self.start_name, range.from));
            if let Some(to) = range.to {
                url.push_str(&format!("&{}={}", self.end_name, to));
            }
        }
        SeekConfig {
            url,
            headers: Vec::new(),
        }
    }
}
