//! Pre-encoded silent AAC frames used to patch audio timestamp gaps.

/// Silent LC-AAC frames, indexed by channel count (1–6).
const SILENT_LC: [&[u8]; 6] = [
    &[0x00, 0xC8, 0x00, 0x80, 0x23, 0x80],
    &[0x21, 0x00, 0x49, 0x90, 0x02, 0x19, 0x00, 0x23, 0x80],
    &[
        0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x8E,
    ],
    &[
        0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x80, 0x2C, 0x80,
        0x08, 0x02, 0x38,
    ],
    &[
        0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x82, 0x30, 0x04,
        0x99, 0x00, 0x21, 0x90, 0x02, 0x38,
    ],
    &[
        0x00, 0xC8, 0x00, 0x80, 0x20, 0x84, 0x01, 0x26, 0x40, 0x08, 0x64, 0x00, 0x82, 0x30, 0x04,
        0x99, 0x00, 0x21, 0x90, 0x02, 0x00, 0xB2, 0x00, 0x20, 0x08, 0xE0,
    ],
];

/// A pre-encoded silent frame for the codec/channel combination, if one is
/// in the table. Callers fall back to repeating the previous real frame
/// when this returns `None`.
pub fn silent_frame(original_codec: &str, channel_count: u8) -> Option<&'static [u8]> {
    if original_codec != "mp4a.40.2" {
        return None;
    }
    match channel_count {
        1..=6 => Some(SILENT_LC[channel_count as usize - 1]),
        _ => None,
    }
}
