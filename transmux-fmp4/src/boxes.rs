//! ISO BMFF box generation by concatenation.
//!
//! Boxes are built as plain byte vectors: [`mp4_box`] prepends the
//! `{size:u32-BE, type}` header to its body parts, container boxes are the
//! concatenation of their children. Initialization segments are
//! `ftyp`+`moov`; media segments are `moof`+`mdat` pairs generated from a
//! corrected sample run.

use transmux_core::{AudioMetadata, SampleFlags, TrackMetadata, VideoMetadata};

/// Build a box from its FourCC and body parts.
pub fn mp4_box(box_type: &[u8; 4], bodies: &[&[u8]]) -> Vec<u8> {
    let size = 8 + bodies.iter().map(|b| b.len()).sum::<usize>();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(size as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    for body in bodies {
        out.extend_from_slice(body);
    }
    out
}

/// One corrected sample entering a `moof`/`mdat` pair.
#[derive(Debug, Clone)]
pub struct Mp4Sample {
    /// Decode timestamp in timescale units.
    pub dts: i64,
    /// Composition time offset.
    pub cts: i64,
    /// Sample duration.
    pub duration: i64,
    /// Payload byte length.
    pub size: usize,
    /// Dependency flags for `trun`/`sdtp`.
    pub flags: SampleFlags,
}

/// Everything `moof` needs about the fragment.
#[derive(Debug)]
pub struct FragmentHeader<'a> {
    /// Track id (1 video, 2 audio).
    pub track_id: u32,
    /// Fragment sequence number.
    pub sequence_number: u32,
    /// `tfdt` base media decode time.
    pub base_media_decode_time: i64,
    /// Samples in decode order.
    pub samples: &'a [Mp4Sample],
}

const FTYP: &[u8] = &[
    b'i', b's', b'o', b'm', // major brand
    0x00, 0x00, 0x00, 0x01, // minor version
    b'i', b's', b'o', b'm', // compatible brands
    b'a', b'v', b'c', b'1',
];

// identity matrix with 16.16/2.30 fixed-point values
const UNITY_MATRIX: &[u8] = &[
    0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00,
];

/// Generate the `ftyp`+`moov` initialization segment for one track.
pub fn generate_init_segment(meta: &TrackMetadata) -> Vec<u8> {
    let ftyp = mp4_box(b"ftyp", &[FTYP]);
    let (timescale, duration) = match meta {
        TrackMetadata::Audio(a) => (a.timescale, a.duration),
        TrackMetadata::Video(v) => (v.timescale, v.duration),
    };
    let moov = mp4_box(
        b"moov",
        &[&mvhd(timescale, duration), &trak(meta), &mvex(meta)],
    );

    let mut out = ftyp;
    out.extend_from_slice(&moov);
    out
}

fn mvhd(timescale: u32, duration: i64) -> Vec<u8> {
    let mut body = Vec::with_capacity(100);
    body.extend_from_slice(&[0, 0, 0, 0]); // version + flags
    body.extend_from_slice(&[0, 0, 0, 0]); // creation_time
    body.extend_from_slice(&[0, 0, 0, 0]); // modification_time
    body.extend_from_slice(&timescale.to_be_bytes());
    body.extend_from_slice(&(duration.max(0) as u32).to_be_bytes());
    body.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]); // preferred rate 1.0
    body.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // volume 1.0 + reserved
    body.extend_from_slice(&[0; 8]); // reserved
    body.extend_from_slice(UNITY_MATRIX);
    body.extend_from_slice(&[0; 24]); // pre_defined
    body.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // next_track_ID
    mp4_box(b"mvhd", &[&body])
}

fn trak(meta: &TrackMetadata) -> Vec<u8> {
    mp4_box(b"trak", &[&tkhd(meta), &mdia(meta)])
}

fn tkhd(meta: &TrackMetadata) -> Vec<u8> {
    let (track_id, duration, width, height) = match meta {
        TrackMetadata::Audio(a) => (a.id, a.duration, 0, 0),
        TrackMetadata::Video(v) => (v.id, v.duration, v.present_width, v.present_height),
    };
    let mut body = Vec::with_capacity(84);
    body.extend_from_slice(&[0, 0, 0, 7]); // version + flags: enabled, in movie, in preview
    body.extend_from_slice(&[0, 0, 0, 0]); // creation_time
    body.extend_from_slice(&[0, 0, 0, 0]); // modification_time
    body.extend_from_slice(&track_id.to_be_bytes());
    body.extend_from_slice(&[0, 0, 0, 0]); // reserved
    body.extend_from_slice(&(duration.max(0) as u32).to_be_bytes());
    body.extend_from_slice(&[0; 8]); // reserved
    body.extend_from_slice(&[0, 0]); // layer
    body.extend_from_slice(&[0, 0]); // alternate_group
    body.extend_from_slice(&[0, 0]); // volume
    body.extend_from_slice(&[0, 0]); // reserved
    body.extend_from_slice(UNITY_MATRIX);
    body.extend_from_slice(&((width as u32) << 16).to_be_bytes());
    body.extend_from_slice(&((height as u32) << 16).to_be_bytes());
    mp4_box(b"tkhd", &[&body])
}

fn mdia(meta: &TrackMetadata) -> Vec<u8> {
    mp4_box(b"mdia", &[&mdhd(meta), &hdlr(meta), &minf(meta)])
}

fn mdhd(meta: &TrackMetadata) -> Vec<u8> {
    let (timescale, duration) = match meta {
        TrackMetadata::Audio(a) => (a.timescale, a.duration),
        TrackMetadata::Video(v) => (v.timescale, v.duration),
    };
    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&[0, 0, 0, 0]); // version + flags
    body.extend_from_slice(&[0, 0, 0, 0]); // creation_time
    body.extend_from_slice(&[0, 0, 0, 0]); // modification_time
    body.extend_from_slice(&timescale.to_be_bytes());
    body.extend_from_slice(&(duration.max(0) as u32).to_be_bytes());
    body.extend_from_slice(&[0x55, 0xC4]); // language: und
    body.extend_from_slice(&[0, 0]); // pre_defined
    mp4_box(b"mdhd", &[&body])
}

fn hdlr(meta: &TrackMetadata) -> Vec<u8> {
    let (handler, name): (&[u8; 4], &[u8]) = match meta {
        TrackMetadata::Audio(_) => (b"soun", b"SoundHandler\0"),
        TrackMetadata::Video(_) => (b"vide", b"VideoHandler\0"),
    };
    let mut body = Vec::with_capacity(25 + name.len());
    body.extend_from_slice(&[0, 0, 0, 0]); // version + flags
    body.extend_from_slice(&[0, 0, 0, 0]); // pre_defined
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0; 12]); // reserved
    body.extend_from_slice(name);
    mp4_box(b"hdlr", &[&body])
}

fn minf(meta: &TrackMetadata) -> Vec<u8> {
    let media_header = match meta {
        TrackMetadata::Audio(_) => smhd(),
        TrackMetadata::Video(_) => vmhd(),
    };
    mp4_box(b"minf", &[&media_header, &dinf(), &stbl(meta)])
}

fn vmhd() -> Vec<u8> {
    mp4_box(
        b"vmhd",
        &[&[
            0, 0, 0, 1, // version + flags
            0, 0, // graphicsmode
            0, 0, 0, 0, 0, 0, // opcolor
        ]],
    )
}

fn smhd() -> Vec<u8> {
    mp4_box(
        b"smhd",
        &[&[
            0, 0, 0, 0, // version + flags
            0, 0, // balance
            0, 0, // reserved
        ]],
    )
}

fn dinf() -> Vec<u8> {
    let url = mp4_box(b"url ", &[&[0, 0, 0, 1]]); // self-contained
    let mut dref_body = vec![0, 0, 0, 0, 0, 0, 0, 1]; // version + flags, entry count
    dref_body.extend_from_slice(&url);
    let dref = mp4_box(b"dref", &[&dref_body]);
    mp4_box(b"dinf", &[&dref])
}

fn stbl(meta: &TrackMetadata) -> Vec<u8> {
    // fragmented files keep the static sample tables empty
    let stts = mp4_box(b"stts", &[&[0u8; 8]]);
    let stsc = mp4_box(b"stsc", &[&[0u8; 8]]);
    let stsz = mp4_box(b"stsz", &[&[0u8; 12]]);
    let stco = mp4_box(b"stco", &[&[0u8; 8]]);
    mp4_box(b"stbl", &[&stsd(meta), &stts, &stsc, &stsz, &stco])
}

fn stsd(meta: &TrackMetadata) -> Vec<u8> {
    let entry = match meta {
        TrackMetadata::Audio(audio) if audio.is_mp3() => mp3(audio),
        TrackMetadata::Audio(audio) => mp4a(audio),
        TrackMetadata::Video(video) => avc1(video),
    };
    let mut body = vec![0, 0, 0, 0, 0, 0, 0, 1]; // version + flags, entry count
    body.extend_from_slice(&entry);
    mp4_box(b"stsd", &[&body])
}

fn audio_sample_entry_body(meta: &AudioMetadata) -> Vec<u8> {
    let mut body = Vec::with_capacity(28);
    body.extend_from_slice(&[0; 6]); // reserved
    body.extend_from_slice(&[0, 1]); // data_reference_index
    body.extend_from_slice(&[0; 8]); // reserved
    body.extend_from_slice(&(meta.channel_count as u16).to_be_bytes());
    body.extend_from_slice(&[0, 16]); // samplesize
    body.extend_from_slice(&[0, 0, 0, 0]); // pre_defined + reserved
    body.extend_from_slice(&(meta.audio_sample_rate as u16).to_be_bytes()); // 16.16 samplerate
    body.extend_from_slice(&[0, 0]);
    body
}

fn mp3(meta: &AudioMetadata) -> Vec<u8> {
    mp4_box(b".mp3", &[&audio_sample_entry_body(meta)])
}

fn mp4a(meta: &AudioMetadata) -> Vec<u8> {
    mp4_box(b"mp4a", &[&audio_sample_entry_body(meta), &esds(meta)])
}

fn esds(meta: &AudioMetadata) -> Vec<u8> {
    let config = &meta.config;
    let config_size = config.len();
    let mut body = Vec::with_capacity(37 + config_size);
    body.extend_from_slice(&[0, 0, 0, 0]); // version + flags

    body.push(0x03); // ES_DescrTag
    body.push((0x17 + config_size) as u8);
    body.extend_from_slice(&[0x00, 0x01]); // ES_ID
    body.push(0x00); // stream dependence + URL + OCR flags

    body.push(0x04); // DecoderConfigDescrTag
    body.push((0x0F + config_size) as u8);
    body.push(0x40); // object type: MPEG-4 AAC
    body.push(0x15); // stream type: audio
    body.extend_from_slice(&[0, 0, 0]); // bufferSizeDB
    body.extend_from_slice(&[0, 0, 0, 0]); // maxBitrate
    body.extend_from_slice(&[0, 0, 0, 0]); // avgBitrate

    body.push(0x05); // DecSpecificInfoTag
    body.push(config_size as u8);
    body.extend_from_slice(config);

    body.push(0x06); // SLConfigDescrTag
    body.push(0x01);
    body.push(0x02);

    mp4_box(b"esds", &[&body])
}

// Pascal-string compressorname padded into the fixed 31-byte field
const COMPRESSOR_NAME: &[u8; 32] = &[
    0x08, b't', b'r', b'a', b'n', b's', b'm', b'u', b'x', 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

fn avc1(meta: &VideoMetadata) -> Vec<u8> {
    let mut body = Vec::with_capacity(78);
    body.extend_from_slice(&[0; 6]); // reserved
    body.extend_from_slice(&[0, 1]); // data_reference_index
    body.extend_from_slice(&[0; 16]); // pre_defined + reserved
    body.extend_from_slice(&(meta.codec_width as u16).to_be_bytes());
    body.extend_from_slice(&(meta.codec_height as u16).to_be_bytes());
    body.extend_from_slice(&[0x00, 0x48, 0x00, 0x00]); // horizresolution 72 dpi
    body.extend_from_slice(&[0x00, 0x48, 0x00, 0x00]); // vertresolution 72 dpi
    body.extend_from_slice(&[0, 0, 0, 0]); // reserved
    body.extend_from_slice(&[0, 1]); // frame_count
    body.extend_from_slice(COMPRESSOR_NAME);
    body.extend_from_slice(&[0, 0x18]); // depth
    body.extend_from_slice(&[0xFF, 0xFF]); // pre_defined = -1
    let avcc = mp4_box(b"avcC", &[&meta.avcc]);
    mp4_box(b"avc1", &[&body, &avcc])
}

fn mvex(meta: &TrackMetadata) -> Vec<u8> {
    mp4_box(b"mvex", &[&trex(meta)])
}

fn trex(meta: &TrackMetadata) -> Vec<u8> {
    let track_id = match meta {
        TrackMetadata::Audio(a) => a.id,
        TrackMetadata::Video(v) => v.id,
    };
    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&[0, 0, 0, 0]); // version + flags
    body.extend_from_slice(&track_id.to_be_bytes());
    body.extend_from_slice(&[0, 0, 0, 1]); // default_sample_description_index
    body.extend_from_slice(&[0, 0, 0, 0]); // default_sample_duration
    body.extend_from_slice(&[0, 0, 0, 0]); // default_sample_size
    body.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // default_sample_flags
    mp4_box(b"trex", &[&body])
}

/// Generate the `moof` box for one fragment.
pub fn generate_moof(fragment: &FragmentHeader<'_>) -> Vec<u8> {
    // trun's data_offset points at the first mdat payload byte, so the moof
    // size must be known up front:
    //   moof = hdr(8) + mfhd(16) + traf(hdr 8 + tfhd 16 + tfdt 16 + trun + sdtp)
    let sample_count = fragment.samples.len();
    let trun_size = 20 + 16 * sample_count;
    let sdtp_size = 12 + sample_count;
    let moof_size = 8 + 16 + 8 + 16 + 16 + trun_size + sdtp_size;
    let data_offset = (moof_size + 8) as u32;

    let traf = mp4_box(
        b"traf",
        &[
            &tfhd(fragment.track_id),
            &tfdt(fragment.base_media_decode_time),
            &trun(fragment.samples, data_offset),
            &sdtp(fragment.samples),
        ],
    );
    mp4_box(b"moof", &[&mfhd(fragment.sequence_number), &traf])
}

fn mfhd(sequence_number: u32) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(&sequence_number.to_be_bytes());
    mp4_box(b"mfhd", &[&body])
}

fn tfhd(track_id: u32) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(&track_id.to_be_bytes());
    mp4_box(b"tfhd", &[&body])
}

fn tfdt(base_media_decode_time: i64) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(&(base_media_decode_time.max(0) as u32).to_be_bytes());
    mp4_box(b"tfdt", &[&body])
}

fn trun(samples: &[Mp4Sample], data_offset: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(12 + 16 * samples.len());
    // data-offset | sample-duration | sample-size | sample-flags |
    // sample-composition-time-offset present
    body.extend_from_slice(&[0x00, 0x00, 0x0F, 0x01]);
    body.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    body.extend_from_slice(&data_offset.to_be_bytes());
    for sample in samples {
        let flags = &sample.flags;
        body.extend_from_slice(&(sample.duration.max(0) as u32).to_be_bytes());
        body.extend_from_slice(&(sample.size as u32).to_be_bytes());
        body.push((flags.is_leading << 2) | flags.depends_on);
        body.push((flags.is_depended_on << 6) | (flags.has_redundancy << 4) | flags.is_non_sync);
        body.extend_from_slice(&[0, 0]); // degradation_priority
        body.extend_from_slice(&(sample.cts as i32).to_be_bytes());
    }
    mp4_box(b"trun", &[&body])
}

fn sdtp(samples: &[Mp4Sample]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + samples.len());
    body.extend_from_slice(&[0, 0, 0, 0]);
    for sample in samples {
        let flags = &sample.flags;
        body.push(
            (flags.is_leading << 6)
                | (flags.depends_on << 4)
                | (flags.is_depended_on << 2)
                | flags.has_redundancy,
        );
    }
    mp4_box(b"sdtp", &[&body])
}

/// Wrap payload bytes in an `mdat` box.
pub fn mdat(payload: &[u8]) -> Vec<u8> {
    mp4_box(b"mdat", &[payload])
}
