//! Symphonia-backed single-frame MPEG audio decoder.
//!
//! The frame loop in [`crate::mp3`] hands this decoder a slice starting at the
//! current read position. The 4-byte frame header is parsed here to find the frame
//! length, then the frame is passed to Symphonia's MP3 decoder as one packet.
//! The decoder instance is kept across calls so the layer III bit reservoir spans
//! frames, and is rebuilt when the stream's rate or channel layout changes.

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::Packet;

use crate::mp3::{FrameDecoder, FrameInfo};

const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V2_5,
}

/// Fields of an MPEG audio layer III frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub padding: bool,
    /// Whole frame length in bytes, header included.
    pub frame_len: usize,
    pub samples_per_frame: u32,
}

/// Parse a layer III header. Free-format and reserved values are rejected.
pub fn parse_frame_header(h: &[u8]) -> Option<FrameHeader> {
    if h.len() < 4 || h[0] != 0xFF || h[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = match (h[1] >> 3) & 0x03 {
        0 => MpegVersion::V2_5,
        2 => MpegVersion::V2,
        3 => MpegVersion::V1,
        _ => return None,
    };
    // Layer bits 01 are layer III.
    if (h[1] >> 1) & 0x03 != 0x01 {
        return None;
    }

    let bitrate_index = (h[2] >> 4) as usize;
    if bitrate_index == 0 || bitrate_index == 15 {
        return None;
    }
    let bitrate_kbps = match version {
        MpegVersion::V1 => BITRATES_V1_L3[bitrate_index],
        _ => BITRATES_V2_L3[bitrate_index],
    };

    let rate_index = ((h[2] >> 2) & 0x03) as usize;
    if rate_index == 3 {
        return None;
    }
    let sample_rate = match version {
        MpegVersion::V1 => [44_100, 48_000, 32_000][rate_index],
        MpegVersion::V2 => [22_050, 24_000, 16_000][rate_index],
        MpegVersion::V2_5 => [11_025, 12_000, 8_000][rate_index],
    };

    let padding = (h[2] >> 1) & 0x01 == 1;
    let channels = if (h[3] >> 6) & 0x03 == 0x03 { 1 } else { 2 };
    let (samples_per_frame, coefficient) = match version {
        MpegVersion::V1 => (1152, 144),
        _ => (576, 72),
    };
    let frame_len =
        (coefficient * bitrate_kbps * 1000 / sample_rate) as usize + usize::from(padding);

    Some(FrameHeader {
        version,
        bitrate_kbps,
        sample_rate,
        channels,
        padding,
        frame_len,
        samples_per_frame,
    })
}

/// [`FrameDecoder`] built on Symphonia's MPEG audio decoder.
#[derive(Default)]
pub struct MpegFrameDecoder {
    active: Option<ActiveDecoder>,
    ts: u64,
}

struct ActiveDecoder {
    sample_rate: u32,
    channels: u16,
    inner: Box<dyn Decoder>,
}

impl MpegFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decoder_for(&mut self, header: &FrameHeader) -> Option<&mut Box<dyn Decoder>> {
        let stale = match &self.active {
            Some(active) => {
                active.sample_rate != header.sample_rate || active.channels != header.channels
            }
            None => true,
        };
        if stale {
            let layout = if header.channels == 1 {
                Channels::FRONT_LEFT
            } else {
                Channels::FRONT_LEFT | Channels::FRONT_RIGHT
            };
            let mut params = CodecParameters::new();
            params
                .for_codec(CODEC_TYPE_MP3)
                .with_sample_rate(header.sample_rate)
                .with_channels(layout);
            match symphonia::default::get_codecs().make(&params, &DecoderOptions::default()) {
                Ok(inner) => {
                    tracing::debug!(
                        rate_hz = header.sample_rate,
                        channels = header.channels,
                        "mp3 decoder created"
                    );
                    self.active = Some(ActiveDecoder {
                        sample_rate: header.sample_rate,
                        channels: header.channels,
                        inner,
                    });
                }
                Err(e) => {
                    tracing::warn!("mp3 decoder unavailable: {e}");
                    self.active = None;
                    return None;
                }
            }
        }
        self.active.as_mut().map(|a| &mut a.inner)
    }
}

impl FrameDecoder for MpegFrameDecoder {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> FrameInfo {
        let invalid = FrameInfo {
            samples: -1,
            ..FrameInfo::default()
        };
        let Some(header) = parse_frame_header(input) else {
            return invalid;
        };
        if header.frame_len > input.len() {
            return invalid;
        }

        let ts = self.ts;
        self.ts += header.samples_per_frame as u64;
        let Some(decoder) = self.decoder_for(&header) else {
            return invalid;
        };

        let skipped = FrameInfo {
            samples: 0,
            frame_bytes: header.frame_len as i32,
            sample_rate: header.sample_rate,
            channels: header.channels,
        };
        let packet = Packet::new_from_slice(
            0,
            ts,
            header.samples_per_frame as u64,
            &input[..header.frame_len],
        );
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let frames = decoded.frames();
                if frames == 0 {
                    return skipped;
                }
                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                pcm.extend_from_slice(buf.samples());
                FrameInfo {
                    samples: frames as i32,
                    frame_bytes: header.frame_len as i32,
                    sample_rate: spec.rate,
                    channels: spec.channels.count() as u16,
                }
            }
            Err(e) => {
                tracing::trace!("mp3 frame rejected: {e}");
                skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mpeg1_128k_stereo_header() {
        let header = parse_frame_header(&[0xFF, 0xFB, 0x90, 0x64]).unwrap();
        assert_eq!(header.version, MpegVersion::V1);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 44_100);
        assert_eq!(header.channels, 2);
        assert_eq!(header.frame_len, 417);
        assert_eq!(header.samples_per_frame, 1152);
    }

    #[test]
    fn padding_and_mono_flags() {
        let header = parse_frame_header(&[0xFF, 0xFB, 0x92, 0xC4]).unwrap();
        assert!(header.padding);
        assert_eq!(header.frame_len, 418);
        assert_eq!(header.channels, 1);
    }

    #[test]
    fn mpeg2_header_uses_half_frames() {
        // MPEG-2 layer III, 64 kbit/s, 16 kHz
        let header = parse_frame_header(&[0xFF, 0xF3, 0x88, 0xC4]).unwrap();
        assert_eq!(header.sample_rate, 16_000);
        assert_eq!(header.bitrate_kbps, 64);
        assert_eq!(header.samples_per_frame, 576);
        assert_eq!(header.frame_len, 288);
    }

    #[test]
    fn rejects_non_layer3_free_format_and_bad_sync() {
        // layer II
        assert!(parse_frame_header(&[0xFF, 0xFD, 0x90, 0x64]).is_none());
        // free format bitrate
        assert!(parse_frame_header(&[0xFF, 0xFB, 0x00, 0x64]).is_none());
        // reserved sample rate
        assert!(parse_frame_header(&[0xFF, 0xFB, 0x9C, 0x64]).is_none());
        assert!(parse_frame_header(&[0x49, 0x44, 0x33, 0x04]).is_none());
        assert!(parse_frame_header(&[0xFF]).is_none());
    }

    #[test]
    fn garbage_input_is_reported_invalid() {
        let mut decoder = MpegFrameDecoder::new();
        let mut pcm = Vec::new();
        let info = decoder.decode_frame(&[0x00, 0x11, 0x22, 0x33, 0x44], &mut pcm);
        assert!(info.samples < 0);
        assert!(pcm.is_empty());
    }

    #[test]
    fn truncated_frame_is_reported_invalid() {
        let mut decoder = MpegFrameDecoder::new();
        let mut pcm = Vec::new();
        let info = decoder.decode_frame(&[0xFF, 0xFB, 0x90, 0x64, 0, 0, 0], &mut pcm);
        assert!(info.samples < 0);
    }
}
