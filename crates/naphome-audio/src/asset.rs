//! Immutable audio assets.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::wav::encode_wav;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Wav,
    Mp3,
    Unknown,
}

impl AssetKind {
    /// Guess the container from leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.len() >= 4 && &bytes[..4] == b"RIFF" {
            AssetKind::Wav
        } else if bytes.len() >= 3 && &bytes[..3] == b"ID3" {
            AssetKind::Mp3
        } else if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
            AssetKind::Mp3
        } else {
            AssetKind::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Wav => "wav",
            AssetKind::Mp3 => "mp3",
            AssetKind::Unknown => "unknown",
        }
    }
}

/// A read-only WAV or MP3 buffer shared for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct AudioAsset {
    name: String,
    bytes: Arc<[u8]>,
}

impl AudioAsset {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read audio asset {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Two-tone confirmation chime, generated as a mono WAV.
    pub fn chime(sample_rate: u32) -> crate::error::Result<Self> {
        let tone_len = (sample_rate as usize * 150) / 1000;
        let mut samples = Vec::with_capacity(tone_len * 2);
        for freq in [880.0f32, 1320.0] {
            for i in 0..tone_len {
                let t = i as f32 / sample_rate as f32;
                // 5 ms fade at both ends avoids clicks
                let fade_len = sample_rate as f32 * 0.005;
                let fade = (i as f32 / fade_len)
                    .min((tone_len - i) as f32 / fade_len)
                    .min(1.0);
                let value = (2.0 * std::f32::consts::PI * freq * t).sin() * 8000.0 * fade;
                samples.push(value as i16);
            }
        }
        Ok(Self::new("chime.wav", encode_wav(1, sample_rate, &samples)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> AssetKind {
        AssetKind::sniff(&self.bytes)
    }
}
