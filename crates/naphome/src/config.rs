//! Configuration loading and parsing.
//!
//! Every field in the TOML file is optional; [`NaphomeConfig::resolve`] fills the
//! gaps with defaults and applies environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use naphome_audio::config::PlaybackConfig;
use naphome_sensors::SensorAddresses;

pub const API_KEY_ENV: &str = "NAPHOME_API_KEY";
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_VOICE_NAME: &str = "en-US-Standard-D";
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";
pub const DEFAULT_WAKE_PHRASE: &str = "hi esp";

/// Top-level config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NaphomeConfig {
    /// Dashboard bind address (host:port).
    pub http_bind: Option<String>,
    /// Name announced in logs and the dashboard.
    pub board_name: Option<String>,
    pub audio: Option<AudioSection>,
    pub cloud: Option<CloudSection>,
    pub sensors: Option<SensorsSection>,
    pub mdns: Option<MdnsSection>,
    pub voice: Option<VoiceSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioSection {
    /// Output device by substring match.
    pub output_device: Option<String>,
    pub chunk_samples: Option<usize>,
    pub buffer_seconds: Option<f32>,
    pub initial_sample_rate: Option<u32>,
    /// WAV played at startup and by "playing wav".
    pub welcome_wav: Option<PathBuf>,
    /// MP3 played by "playing mp3" and "play music".
    pub music_mp3: Option<PathBuf>,
    /// Play the welcome clip at startup (default true).
    pub play_welcome: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudSection {
    pub api_key: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub tts_timeout_secs: Option<u64>,
    pub stt_timeout_secs: Option<u64>,
    pub voice_name: Option<String>,
    pub language_code: Option<String>,
    /// Ask the LLM for a startup greeting (default true).
    pub greeting: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorsSection {
    pub enabled: Option<bool>,
    pub poll_interval_ms: Option<u64>,
    pub sht30_address: Option<u8>,
    pub sgp30_address: Option<u8>,
    pub bh1750_address: Option<u8>,
    pub scd30_address: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MdnsSection {
    pub enabled: Option<bool>,
    pub hostname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceSection {
    pub enabled: Option<bool>,
    pub wake_phrase: Option<String>,
    /// Seconds of silence after which listening times out.
    pub listen_timeout_secs: Option<u64>,
}

impl NaphomeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<NaphomeConfig>(raw)?)
    }

    /// Apply defaults and the `NAPHOME_API_KEY` override.
    pub fn resolve(self) -> Result<RuntimeConfig> {
        self.resolve_with_env(std::env::var(API_KEY_ENV).ok())
    }

    pub(crate) fn resolve_with_env(self, env_api_key: Option<String>) -> Result<RuntimeConfig> {
        let http_bind = self
            .http_bind
            .as_deref()
            .unwrap_or(DEFAULT_HTTP_BIND)
            .parse::<SocketAddr>()
            .context("invalid http_bind")?;

        let audio = self.audio.unwrap_or_default();
        let defaults = PlaybackConfig::default();
        let playback = PlaybackConfig {
            chunk_samples: audio.chunk_samples.unwrap_or(defaults.chunk_samples),
            buffer_seconds: audio.buffer_seconds.unwrap_or(defaults.buffer_seconds),
            initial_sample_rate: audio
                .initial_sample_rate
                .unwrap_or(defaults.initial_sample_rate),
            ..defaults
        };

        let cloud = self.cloud.unwrap_or_default();
        let api_key = env_api_key
            .or(cloud.api_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let sensors = self.sensors.unwrap_or_default();
        let default_addresses = SensorAddresses::default();
        let mdns = self.mdns.unwrap_or_default();
        let voice = self.voice.unwrap_or_default();

        Ok(RuntimeConfig {
            http_bind,
            board_name: self.board_name.unwrap_or_else(|| "Naphome 0.9".to_string()),
            output_device: normalize_device_name(audio.output_device),
            playback,
            welcome_wav: audio.welcome_wav,
            music_mp3: audio.music_mp3,
            play_welcome: audio.play_welcome.unwrap_or(true),
            cloud: CloudSettings {
                api_key,
                llm_model: cloud
                    .llm_model
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                llm_timeout: Duration::from_secs(cloud.llm_timeout_secs.unwrap_or(30)),
                tts_timeout: Duration::from_secs(cloud.tts_timeout_secs.unwrap_or(15)),
                stt_timeout: Duration::from_secs(cloud.stt_timeout_secs.unwrap_or(15)),
                voice_name: cloud
                    .voice_name
                    .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string()),
                language_code: cloud
                    .language_code
                    .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string()),
                greeting: cloud.greeting.unwrap_or(true),
            },
            sensors_enabled: sensors.enabled.unwrap_or(true),
            sensor_poll_interval: Duration::from_millis(sensors.poll_interval_ms.unwrap_or(2_000)),
            sensor_addresses: SensorAddresses {
                sht30: sensors.sht30_address.unwrap_or(default_addresses.sht30),
                sgp30: sensors.sgp30_address.unwrap_or(default_addresses.sgp30),
                bh1750: sensors.bh1750_address.unwrap_or(default_addresses.bh1750),
                scd30: sensors.scd30_address.unwrap_or(default_addresses.scd30),
            },
            mdns_enabled: mdns.enabled.unwrap_or(true),
            mdns_hostname: mdns.hostname.unwrap_or_else(|| "nap".to_string()),
            voice_enabled: voice.enabled.unwrap_or(true),
            wake_phrase: voice
                .wake_phrase
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_WAKE_PHRASE.to_string()),
            listen_timeout: Duration::from_secs(voice.listen_timeout_secs.unwrap_or(8)),
        })
    }
}

/// Cloud client settings after defaults.
#[derive(Clone, Debug)]
pub struct CloudSettings {
    pub api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub tts_timeout: Duration,
    pub stt_timeout: Duration,
    pub voice_name: String,
    pub language_code: String,
    pub greeting: bool,
}

/// Fully resolved runtime configuration.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub http_bind: SocketAddr,
    pub board_name: String,
    pub output_device: Option<String>,
    pub playback: PlaybackConfig,
    pub welcome_wav: Option<PathBuf>,
    pub music_mp3: Option<PathBuf>,
    pub play_welcome: bool,
    pub cloud: CloudSettings,
    pub sensors_enabled: bool,
    pub sensor_poll_interval: Duration,
    pub sensor_addresses: SensorAddresses,
    pub mdns_enabled: bool,
    pub mdns_hostname: String,
    pub voice_enabled: bool,
    pub wake_phrase: String,
    pub listen_timeout: Duration,
}

pub fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = NaphomeConfig::parse("").unwrap().resolve_with_env(None).unwrap();
        assert_eq!(cfg.http_bind.port(), 8080);
        assert_eq!(cfg.playback.chunk_samples, 1024);
        assert_eq!(cfg.playback.initial_sample_rate, 16_000);
        assert_eq!(cfg.cloud.llm_model, "gemini-2.0-flash-exp");
        assert_eq!(cfg.cloud.llm_timeout, Duration::from_secs(30));
        assert_eq!(cfg.cloud.tts_timeout, Duration::from_secs(15));
        assert!(cfg.cloud.api_key.is_none());
        assert_eq!(cfg.mdns_hostname, "nap");
        assert_eq!(cfg.wake_phrase, "hi esp");
        assert_eq!(cfg.sensor_addresses, SensorAddresses::default());
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
            http_bind = "127.0.0.1:9000"

            [audio]
            output_device = "  USB Speaker "
            chunk_samples = 2048

            [cloud]
            api_key = "from-file"
            llm_timeout_secs = 5

            [sensors]
            bh1750_address = 0x5C

            [voice]
            wake_phrase = "Hey Nap"
        "#;
        let cfg = NaphomeConfig::parse(raw).unwrap().resolve_with_env(None).unwrap();
        assert_eq!(cfg.http_bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.output_device.as_deref(), Some("USB Speaker"));
        assert_eq!(cfg.playback.chunk_samples, 2048);
        assert_eq!(cfg.cloud.api_key.as_deref(), Some("from-file"));
        assert_eq!(cfg.cloud.llm_timeout, Duration::from_secs(5));
        assert_eq!(cfg.sensor_addresses.bh1750, 0x5C);
        assert_eq!(cfg.wake_phrase, "hey nap");
    }

    #[test]
    fn environment_key_wins() {
        let raw = "[cloud]\napi_key = \"from-file\"\n";
        let cfg = NaphomeConfig::parse(raw)
            .unwrap()
            .resolve_with_env(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(cfg.cloud.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let cfg = NaphomeConfig::default()
            .resolve_with_env(Some("   ".to_string()))
            .unwrap();
        assert!(cfg.cloud.api_key.is_none());
    }

    #[test]
    fn unknown_keys_and_bad_bind_are_rejected() {
        assert!(NaphomeConfig::parse("colour = 1").is_err());
        let cfg = NaphomeConfig::parse("http_bind = \"nope\"").unwrap();
        assert!(cfg.resolve_with_env(None).is_err());
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  USB  DAC ".to_string())),
            Some("USB  DAC".to_string())
        );
    }
}
