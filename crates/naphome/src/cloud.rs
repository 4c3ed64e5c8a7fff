//! Cloud speech, language model and synthesis clients.
//!
//! All three are single-attempt blocking calls with the API key in the query
//! string. Without a key every call fails fast and speech degrades to a log line.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::format_description;

use naphome_audio::wav::encode_wav;
use naphome_audio::{AssetKind, AudioAsset};

use crate::config::CloudSettings;
use crate::player::PlayerHandle;

const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const LLM_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const STT_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Something that can say a sentence out loud.
pub trait Speaker: Send + Sync {
    /// Speak `text` and return once it has played. Failures are logged, never raised.
    fn say(&self, text: &str);
}

/// Text-in, text-out model used for the greeting and unhandled commands.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Speech-to-text for captured command audio.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, pcm: &[i16]) -> Result<String>;
}

pub struct CloudClient {
    settings: CloudSettings,
    agent: ureq::Agent,
}

impl CloudClient {
    pub fn new(settings: CloudSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .user_agent(concat!("naphome/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            settings,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn has_key(&self) -> bool {
        self.settings.api_key.is_some()
    }

    fn key(&self) -> Result<&str> {
        match self.settings.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("no cloud API key configured"),
        }
    }

    fn post(&self, label: &str, url: &str, body: &Value, timeout: std::time::Duration) -> Result<Value> {
        let mut resp = self
            .agent
            .post(url)
            .config()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .send_json(body)
            .with_context(|| format!("{label} request failed (transport)"))?;
        let code = resp.status();
        if code.as_u16() >= 400 {
            let body = resp
                .body_mut()
                .with_config()
                .limit(64_000)
                .read_to_string()
                .unwrap_or_default();
            let snippet: String = body.trim().chars().take(300).collect();
            bail!("{label} request failed (status {code}): {snippet}");
        }
        resp.body_mut()
            .read_json::<Value>()
            .with_context(|| format!("decode {label} response"))
    }

    /// Synthesize `text` into a playable 16 kHz mono WAV.
    pub fn synthesize(&self, text: &str) -> Result<AudioAsset> {
        let url = format!("{TTS_URL}?key={}", self.key()?);
        let body = tts_request(text, &self.settings);
        let reply = self.post("tts", &url, &body, self.settings.tts_timeout)?;
        let audio = decode_tts_audio(&reply)?;
        tracing::debug!(bytes = audio.len(), "tts audio received");
        tts_asset(audio)
    }
}

impl LanguageModel for CloudClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{LLM_URL_BASE}/{}:generateContent?key={}",
            self.settings.llm_model,
            self.key()?
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let reply = self.post("llm", &url, &body, self.settings.llm_timeout)?;
        llm_reply_text(&reply).ok_or_else(|| anyhow!("llm reply has no text"))
    }
}

impl Transcriber for CloudClient {
    fn transcribe(&self, pcm: &[i16]) -> Result<String> {
        let url = format!("{STT_URL}?key={}", self.key()?);
        let body = stt_request(pcm, &self.settings.language_code);
        let reply = self.post("stt", &url, &body, self.settings.stt_timeout)?;
        transcript(&reply).ok_or_else(|| anyhow!("no speech recognized"))
    }
}

pub(crate) fn tts_request(text: &str, settings: &CloudSettings) -> Value {
    json!({
        "input": { "text": text },
        "voice": {
            "languageCode": settings.language_code,
            "name": settings.voice_name,
            "ssmlGender": "NEUTRAL",
        },
        "audioConfig": {
            "audioEncoding": "LINEAR16",
            "sampleRateHertz": SPEECH_SAMPLE_RATE,
        },
    })
}

pub(crate) fn decode_tts_audio(reply: &Value) -> Result<Vec<u8>> {
    let encoded = reply
        .get("audioContent")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("tts reply has no audioContent"))?;
    general_purpose::STANDARD
        .decode(encoded)
        .context("tts audioContent is not base64")
}

/// LINEAR16 replies usually carry a WAV header; bare PCM gets one added.
pub(crate) fn tts_asset(audio: Vec<u8>) -> Result<AudioAsset> {
    if AssetKind::sniff(&audio) == AssetKind::Wav {
        return Ok(AudioAsset::new("tts.wav", audio));
    }
    let samples: Vec<i16> = audio
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let wav = encode_wav(1, SPEECH_SAMPLE_RATE, &samples).context("wrap tts pcm")?;
    Ok(AudioAsset::new("tts.wav", wav))
}

pub(crate) fn llm_reply_text(reply: &Value) -> Option<String> {
    reply
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn stt_request(pcm: &[i16], language_code: &str) -> Value {
    let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
    json!({
        "config": {
            "encoding": "LINEAR16",
            "sampleRateHertz": SPEECH_SAMPLE_RATE,
            "languageCode": language_code,
        },
        "audio": { "content": general_purpose::STANDARD.encode(bytes) },
    })
}

pub(crate) fn transcript(reply: &Value) -> Option<String> {
    reply
        .pointer("/results/0/alternatives/0/transcript")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Speaks through TTS and the player queue.
pub struct CloudSpeaker {
    client: Arc<CloudClient>,
    player: PlayerHandle,
}

impl CloudSpeaker {
    pub fn new(client: Arc<CloudClient>, player: PlayerHandle) -> Self {
        Self { client, player }
    }
}

impl Speaker for CloudSpeaker {
    fn say(&self, text: &str) {
        tracing::info!(text, "say");
        if !self.client.has_key() {
            return;
        }
        let asset = match self.client.synthesize(text) {
            Ok(asset) => asset,
            Err(e) => {
                tracing::warn!("tts failed: {e:#}");
                return;
            }
        };
        if let Err(e) = self.player.speak_and_wait(asset) {
            tracing::warn!("speech playback failed: {e:#}");
        }
    }
}

/// `h:mm AM on Month d, yyyy`
pub fn spoken_time(now: OffsetDateTime) -> String {
    let format = format_description!(
        "[hour repr:12 padding:none]:[minute] [period] on [month repr:long] [day padding:none], [year]"
    );
    now.format(&format).unwrap_or_else(|_| now.to_string())
}

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn greeting_prompt(now: OffsetDateTime) -> String {
    format!(
        "Hello, I am Naphome. The time is {}. Please provide a brief, friendly greeting and status update in one or two sentences.",
        spoken_time(now)
    )
}

pub fn fallback_greeting(now: OffsetDateTime) -> String {
    format!(
        "Hello, I am Naphome. The time is {}. Voice recognition ready. Say Hi ESP, then run the demo.",
        spoken_time(now)
    )
}

/// Ask the model for a greeting, or use the canned one.
pub fn greeting(llm: Option<&dyn LanguageModel>, now: OffsetDateTime) -> String {
    let Some(llm) = llm else {
        return fallback_greeting(now);
    };
    match llm.generate(&greeting_prompt(now)) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("greeting generation failed: {e:#}");
            fallback_greeting(now)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records what would have been spoken.
    #[derive(Default)]
    pub struct ScriptedSpeaker {
        pub said: Mutex<Vec<String>>,
    }

    impl ScriptedSpeaker {
        pub fn lines(&self) -> Vec<String> {
            self.said.lock().unwrap().clone()
        }
    }

    impl Speaker for ScriptedSpeaker {
        fn say(&self, text: &str) {
            self.said.lock().unwrap().push(text.to_string());
        }
    }

    pub struct CannedModel(pub Result<String, String>);

    impl LanguageModel for CannedModel {
        fn generate(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }
}
