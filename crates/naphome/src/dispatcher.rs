//! Voice command dispatch.
//!
//! An ordered table of intents, each a matcher over the recognizer's command id
//! and the lowercase phrase. The first match wins: it shows the "understood"
//! face, speaks a reply and runs its action. Commands nothing matches go to the
//! language model when one is configured.

use std::sync::Arc;

use naphome_audio::mp3::id3v2_skip;
use naphome_audio::wav::parse_wav;
use naphome_audio::{AssetKind, AudioAsset, Codec};
use naphome_types::SensorSnapshot;

use crate::cloud::{LanguageModel, Speaker, Transcriber};
use crate::demo::DemoTrigger;
use crate::led::{LedFace, Rgb};
use crate::player::PlayerHandle;
use crate::sensors::{SensorStore, telemetry_json};

const VOLUME_STEP: u8 = 10;
const VOLUME_LOWEST: u8 = 10;

/// A recognized utterance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Command id from the recognizer's phrase table, if it produced one.
    pub id: Option<i32>,
    /// Lowercased phrase text.
    pub phrase: String,
}

impl Command {
    pub fn phrase(text: &str) -> Self {
        Self {
            id: None,
            phrase: text.trim().to_lowercase(),
        }
    }

    pub fn id(id: i32) -> Self {
        Self {
            id: Some(id),
            phrase: String::new(),
        }
    }

    fn has_id(&self, ids: &[i32]) -> bool {
        self.id.is_some_and(|id| ids.contains(&id))
    }

    fn has(&self, needle: &str) -> bool {
        self.phrase.contains(needle)
    }

    fn has_all(&self, needles: &[&str]) -> bool {
        needles.iter().all(|n| self.phrase.contains(n))
    }

    fn has_word(&self, word: &str) -> bool {
        self.phrase
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == word)
    }

    fn is_question(&self) -> bool {
        self.has("what") || self.has("tell me")
    }
}

/// Clips the dispatcher can play.
#[derive(Clone)]
pub struct MediaAssets {
    pub welcome_wav: Option<AudioAsset>,
    pub music_mp3: Option<AudioAsset>,
    pub chime: AudioAsset,
}

/// Everything an intent action can touch.
pub struct DispatchContext {
    pub board_name: String,
    pub speaker: Arc<dyn Speaker>,
    pub face: Arc<LedFace>,
    pub sensors: SensorStore,
    pub codec: Arc<Codec>,
    pub player: PlayerHandle,
    pub media: MediaAssets,
    pub demo: Arc<dyn DemoTrigger>,
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl DispatchContext {
    fn say(&self, text: &str) {
        self.speaker.say(text);
    }
}

struct Intent {
    name: &'static str,
    matches: fn(&Command) -> bool,
    action: fn(&DispatchContext, &Command),
}

const COLORS: [(&str, i32, Rgb); 8] = [
    ("red", 15, Rgb(255, 0, 0)),
    ("green", 16, Rgb(0, 255, 0)),
    ("blue", 5, Rgb(0, 0, 255)),
    ("white", 6, Rgb(255, 255, 255)),
    ("yellow", 7, Rgb(255, 255, 0)),
    ("orange", 8, Rgb(255, 165, 0)),
    ("purple", 9, Rgb(128, 0, 128)),
    ("cyan", 10, Rgb(0, 255, 255)),
];

fn color_for(cmd: &Command) -> Option<(&'static str, Rgb)> {
    COLORS
        .iter()
        .find(|(word, id, _)| cmd.id == Some(*id) || cmd.has_word(word))
        .map(|(word, _, rgb)| (*word, *rgb))
}

const INTENTS: &[Intent] = &[
    Intent {
        name: "demo",
        matches: |c| c.id == Some(0) || c.has("demo"),
        action: |ctx, _| {
            ctx.say("Running the demo.");
            if !ctx.demo.trigger() {
                tracing::info!("demo trigger ignored");
            }
        },
    },
    Intent {
        name: "play_wav",
        matches: |c| c.has_all(&["playing", "wav"]),
        action: |ctx, _| play_clip(ctx, ctx.media.welcome_wav.as_ref(), "WAV"),
    },
    Intent {
        name: "play_mp3",
        matches: |c| c.has_all(&["playing", "mp3"]),
        action: |ctx, _| play_clip(ctx, ctx.media.music_mp3.as_ref(), "MP3"),
    },
    Intent {
        name: "lights_on",
        matches: |c| c.has_id(&[13, 17]) || c.has_all(&["turn on", "light"]),
        action: |ctx, _| {
            ctx.say("Turning lights on.");
            ctx.face.lights_on();
        },
    },
    Intent {
        name: "lights_off",
        matches: |c| c.has_id(&[14, 18]) || c.has_all(&["turn off", "light"]),
        action: |ctx, _| {
            ctx.say("Turning lights off.");
            ctx.face.lights_off();
        },
    },
    Intent {
        name: "color",
        matches: |c| color_for(c).is_some(),
        action: |ctx, cmd| {
            if let Some((word, rgb)) = color_for(cmd) {
                ctx.say(&format!("Setting lights to {word}."));
                ctx.face.fill(rgb);
            }
        },
    },
    Intent {
        name: "volume_highest",
        matches: |c| c.has_id(&[5]) || c.has_all(&["highest", "volume"]),
        action: |ctx, _| {
            ctx.say("Setting volume to highest.");
            ctx.codec.set_volume(100);
        },
    },
    Intent {
        name: "volume_lowest",
        matches: |c| c.has_id(&[6]) || c.has_all(&["lowest", "volume"]),
        action: |ctx, _| {
            ctx.say("Setting volume to lowest.");
            ctx.codec.set_volume(VOLUME_LOWEST);
        },
    },
    Intent {
        name: "volume_up",
        matches: |c| c.has_id(&[7]) || c.has_all(&["increase", "volume"]),
        action: |ctx, _| {
            ctx.say("Increasing volume.");
            let level = ctx.codec.volume().saturating_add(VOLUME_STEP);
            ctx.codec.set_volume(level);
        },
    },
    Intent {
        name: "volume_down",
        matches: |c| c.has_id(&[8]) || c.has_all(&["decrease", "volume"]),
        action: |ctx, _| {
            ctx.say("Decreasing volume.");
            let level = ctx.codec.volume().saturating_sub(VOLUME_STEP);
            ctx.codec.set_volume(level);
        },
    },
    Intent {
        name: "tv_on",
        matches: |c| c.has_id(&[9]) || c.has_all(&["turn on", "tv"]),
        action: |ctx, _| ctx.say("Turning TV on."),
    },
    Intent {
        name: "tv_off",
        matches: |c| c.has_id(&[10]) || c.has_all(&["turn off", "tv"]),
        action: |ctx, _| ctx.say("Turning TV off."),
    },
    Intent {
        name: "ac_on",
        matches: |c| c.has_id(&[19]) || c.has_all(&["turn on", "air conditioner"]),
        action: |ctx, _| ctx.say("Turning air conditioner on."),
    },
    Intent {
        name: "ac_off",
        matches: |c| c.has_id(&[20]) || c.has_all(&["turn off", "air conditioner"]),
        action: |ctx, _| ctx.say("Turning air conditioner off."),
    },
    Intent {
        name: "ask_temperature",
        matches: |c| c.is_question() && c.has("temperature"),
        action: |ctx, _| ctx.say(&temperature_reply(&ctx.sensors.latest())),
    },
    Intent {
        name: "ask_humidity",
        matches: |c| c.is_question() && c.has("humidity"),
        action: |ctx, _| ctx.say(&humidity_reply(&ctx.sensors.latest())),
    },
    Intent {
        name: "ask_air_quality",
        matches: |c| c.is_question() && (c.has("air quality") || c.has("voc")),
        action: |ctx, _| ctx.say(&air_quality_reply(&ctx.sensors.latest())),
    },
    Intent {
        name: "ask_co2",
        matches: |c| c.is_question() && c.has("co2"),
        action: |ctx, _| ctx.say(&co2_reply(&ctx.sensors.latest())),
    },
    Intent {
        name: "ask_light",
        matches: |c| c.is_question() && (c.has("light level") || c.has("brightness")),
        action: |ctx, _| ctx.say(&light_reply(&ctx.sensors.latest())),
    },
    Intent {
        name: "ask_weather",
        matches: |c| c.is_question() && c.has("weather"),
        action: |ctx, _| ctx.say("Weather information is not available."),
    },
    Intent {
        name: "read_sensors",
        matches: |c| c.has("read sensors"),
        action: |ctx, _| ctx.say(&sensor_summary(&ctx.sensors.latest())),
    },
    Intent {
        name: "publish_telemetry",
        matches: |c| c.has("publish telemetry"),
        action: |ctx, _| {
            let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
            let line = telemetry_json(&ctx.board_name, timestamp, &ctx.sensors.latest());
            tracing::info!(target: "telemetry", "{line}");
            ctx.say("Telemetry published.");
        },
    },
    Intent {
        name: "play_music",
        matches: |c| c.has_all(&["play", "music"]),
        action: |ctx, _| match &ctx.media.music_mp3 {
            Some(music) => {
                ctx.say("Playing music.");
                send(ctx.player.play(music.clone()));
            }
            None => ctx.say("Music file not available."),
        },
    },
    Intent {
        name: "stop_music",
        matches: |c| c.has_all(&["stop", "music"]),
        action: |ctx, _| {
            ctx.say("Stopping music.");
            send(ctx.player.stop());
        },
    },
    Intent {
        name: "pause_music",
        matches: |c| c.has_all(&["pause", "music"]),
        action: |ctx, _| {
            ctx.say("Pausing music.");
            send(ctx.player.pause());
        },
    },
    Intent {
        name: "resume_music",
        matches: |c| c.has_all(&["resume", "music"]),
        action: |ctx, _| {
            ctx.say("Resuming music.");
            send(ctx.player.resume());
        },
    },
    Intent {
        name: "next_song",
        matches: |c| c.has_all(&["next", "song"]),
        action: |ctx, _| {
            ctx.say("Playing the next song.");
            send(ctx.player.next());
        },
    },
    Intent {
        name: "previous_song",
        matches: |c| c.has_all(&["previous", "song"]),
        action: |ctx, _| {
            ctx.say("Playing the previous song.");
            send(ctx.player.previous());
        },
    },
    Intent {
        name: "test_audio",
        matches: |c| c.has("test audio"),
        action: |ctx, _| {
            ctx.say("Playing test tone.");
            send(ctx.player.play(ctx.media.chime.clone()));
        },
    },
];

fn send(result: anyhow::Result<()>) {
    if let Err(e) = result {
        tracing::warn!("player command failed: {e:#}");
    }
}

/// Check the clip up front so a broken file gets a spoken failure, then hand
/// it to the player.
fn play_clip(ctx: &DispatchContext, clip: Option<&AudioAsset>, label: &str) {
    let Some(clip) = clip else {
        ctx.say(&format!("{label} file not available."));
        return;
    };
    if let Err(reason) = check_clip(clip) {
        tracing::warn!(asset = %clip.name(), "{reason}");
        ctx.say(&format!("Failed to play {label} file."));
        return;
    }
    ctx.say(&format!("Playing {label} file."));
    send(ctx.player.play(clip.clone()));
}

fn check_clip(clip: &AudioAsset) -> Result<(), String> {
    match clip.kind() {
        AssetKind::Wav => parse_wav(clip.bytes()).map(|_| ()).map_err(|e| e.to_string()),
        AssetKind::Mp3 if id3v2_skip(clip.bytes()) < clip.len() => Ok(()),
        AssetKind::Mp3 => Err("mp3 has no audio after its tag".to_string()),
        AssetKind::Unknown => Err("unrecognized container".to_string()),
    }
}

const NO_DATA: &str = "Sensor data is not available.";

fn temperature_reply(s: &SensorSnapshot) -> String {
    match s.climate {
        Some(c) => format!("The temperature is {:.1} degrees Celsius.", c.temperature_c),
        None => NO_DATA.to_string(),
    }
}

fn humidity_reply(s: &SensorSnapshot) -> String {
    match s.climate {
        Some(c) => format!("The humidity is {:.0} percent.", c.humidity_rh),
        None => NO_DATA.to_string(),
    }
}

fn air_quality_reply(s: &SensorSnapshot) -> String {
    match s.air_quality {
        Some(a) => format!(
            "VOC is {} parts per billion and equivalent CO2 is {} parts per million.",
            a.tvoc_ppb, a.eco2_ppm
        ),
        None => NO_DATA.to_string(),
    }
}

fn co2_reply(s: &SensorSnapshot) -> String {
    match (s.co2, s.air_quality) {
        (Some(c), _) => format!("The CO2 level is {:.0} parts per million.", c.co2_ppm),
        (None, Some(a)) => format!("The equivalent CO2 level is {} parts per million.", a.eco2_ppm),
        (None, None) => NO_DATA.to_string(),
    }
}

fn light_reply(s: &SensorSnapshot) -> String {
    match s.light {
        Some(l) => format!("The light level is {:.0} lux.", l.lux),
        None => NO_DATA.to_string(),
    }
}

fn sensor_summary(s: &SensorSnapshot) -> String {
    let mut parts = Vec::new();
    if let Some(c) = s.climate {
        parts.push(format!(
            "temperature {:.1} degrees, humidity {:.0} percent",
            c.temperature_c, c.humidity_rh
        ));
    }
    if let Some(a) = s.air_quality {
        parts.push(format!("VOC {} parts per billion", a.tvoc_ppb));
    }
    if let Some(c) = s.co2 {
        parts.push(format!("CO2 {:.0} parts per million", c.co2_ppm));
    }
    if let Some(l) = s.light {
        parts.push(format!("light {:.0} lux", l.lux));
    }
    if parts.is_empty() {
        return NO_DATA.to_string();
    }
    format!("Sensor readings: {}.", parts.join(", "))
}

pub struct Dispatcher {
    ctx: DispatchContext,
}

impl Dispatcher {
    pub fn new(ctx: DispatchContext) -> Self {
        Self { ctx }
    }

    /// Run the first matching intent. Returns `false` when nothing matched.
    pub fn dispatch(&self, cmd: &Command) -> bool {
        let Some(intent) = INTENTS.iter().find(|i| (i.matches)(cmd)) else {
            return false;
        };
        tracing::info!(intent = intent.name, id = ?cmd.id, phrase = %cmd.phrase, "command matched");
        self.ctx.face.command_understood();
        (intent.action)(&self.ctx, cmd);
        true
    }

    /// Dispatch, falling back to transcription and the language model.
    pub fn handle(&self, cmd: &Command, audio: Option<&[i16]>) {
        if self.dispatch(cmd) {
            return;
        }
        let ctx = &self.ctx;
        let transcript = match (audio, ctx.transcriber.as_ref()) {
            (Some(pcm), Some(stt)) => match stt.transcribe(pcm) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!("transcription failed: {e:#}");
                    None
                }
            },
            _ => None,
        }
        .or_else(|| (!cmd.phrase.is_empty()).then(|| cmd.phrase.clone()));

        let reply = match (transcript, ctx.llm.as_ref()) {
            (Some(text), Some(llm)) => match llm.generate(&text) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    tracing::warn!("assistant fallback failed: {e:#}");
                    None
                }
            },
            _ => None,
        };
        ctx.face.command_understood();
        match reply {
            Some(reply) => ctx.say(&reply),
            None => ctx.say("Command not recognized."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::testing::{CannedModel, ScriptedSpeaker};
    use crate::led::testing::{MemoryStrip, memory_face};
    use naphome_audio::Arbiter;
    use naphome_audio::config::PlaybackConfig;
    use naphome_audio::sink::MemorySink;
    use naphome_audio::status::PlayerStatusState;
    use naphome_audio::wav::encode_wav;
    use naphome_types::{ClimateSample, Co2Sample};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTrigger(AtomicUsize);

    impl DemoTrigger for CountingTrigger {
        fn trigger(&self) -> bool {
            self.0.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        speaker: Arc<ScriptedSpeaker>,
        strip: MemoryStrip,
        codec: Arc<Codec>,
        sink: MemorySink,
        demo: Arc<CountingTrigger>,
    }

    fn fixture(media: MediaAssets, llm: Option<Arc<dyn LanguageModel>>) -> Fixture {
        let speaker = Arc::new(ScriptedSpeaker::default());
        let (face, strip) = memory_face();
        let sensors = SensorStore::default();
        sensors.publish(SensorSnapshot {
            climate: Some(ClimateSample {
                temperature_c: 21.46,
                humidity_rh: 44.6,
                hardware_present: true,
            }),
            co2: Some(Co2Sample {
                co2_ppm: 612.4,
                temperature_c: 21.0,
                humidity_rh: 45.0,
                hardware_present: false,
            }),
            ..Default::default()
        });
        let sink = MemorySink::new(16_000);
        let codec = Arc::new(Codec::new(Box::new(sink.clone()), Arbiter::shared()));
        let (player, _join) = crate::player::spawn_player(
            codec.clone(),
            PlayerStatusState::shared(),
            PlaybackConfig::default(),
            Vec::new(),
        );
        let demo = Arc::new(CountingTrigger::default());
        let ctx = DispatchContext {
            board_name: "Naphome 0.9".to_string(),
            speaker: speaker.clone(),
            face,
            sensors,
            codec: codec.clone(),
            player,
            media,
            demo: demo.clone(),
            llm,
            transcriber: None,
        };
        Fixture {
            dispatcher: Dispatcher::new(ctx),
            speaker,
            strip,
            codec,
            sink,
            demo,
        }
    }

    fn no_media() -> MediaAssets {
        MediaAssets {
            welcome_wav: None,
            music_mp3: None,
            chime: AudioAsset::chime(16_000).unwrap(),
        }
    }

    fn said(f: &Fixture) -> Vec<String> {
        f.speaker.lines()
    }

    #[test]
    fn demo_by_id_or_phrase() {
        let f = fixture(no_media(), None);
        assert!(f.dispatcher.dispatch(&Command::id(0)));
        assert!(f.dispatcher.dispatch(&Command::phrase("Run the demo")));
        assert_eq!(f.demo.0.load(Ordering::Relaxed), 2);
        assert_eq!(said(&f), vec!["Running the demo.", "Running the demo."]);
    }

    #[test]
    fn color_ids_shadow_volume_ids() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::id(5));
        assert_eq!(said(&f), vec!["Setting lights to blue."]);
        assert!(f.strip.last().unwrap().iter().all(|p| *p == Rgb(0, 0, 255)));
        assert_eq!(f.codec.volume(), 100);
    }

    #[test]
    fn color_words_match_whole_words() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("set the lights to purple"));
        assert!(f.strip.last().unwrap().iter().all(|p| *p == Rgb(128, 0, 128)));
        assert!(!f.dispatcher.dispatch(&Command::phrase("I am bored")));
    }

    #[test]
    fn lights_on_and_off() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("turn on the light"));
        let frame = f.strip.last().unwrap();
        assert_eq!(frame[4], Rgb(0, 150, 0));
        assert_eq!(frame[6], Rgb(0, 255, 0));
        f.dispatcher.dispatch(&Command::id(18));
        assert!(f.strip.last().unwrap().iter().all(|p| *p == Rgb::OFF));
        assert_eq!(said(&f), vec!["Turning lights on.", "Turning lights off."]);
    }

    #[test]
    fn volume_phrases_adjust_codec_gain() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("decrease volume"));
        assert_eq!(f.codec.volume(), 90);
        f.dispatcher.dispatch(&Command::phrase("lowest volume"));
        assert_eq!(f.codec.volume(), 10);
        f.dispatcher.dispatch(&Command::phrase("increase the volume"));
        assert_eq!(f.codec.volume(), 20);
        f.dispatcher.dispatch(&Command::phrase("highest volume"));
        assert_eq!(f.codec.volume(), 100);
    }

    #[test]
    fn appliance_acknowledgements() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("turn on the tv"));
        f.dispatcher.dispatch(&Command::id(20));
        assert_eq!(said(&f), vec!["Turning TV on.", "Turning air conditioner off."]);
    }

    #[test]
    fn sensor_questions_use_latest_readings() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("what is the temperature"));
        f.dispatcher.dispatch(&Command::phrase("tell me the humidity"));
        f.dispatcher.dispatch(&Command::phrase("what is the co2 level"));
        f.dispatcher.dispatch(&Command::phrase("what is the light level"));
        f.dispatcher.dispatch(&Command::phrase("what's the weather"));
        assert_eq!(
            said(&f),
            vec![
                "The temperature is 21.5 degrees Celsius.",
                "The humidity is 45 percent.",
                "The CO2 level is 612 parts per million.",
                "Sensor data is not available.",
                "Weather information is not available.",
            ]
        );
    }

    #[test]
    fn read_sensors_summarizes() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("read sensors"));
        assert_eq!(
            said(&f),
            vec!["Sensor readings: temperature 21.5 degrees, humidity 45 percent, CO2 612 parts per million."]
        );
    }

    #[test]
    fn wav_clip_is_checked_before_playing() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("playing wav"));
        assert_eq!(said(&f), vec!["WAV file not available."]);

        let broken = MediaAssets {
            welcome_wav: Some(AudioAsset::new("welcome.wav", b"RIFF\0\0\0\0WAVE".to_vec())),
            ..no_media()
        };
        let f = fixture(broken, None);
        f.dispatcher.dispatch(&Command::phrase("playing wav"));
        assert_eq!(said(&f), vec!["Failed to play WAV file."]);

        let good = MediaAssets {
            welcome_wav: Some(AudioAsset::new("welcome.wav", encode_wav(1, 16_000, &[7; 300]).unwrap())),
            ..no_media()
        };
        let f = fixture(good, None);
        f.dispatcher.dispatch(&Command::phrase("now playing wav"));
        assert_eq!(said(&f), vec!["Playing WAV file."]);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while f.sink.log().samples.len() < 300 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn unmatched_commands_fall_back() {
        let f = fixture(no_media(), None);
        assert!(!f.dispatcher.dispatch(&Command::phrase("sing a song")));
        f.dispatcher.handle(&Command::phrase("sing a song"), None);
        assert_eq!(said(&f), vec!["Command not recognized."]);

        let llm: Arc<dyn LanguageModel> = Arc::new(CannedModel(Ok("La la la.".to_string())));
        let f = fixture(no_media(), Some(llm));
        f.dispatcher.handle(&Command::phrase("sing a song"), None);
        assert_eq!(said(&f), vec!["La la la."]);

        let broken: Arc<dyn LanguageModel> = Arc::new(CannedModel(Err("offline".to_string())));
        let f = fixture(no_media(), Some(broken));
        f.dispatcher.handle(&Command::id(99), None);
        assert_eq!(said(&f), vec!["Command not recognized."]);
    }

    #[test]
    fn music_without_file_says_so() {
        let f = fixture(no_media(), None);
        f.dispatcher.dispatch(&Command::phrase("play some music"));
        assert_eq!(said(&f), vec!["Music file not available."]);
    }
}
