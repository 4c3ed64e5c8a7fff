//! Process wiring for the CLI subcommands.
//!
//! `run` brings up the whole assistant: audio, LED face, sensors, cloud clients,
//! demo suite, dispatcher, voice loop, dashboard and mDNS.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use naphome_audio::config::PlaybackConfig;
use naphome_audio::decode::MpegFrameDecoder;
use naphome_audio::output::CpalSink;
use naphome_audio::pipeline::play_asset;
use naphome_audio::sink::{AudioSink, NullSink};
use naphome_audio::status::PlayerStatusState;
use naphome_audio::{Arbiter, AudioAsset, Codec, PlaybackSessionOptions, Priority};
use naphome_sensors::{DetachedBus, SensorHub, StdDelay};

use crate::cloud::{self, CloudClient, CloudSpeaker, LanguageModel, Speaker, Transcriber};
use crate::config::RuntimeConfig;
use crate::demo::{DemoEnv, DemoSuite, DemoTiming, DemoTrigger, TestBoard};
use crate::dispatcher::{DispatchContext, Dispatcher, MediaAssets};
use crate::http_api::{AppState, spawn_dashboard};
use crate::led::{IDLE_PERIOD, LedFace, LogStrip, Rgb, spawn_animation};
use crate::sensors::{SensorStore, spawn_sensor_poller, telemetry_json};
use crate::status::{StatusSources, host_memory};
use crate::tasks::{TaskRegistry, TaskState};
use crate::voice::{LineRecognizer, run_detect_loop};
use crate::{mdns, player};

const CLOUD_PROBE_HOST: (&str, u16) = ("generativelanguage.googleapis.com", 443);

/// Switches from the `run` subcommand.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    pub start_demo: bool,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    naphome_audio::device::list_devices(&host)
}

/// Play one WAV or MP3 file on the configured device.
pub fn run_play(config: &RuntimeConfig, path: &Path, volume: u8) -> Result<()> {
    let asset = AudioAsset::load(path)?;
    let sink = CpalSink::open(
        config.output_device.clone(),
        config.playback.initial_sample_rate,
        config.playback.buffer_seconds,
    )?;
    let codec = Codec::new(Box::new(sink), Arbiter::shared());
    codec.set_volume(volume);
    tracing::info!(
        asset = %asset.name(),
        kind = asset.kind().as_str(),
        device = ?codec.device_name(),
        "playing file"
    );
    let opts = PlaybackSessionOptions::new(
        Priority::Background,
        config.playback.effective_chunk_samples(),
    );
    let report = play_asset(&codec, &asset, &mut MpegFrameDecoder::new(), &opts)
        .with_context(|| format!("play {}", path.display()))?;
    tracing::info!(
        writes = report.playback.writes,
        samples = report.playback.samples,
        "playback finished"
    );
    // let the device drain what is still queued
    std::thread::sleep(Duration::from_secs_f32(config.playback.buffer_seconds));
    Ok(())
}

/// Print `count` sensor snapshots as telemetry lines; `0` polls forever.
pub fn run_sensors(config: &RuntimeConfig, count: u32, interval: Duration) -> Result<()> {
    let mut hub = SensorHub::init(DetachedBus, StdDelay, config.sensor_addresses);
    for (name, present) in hub.presence() {
        tracing::info!(sensor = name, present, "sensor probe");
    }
    let mut polled = 0u32;
    while count == 0 || polled < count {
        if polled > 0 {
            std::thread::sleep(interval);
        }
        polled = polled.saturating_add(1);
        let snapshot = hub.poll();
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        println!("{}", telemetry_json(&config.board_name, timestamp, &snapshot));
    }
    hub.shutdown();
    Ok(())
}

/// Run the assistant until Ctrl-C.
pub fn run(config: RuntimeConfig, opts: RunOptions) -> Result<()> {
    let started = Instant::now();
    let tasks = TaskRegistry::new();
    let stop = Arc::new(AtomicBool::new(false));

    let arbiter = Arbiter::shared();
    let codec = Arc::new(Codec::new(open_sink(&config), arbiter.clone()));
    let player_status = PlayerStatusState::shared();
    player_status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .device = codec.device_name();

    let media = MediaAssets {
        welcome_wav: load_media(config.welcome_wav.as_deref()),
        music_mp3: load_media(config.music_mp3.as_deref()),
        chime: AudioAsset::chime(codec.sample_rate()).context("generate chime")?,
    };
    let playlist: Vec<AudioAsset> = [&media.welcome_wav, &media.music_mp3]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    let (player, _player_join) = player::spawn_player(
        codec.clone(),
        player_status.clone(),
        config.playback.clone(),
        playlist,
    );
    tasks.register("player", 5, -1);

    let face = Arc::new(LedFace::new(Box::new(LogStrip::default())));
    face.idle();
    let animation = spawn_animation(face.clone(), IDLE_PERIOD, stop.clone())
        .context("spawn led animation")?;
    tasks.register("led", 2, -1);

    let sensors = SensorStore::default();
    let poller = if config.sensors_enabled {
        let join = start_sensors(&config, &sensors, &stop)?;
        tasks.register("sensors", 3, -1);
        Some(join)
    } else {
        tracing::info!("sensors disabled");
        None
    };

    let client = Arc::new(CloudClient::new(config.cloud.clone()));
    if !client.has_key() {
        tracing::warn!("no API key configured; speech, LLM and STT are disabled");
    }
    let speaker: Arc<dyn Speaker> = Arc::new(CloudSpeaker::new(client.clone(), player.clone()));
    let llm: Option<Arc<dyn LanguageModel>> = client
        .has_key()
        .then(|| client.clone() as Arc<dyn LanguageModel>);
    let transcriber: Option<Arc<dyn Transcriber>> = client
        .has_key()
        .then(|| client.clone() as Arc<dyn Transcriber>);

    let board = Arc::new(TestBoard::default());
    let demo = {
        let codec = codec.clone();
        DemoSuite::new(
            board.clone(),
            DemoEnv {
                board_name: config.board_name.clone(),
                speaker: speaker.clone(),
                face: face.clone(),
                sensors: sensors.clone(),
                memory: Arc::new(host_memory),
                network: Arc::new(cloud_reachable),
                audio: Arc::new(move || codec.device_name().is_some()),
                timing: DemoTiming::default(),
            },
        )
    };
    let trigger: Arc<dyn DemoTrigger> = Arc::new(demo.clone());

    let dispatcher = Dispatcher::new(DispatchContext {
        board_name: config.board_name.clone(),
        speaker: speaker.clone(),
        face: face.clone(),
        sensors: sensors.clone(),
        codec: codec.clone(),
        player: player.clone(),
        media: media.clone(),
        demo: trigger.clone(),
        llm: llm.clone(),
        transcriber,
    });

    let dashboard = match spawn_dashboard(
        config.http_bind,
        AppState {
            status: StatusSources {
                started,
                codec: codec.clone(),
                player: player_status.clone(),
                tests: board,
                tasks: tasks.clone(),
                sensors: sensors.clone(),
            },
            demo: trigger,
        },
    ) {
        Ok(server) => {
            tasks.register("http", 4, -1);
            Some(server)
        }
        Err(e) => {
            tracing::error!("dashboard unavailable: {e:#}");
            None
        }
    };

    let advertiser = if config.mdns_enabled && dashboard.is_some() {
        mdns::spawn_mdns_advertiser(&config.mdns_hostname, &config.board_name, config.http_bind)
    } else {
        None
    };

    if config.play_welcome {
        match &media.welcome_wav {
            Some(welcome) => {
                if let Err(e) = player.play(welcome.clone()) {
                    tracing::warn!("welcome playback failed: {e:#}");
                }
            }
            None => tracing::debug!("no welcome clip configured"),
        }
    }

    let greeting_llm = if config.cloud.greeting { llm } else { None };
    tasks.register("detect", 5, 1);
    let _voice = {
        let speaker = speaker.clone();
        let face = face.clone();
        let tasks = tasks.clone();
        let voice_enabled = config.voice_enabled;
        let wake_phrase = config.wake_phrase.clone();
        let listen_timeout = config.listen_timeout;
        std::thread::Builder::new()
            .name("detect".to_string())
            .spawn(move || {
                let text = cloud::greeting(greeting_llm.as_deref(), cloud::local_now());
                speaker.say(&text);
                if !voice_enabled {
                    tracing::info!("voice input disabled");
                    tasks.set_state("detect", TaskState::Finished);
                    return;
                }
                match LineRecognizer::stdin(&wake_phrase, listen_timeout) {
                    Ok(mut recognizer) => {
                        tracing::info!(wake_phrase = %wake_phrase, "type the wake phrase, then a command");
                        run_detect_loop(&mut recognizer, &arbiter, &face, &dispatcher);
                    }
                    Err(e) => tracing::error!("stdin reader failed: {e}"),
                }
                tasks.set_state("detect", TaskState::Finished);
            })
            .context("spawn voice loop")?
    };

    if opts.start_demo && !demo.start() {
        tracing::warn!("demo did not start");
    }

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("install ctrl-c handler")?;
    tracing::info!(board = %config.board_name, "naphome running; ctrl-c to exit");
    let _ = shutdown_rx.recv();

    tracing::info!("shutting down");
    stop.store(true, Ordering::Relaxed);
    codec.arbiter().set_enabled(false);
    if let Some(advertiser) = advertiser {
        advertiser.shutdown();
    }
    if let Some(dashboard) = dashboard {
        dashboard.stop();
    }
    let _ = player.stop();
    if animation.join().is_err() {
        tracing::warn!("led animation thread panicked");
    }
    if let Some(poller) = poller
        && poller.join().is_err()
    {
        tracing::warn!("sensor thread panicked");
    }
    face.fill(Rgb::OFF);
    Ok(())
}

/// The configured device, or a silent sink when it cannot be opened.
fn open_sink(config: &RuntimeConfig) -> Box<dyn AudioSink> {
    let playback: &PlaybackConfig = &config.playback;
    match CpalSink::open(
        config.output_device.clone(),
        playback.initial_sample_rate,
        playback.buffer_seconds,
    ) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!("audio output unavailable, continuing silent: {e:#}");
            Box::new(NullSink::new(playback.initial_sample_rate, true))
        }
    }
}

fn load_media(path: Option<&Path>) -> Option<AudioAsset> {
    let path = path?;
    match AudioAsset::load(path) {
        Ok(asset) => {
            tracing::info!(
                path = %path.display(),
                kind = asset.kind().as_str(),
                bytes = asset.len(),
                "media loaded"
            );
            Some(asset)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "media not loaded: {e:#}");
            None
        }
    }
}

fn start_sensors(
    config: &RuntimeConfig,
    store: &SensorStore,
    stop: &Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    // no I2C controller on the host: every part demotes to synthetic readings
    let hub = SensorHub::init(DetachedBus, StdDelay, config.sensor_addresses);
    for (name, present) in hub.presence() {
        tracing::info!(sensor = name, present, "sensor probe");
    }
    spawn_sensor_poller(hub, config.sensor_poll_interval, store.clone(), stop.clone())
        .context("spawn sensor poller")
}

/// Whether the cloud endpoint answers a TCP connect within two seconds.
fn cloud_reachable() -> bool {
    let Ok(addrs) = CLOUD_PROBE_HOST.to_socket_addrs() else {
        return false;
    };
    addrs
        .take(2)
        .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
}
