//! Player worker.
//!
//! One thread owns playback requests. Background assets (music, test clips) run
//! on a session thread of their own so a new request or a stop can cancel them.
//! Speech runs inline on the worker at voice priority while background playback
//! is held, so replies are never interleaved with music.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};

use naphome_audio::config::PlaybackConfig;
use naphome_audio::decode::MpegFrameDecoder;
use naphome_audio::pipeline::play_asset;
use naphome_audio::status::PlayerStatusState;
use naphome_audio::{AudioAsset, AudioError, Codec, PlaybackSessionOptions, Priority};
use naphome_types::PlaybackEndReason;

/// Commands accepted by the player worker.
pub enum PlayerCommand {
    /// Replace the current background asset.
    Play { asset: AudioAsset },
    /// Play a spoken reply. `done` fires once the last chunk reached the codec.
    Speak {
        asset: AudioAsset,
        done: Option<Sender<Result<(), String>>>,
    },
    /// Cancel background playback.
    Stop,
    Pause,
    Resume,
    /// Step through the playlist.
    Next,
    Previous,
}

/// Cloneable handle to the player worker.
#[derive(Clone)]
pub struct PlayerHandle {
    pub cmd_tx: Sender<PlayerCommand>,
}

impl PlayerHandle {
    fn send(&self, cmd: PlayerCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("player worker is gone"))
    }

    pub fn play(&self, asset: AudioAsset) -> Result<()> {
        self.send(PlayerCommand::Play { asset })
    }

    /// Queue speech and block until it has played.
    pub fn speak_and_wait(&self, asset: AudioAsset) -> Result<()> {
        let (done, finished) = crossbeam_channel::bounded(1);
        self.send(PlayerCommand::Speak {
            asset,
            done: Some(done),
        })?;
        finished
            .recv()
            .map_err(|_| anyhow!("player worker dropped the reply"))?
            .map_err(|e| anyhow!(e))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(PlayerCommand::Stop)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(PlayerCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(PlayerCommand::Resume)
    }

    pub fn next(&self) -> Result<()> {
        self.send(PlayerCommand::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(PlayerCommand::Previous)
    }
}

struct SessionHandle {
    cancel: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Spawn the worker. `playlist` backs next/previous; it may be empty.
pub fn spawn_player(
    codec: Arc<Codec>,
    status: Arc<Mutex<PlayerStatusState>>,
    playback: PlaybackConfig,
    playlist: Vec<AudioAsset>,
) -> (PlayerHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let join = std::thread::spawn(move || {
        player_thread_main(cmd_rx, codec, status, playback, playlist);
    });
    (PlayerHandle { cmd_tx }, join)
}

fn player_thread_main(
    cmd_rx: Receiver<PlayerCommand>,
    codec: Arc<Codec>,
    status: Arc<Mutex<PlayerStatusState>>,
    playback: PlaybackConfig,
    playlist: Vec<AudioAsset>,
) {
    let mut session: Option<SessionHandle> = None;
    let mut position: Option<usize> = None;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            PlayerCommand::Play { asset } => {
                tracing::info!(asset = %asset.name(), kind = asset.kind().as_str(), "play received");
                position = playlist.iter().position(|a| a.name() == asset.name());
                start_session(&codec, &status, &playback, &mut session, asset);
            }
            PlayerCommand::Speak { asset, done } => {
                let result = speak_inline(&codec, &playback, &asset);
                if let Err(e) = &result {
                    tracing::warn!(asset = %asset.name(), "speech playback failed: {e}");
                }
                if let Some(done) = done {
                    let _ = done.send(result.map_err(|e| e.to_string()));
                }
            }
            PlayerCommand::Stop => {
                cancel_session(&mut session);
                codec.arbiter().set_user_paused(false);
                status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear_playback(PlaybackEndReason::Stopped);
            }
            PlayerCommand::Pause => {
                codec.arbiter().set_user_paused(true);
                tracing::info!("background playback paused");
            }
            PlayerCommand::Resume => {
                codec.arbiter().set_user_paused(false);
                tracing::info!("background playback resumed");
            }
            PlayerCommand::Next | PlayerCommand::Previous if playlist.is_empty() => {
                tracing::info!("playlist is empty");
            }
            PlayerCommand::Next => {
                let idx = step(position, playlist.len(), true);
                position = Some(idx);
                start_session(&codec, &status, &playback, &mut session, playlist[idx].clone());
            }
            PlayerCommand::Previous => {
                let idx = step(position, playlist.len(), false);
                position = Some(idx);
                start_session(&codec, &status, &playback, &mut session, playlist[idx].clone());
            }
        }
    }

    cancel_session(&mut session);
}

/// Wrap-around playlist step. With nothing selected, next starts at the top and
/// previous at the bottom.
fn step(position: Option<usize>, len: usize, forward: bool) -> usize {
    match (position, forward) {
        (None, true) => 0,
        (None, false) => len - 1,
        (Some(i), true) => (i + 1) % len,
        (Some(i), false) => (i + len - 1) % len,
    }
}

fn speak_inline(codec: &Codec, playback: &PlaybackConfig, asset: &AudioAsset) -> Result<(), AudioError> {
    let _hold = codec.arbiter().hold_background();
    let mut opts = PlaybackSessionOptions::new(Priority::Voice, playback.effective_chunk_samples());
    opts.pause_poll = std::time::Duration::from_millis(playback.pause_poll_ms);
    let mut decoder = MpegFrameDecoder::new();
    let report = play_asset(codec, asset, &mut decoder, &opts)?;
    tracing::debug!(
        asset = %asset.name(),
        writes = report.playback.writes,
        samples = report.playback.samples,
        "speech played"
    );
    Ok(())
}

fn cancel_session(session: &mut Option<SessionHandle>) {
    if let Some(sess) = session.take() {
        sess.cancel.store(true, Ordering::Release);
        let _ = sess.join.join();
    }
}

fn start_session(
    codec: &Arc<Codec>,
    status: &Arc<Mutex<PlayerStatusState>>,
    playback: &PlaybackConfig,
    session: &mut Option<SessionHandle>,
    asset: AudioAsset,
) {
    cancel_session(session);

    let cancel = Arc::new(AtomicBool::new(false));
    let played = Arc::new(AtomicU64::new(0));
    let mut opts = PlaybackSessionOptions::new(Priority::Background, playback.effective_chunk_samples());
    opts.pause_poll = std::time::Duration::from_millis(playback.pause_poll_ms);
    opts.cancel = cancel.clone();
    opts.played_samples = Some(played.clone());

    {
        let mut s = status.lock().unwrap_or_else(PoisonError::into_inner);
        s.clear_playback(PlaybackEndReason::Stopped);
        s.end_reason = None;
        s.now_playing = Some(asset.name().to_string());
        s.asset_kind = Some(asset.kind().as_str().to_string());
        s.device = codec.device_name();
        s.sample_rate = Some(codec.sample_rate());
        s.played_samples = Some(played);
    }

    let codec = codec.clone();
    let status = status.clone();
    let join = std::thread::spawn(move || {
        let mut decoder = MpegFrameDecoder::new();
        let result = play_asset(&codec, &asset, &mut decoder, &opts);
        let mut s = status.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(report) => {
                tracing::info!(
                    asset = %asset.name(),
                    samples = report.playback.samples,
                    stalled_ms = report.playback.stalled.as_millis() as u64,
                    "playback finished"
                );
                s.clear_playback(PlaybackEndReason::Eof);
                if let Some(mp3) = report.mp3 {
                    s.frames_decoded = Some(mp3.frames as u64);
                    s.decode_failures = Some(mp3.failures as u64);
                }
            }
            Err(AudioError::Cancelled) => {
                tracing::info!(asset = %asset.name(), "playback cancelled");
                s.clear_playback(PlaybackEndReason::Stopped);
            }
            Err(e) => {
                tracing::warn!(asset = %asset.name(), "playback failed: {e}");
                s.clear_playback(PlaybackEndReason::Error);
            }
        }
    });

    *session = Some(SessionHandle { cancel, join });
}

#[cfg(test)]
mod tests {
    use super::*;
    use naphome_audio::Arbiter;
    use naphome_audio::sink::MemorySink;
    use naphome_audio::wav::encode_wav;
    use std::time::{Duration, Instant};

    fn setup(playlist: Vec<AudioAsset>) -> (PlayerHandle, Arc<Codec>, MemorySink, Arc<Mutex<PlayerStatusState>>) {
        let sink = MemorySink::new(16_000);
        let codec = Arc::new(Codec::new(Box::new(sink.clone()), Arbiter::shared()));
        let status = PlayerStatusState::shared();
        let (handle, _join) = spawn_player(codec.clone(), status.clone(), PlaybackConfig::default(), playlist);
        (handle, codec, sink, status)
    }

    fn tone(name: &str, samples: usize) -> AudioAsset {
        AudioAsset::new(name, encode_wav(1, 16_000, &vec![1000i16; samples]).unwrap())
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn speech_blocks_until_played() {
        let (handle, _codec, sink, _status) = setup(Vec::new());
        handle.speak_and_wait(tone("reply.wav", 4096)).unwrap();
        assert_eq!(sink.log().samples.len(), 4096);
    }

    #[test]
    fn background_play_records_end_reason() {
        let (handle, _codec, sink, status) = setup(Vec::new());
        handle.play(tone("music.wav", 2048)).unwrap();
        wait_for(|| status.lock().unwrap().end_reason == Some(PlaybackEndReason::Eof));
        assert_eq!(sink.log().samples.len(), 2048);
        assert!(status.lock().unwrap().now_playing.is_none());
    }

    #[test]
    fn broken_asset_ends_with_error() {
        let (handle, _codec, _sink, status) = setup(Vec::new());
        handle.play(AudioAsset::new("bad.wav", b"RIFF\0\0\0\0WAVEjunk".to_vec())).unwrap();
        wait_for(|| status.lock().unwrap().end_reason == Some(PlaybackEndReason::Error));
    }

    #[test]
    fn pause_and_resume_drive_the_arbiter() {
        let (handle, codec, _sink, _status) = setup(Vec::new());
        handle.pause().unwrap();
        wait_for(|| codec.arbiter().is_user_paused());
        handle.resume().unwrap();
        wait_for(|| !codec.arbiter().is_user_paused());
    }

    #[test]
    fn stop_cancels_a_paused_session() {
        let (handle, codec, sink, status) = setup(Vec::new());
        handle.pause().unwrap();
        wait_for(|| codec.arbiter().is_user_paused());
        handle.play(tone("long.wav", 16_000)).unwrap();
        wait_for(|| status.lock().unwrap().now_playing.is_some());
        handle.stop().unwrap();
        wait_for(|| status.lock().unwrap().end_reason == Some(PlaybackEndReason::Stopped));
        assert!(sink.log().samples.is_empty());
        assert!(!codec.arbiter().is_user_paused());
    }

    #[test]
    fn held_music_resumes_at_its_own_rate_after_a_reply() {
        let (handle, codec, sink, status) = setup(Vec::new());
        handle.pause().unwrap();
        wait_for(|| codec.arbiter().is_user_paused());

        let music = AudioAsset::new("music.wav", encode_wav(1, 44_100, &vec![1000i16; 3000]).unwrap());
        handle.play(music).unwrap();
        wait_for(|| sink.log().reconfigures == vec![44_100]);

        handle.speak_and_wait(tone("reply.wav", 500)).unwrap();
        assert_eq!(codec.sample_rate(), 16_000);

        handle.resume().unwrap();
        wait_for(|| status.lock().unwrap().end_reason == Some(PlaybackEndReason::Eof));

        let log = sink.log();
        assert_eq!(log.reconfigures, vec![44_100, 16_000, 44_100]);
        assert_eq!(codec.sample_rate(), 44_100);
        assert_eq!(log.samples.len(), 3500);
    }

    #[test]
    fn next_walks_the_playlist() {
        let playlist = vec![tone("a.wav", 10), tone("b.wav", 20)];
        let (handle, _codec, sink, status) = setup(playlist);
        handle.next().unwrap();
        wait_for(|| sink.log().samples.len() == 10);
        wait_for(|| status.lock().unwrap().end_reason == Some(PlaybackEndReason::Eof));
        handle.next().unwrap();
        wait_for(|| sink.log().samples.len() == 30);
    }

    #[test]
    fn step_wraps_both_ways() {
        assert_eq!(step(None, 3, true), 0);
        assert_eq!(step(None, 3, false), 2);
        assert_eq!(step(Some(2), 3, true), 0);
        assert_eq!(step(Some(0), 3, false), 2);
    }
}
