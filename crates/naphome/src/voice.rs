//! Wake word / command loop.
//!
//! A [`Recognizer`] turns input into [`VoiceEvent`]s; the detect loop moves the
//! arbiter through idle, listening and processing, updates the face and hands
//! commands to the dispatcher.

use std::collections::VecDeque;
use std::io::BufRead;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use naphome_audio::Arbiter;
use naphome_types::VoiceState;

use crate::dispatcher::{Command, Dispatcher};
use crate::led::LedFace;

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    WakeWord,
    Command {
        command: Command,
        /// Captured audio, when the recognizer has any.
        audio: Option<Vec<i16>>,
    },
    /// Listening window closed without a command.
    Timeout,
}

pub trait Recognizer: Send {
    /// Block for the next event. `None` once the input is exhausted.
    fn next_event(&mut self) -> Option<VoiceEvent>;
}

/// Text recognizer over a stream of lines.
///
/// A line starting with the wake phrase raises `WakeWord`, and the rest of the
/// line (if any) becomes a command. While listening, any other line is a
/// command; after `listen_timeout` without input the window closes.
pub struct LineRecognizer {
    lines: Receiver<String>,
    wake_phrase: String,
    listen_timeout: Duration,
    listening: bool,
    pending: VecDeque<VoiceEvent>,
}

impl LineRecognizer {
    pub fn new(lines: Receiver<String>, wake_phrase: &str, listen_timeout: Duration) -> Self {
        Self {
            lines,
            wake_phrase: wake_phrase.trim().to_lowercase(),
            listen_timeout,
            listening: false,
            pending: VecDeque::new(),
        }
    }

    /// Lines from stdin, read on a helper thread.
    pub fn stdin(wake_phrase: &str, listen_timeout: Duration) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self::new(rx, wake_phrase, listen_timeout))
    }

    fn accept(&mut self, line: &str) -> Option<VoiceEvent> {
        let text = line.trim().to_lowercase();
        if let Some(rest) = text.strip_prefix(&self.wake_phrase) {
            let rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            self.listening = true;
            if !rest.is_empty() {
                self.pending.push_back(command_event(rest));
            }
            return Some(VoiceEvent::WakeWord);
        }
        if self.listening && !text.is_empty() {
            return Some(command_event(&text));
        }
        tracing::debug!(line = %text, "ignored input while idle");
        None
    }
}

/// `#13` or `13` selects a command id; anything else is a phrase.
fn command_event(text: &str) -> VoiceEvent {
    let command = match text.trim_start_matches('#').parse::<i32>() {
        Ok(id) => Command::id(id),
        Err(_) => Command::phrase(text),
    };
    VoiceEvent::Command {
        command,
        audio: None,
    }
}

impl Recognizer for LineRecognizer {
    fn next_event(&mut self) -> Option<VoiceEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let line = if self.listening {
                match self.lines.recv_timeout(self.listen_timeout) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => {
                        self.listening = false;
                        return Some(VoiceEvent::Timeout);
                    }
                    Err(RecvTimeoutError::Disconnected) => return None,
                }
            } else {
                self.lines.recv().ok()?
            };
            if let Some(event) = self.accept(&line) {
                return Some(event);
            }
        }
    }
}

/// Drive the voice pipeline until the recognizer runs dry.
pub fn run_detect_loop(
    recognizer: &mut dyn Recognizer,
    arbiter: &Arbiter,
    face: &LedFace,
    dispatcher: &Dispatcher,
) {
    tracing::info!("voice loop ready");
    while let Some(event) = recognizer.next_event() {
        match event {
            VoiceEvent::WakeWord => {
                tracing::info!("wake word detected");
                arbiter.set_voice_state(VoiceState::Listening);
                face.wake();
            }
            VoiceEvent::Command { command, audio } => {
                arbiter.set_voice_state(VoiceState::Processing);
                dispatcher.handle(&command, audio.as_deref());
                arbiter.set_voice_state(VoiceState::Listening);
            }
            VoiceEvent::Timeout => {
                tracing::info!("listening timed out");
                arbiter.set_voice_state(VoiceState::Idle);
                face.idle();
            }
        }
    }
    arbiter.set_voice_state(VoiceState::Idle);
    tracing::info!("voice input closed");
}
