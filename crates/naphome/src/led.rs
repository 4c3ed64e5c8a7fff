//! LED face on a 12-pixel strip.
//!
//! Pixel map: right eye 2, left eye 11, ears 4 and 9, smile 5..=8. The face is
//! shared between the voice loop, the dispatcher, the demo suite and the idle
//! animation thread; callers that cannot get the lock within a few
//! milliseconds skip their update instead of queueing behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use naphome_types::TestStatus;

pub const PIXEL_COUNT: usize = 12;
pub const RIGHT_EYE: usize = 2;
pub const LEFT_EYE: usize = 11;
pub const EARS: [usize; 2] = [4, 9];
pub const SMILE: std::ops::RangeInclusive<usize> = 5..=8;

pub const IDLE_PERIOD: Duration = Duration::from_millis(1500);
const COMMAND_HOLD: Duration = Duration::from_secs(2);
const STATUS_HOLD: Duration = Duration::from_secs(1);
const LOCK_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const OFF: Rgb = Rgb(0, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const DIM_GREEN: Rgb = Rgb(0, 100, 0);
    pub const SOFT_GREEN: Rgb = Rgb(0, 150, 0);
    pub const EAR_ORANGE: Rgb = Rgb(255, 150, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
}

pub type Frame = [Rgb; PIXEL_COUNT];

/// Output for finished frames.
pub trait PixelStrip: Send {
    fn show(&mut self, frame: &Frame) -> Result<()>;
}

/// Host strip: logs each distinct frame at debug level.
#[derive(Default)]
pub struct LogStrip {
    last: Option<Frame>,
}

impl PixelStrip for LogStrip {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        if self.last.as_ref() != Some(frame) {
            let lit = frame.iter().filter(|p| **p != Rgb::OFF).count();
            tracing::debug!(lit, frame = ?frame, "led frame");
            self.last = Some(*frame);
        }
        Ok(())
    }
}

/// What the face is showing, as far as the animation thread cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceMode {
    /// Blinking eyes. Static fills survive until the next animation tick.
    Idle,
    /// Wake word heard; held until the voice loop changes it.
    Listening,
    /// Temporary face that reverts to idle at the deadline.
    Transient(Instant),
}

struct FaceState {
    strip: Box<dyn PixelStrip>,
    frame: Frame,
    mode: FaceMode,
    eyes_bright: bool,
}

impl FaceState {
    fn push(&mut self) -> bool {
        match self.strip.show(&self.frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("led strip write failed: {e:#}");
                false
            }
        }
    }

    fn draw_idle(&mut self) {
        self.frame = [Rgb::OFF; PIXEL_COUNT];
        let eyes = if self.eyes_bright {
            Rgb::GREEN
        } else {
            Rgb::DIM_GREEN
        };
        self.frame[RIGHT_EYE] = eyes;
        self.frame[LEFT_EYE] = eyes;
    }
}

pub struct LedFace {
    state: Mutex<FaceState>,
}

impl LedFace {
    pub fn new(strip: Box<dyn PixelStrip>) -> Self {
        let mut state = FaceState {
            strip,
            frame: [Rgb::OFF; PIXEL_COUNT],
            mode: FaceMode::Idle,
            eyes_bright: true,
        };
        state.draw_idle();
        state.push();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Lock with a bounded wait. `None` means another writer held it too long.
    fn lock(&self) -> Option<MutexGuard<'_, FaceState>> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        tracing::debug!("led face busy, update skipped");
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    fn update(&self, mode: FaceMode, paint: impl FnOnce(&mut Frame)) -> bool {
        let Some(mut state) = self.lock() else {
            return false;
        };
        paint(&mut state.frame);
        state.mode = mode;
        state.push()
    }

    pub fn frame(&self) -> Option<Frame> {
        self.lock().map(|s| s.frame)
    }

    pub fn mode(&self) -> Option<FaceMode> {
        self.lock().map(|s| s.mode)
    }

    pub fn idle(&self) {
        if let Some(mut state) = self.lock() {
            state.mode = FaceMode::Idle;
            state.eyes_bright = true;
            state.draw_idle();
            state.push();
        }
    }

    pub fn wake(&self) {
        self.update(FaceMode::Listening, |f| {
            *f = [Rgb::OFF; PIXEL_COUNT];
            for ear in EARS {
                f[ear] = Rgb::EAR_ORANGE;
            }
            f[RIGHT_EYE] = Rgb::GREEN;
            f[LEFT_EYE] = Rgb::GREEN;
        });
    }

    /// Green eyes and smile, back to idle after two seconds.
    pub fn command_understood(&self) {
        let until = Instant::now() + COMMAND_HOLD;
        self.update(FaceMode::Transient(until), |f| {
            *f = [Rgb::OFF; PIXEL_COUNT];
            f[RIGHT_EYE] = Rgb::GREEN;
            f[LEFT_EYE] = Rgb::GREEN;
            for i in SMILE {
                f[i] = Rgb::GREEN;
            }
        });
    }

    /// Whole strip in the status color, back to idle after one second.
    pub fn test_status(&self, status: TestStatus) {
        let color = status_color(status);
        let until = Instant::now() + STATUS_HOLD;
        self.update(FaceMode::Transient(until), |f| f.fill(color));
    }

    pub fn lights_on(&self) {
        self.update(FaceMode::Idle, |f| {
            *f = [Rgb::OFF; PIXEL_COUNT];
            f[RIGHT_EYE] = Rgb::GREEN;
            f[LEFT_EYE] = Rgb::GREEN;
            for ear in EARS {
                f[ear] = Rgb::SOFT_GREEN;
            }
            for i in SMILE {
                f[i] = Rgb::GREEN;
            }
        });
    }

    pub fn lights_off(&self) {
        self.update(FaceMode::Idle, |f| *f = [Rgb::OFF; PIXEL_COUNT]);
    }

    pub fn fill(&self, color: Rgb) {
        self.update(FaceMode::Idle, |f| f.fill(color));
    }

    /// Write a frame and report whether the strip accepted it.
    pub fn self_test(&self) -> bool {
        let Some(mut state) = self.lock() else {
            return false;
        };
        state.push()
    }

    /// One animation step: expire transient faces, blink idle eyes.
    pub fn tick(&self, now: Instant) {
        let Some(mut state) = self.lock() else {
            return;
        };
        match state.mode {
            FaceMode::Listening => {}
            FaceMode::Transient(until) if now < until => {}
            FaceMode::Transient(_) => {
                state.mode = FaceMode::Idle;
                state.eyes_bright = true;
                state.draw_idle();
                state.push();
            }
            FaceMode::Idle => {
                state.eyes_bright = !state.eyes_bright;
                state.draw_idle();
                state.push();
            }
        }
    }
}

pub fn status_color(status: TestStatus) -> Rgb {
    match status {
        TestStatus::Pass => Rgb::GREEN,
        TestStatus::Warning => Rgb::YELLOW,
        TestStatus::Fail => Rgb::RED,
        TestStatus::NotImplemented => Rgb::BLUE,
    }
}

/// Drive [`LedFace::tick`]. Transient faces are checked every 100 ms, idle
/// eyes toggle every `period`.
pub fn spawn_animation(
    face: Arc<LedFace>,
    period: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("led-animation".to_string())
        .spawn(move || {
            let step = Duration::from_millis(100);
            let mut next_blink = Instant::now() + period;
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(step);
                let now = Instant::now();
                match face.mode() {
                    Some(FaceMode::Transient(until)) if now >= until => {
                        face.tick(now);
                        next_blink = now + period;
                    }
                    Some(FaceMode::Idle) if now >= next_blink => {
                        face.tick(now);
                        next_blink = now + period;
                    }
                    _ => {}
                }
            }
        })
}
