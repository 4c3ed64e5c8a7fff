//! Bounded sample queue between the playback loop and the device callback.
//!
//! - the playback loop pushes mono chunks and blocks while the queue is full
//! - the output callback drains without blocking and pads underruns with silence
//!
//! `close()` releases a blocked producer so shutdown never hangs on a dead device.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct SampleQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
    capacity: usize,
}

struct QueueInner {
    samples: VecDeque<i16>,
    closed: bool,
}

/// Queue capacity in samples for `seconds` of mono audio at `rate_hz`.
///
/// Non-finite or non-positive durations fall back to half a second.
pub fn capacity_for(rate_hz: u32, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.5
    };
    ((rate_hz as f32 * secs).ceil() as usize).max(1)
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push all of `samples`, waiting for room. Returns `false` if the queue was
    /// closed before everything was accepted.
    pub fn push_blocking(&self, samples: &[i16]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
            }
            if g.closed {
                return false;
            }
            let room = self.capacity - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Fill `out` from the queue without blocking. Returns the number of samples copied.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut g = self.lock();
        let n = out.len().min(g.samples.len());
        for (slot, sample) in out.iter_mut().zip(g.samples.drain(..n)) {
            *slot = sample;
        }
        drop(g);
        if n > 0 {
            self.cv.notify_all();
        }
        n
    }

    /// Drop everything buffered (used when the stream is rebuilt at a new rate).
    pub fn clear(&self) {
        self.lock().samples.clear();
        self.cv.notify_all();
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait until the callback has consumed everything. Returns `false` on timeout.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        while !g.samples.is_empty() && !g.closed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }
        true
    }
}
