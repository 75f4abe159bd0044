//! Virtual "shader time" that can be paused, resumed, and rewound
//! independently of how often frames are rendered.
//!
//! Every transition has an `*_at(now)` form so callers (and tests) can drive
//! the clock from a fixed timeline; the plain forms sample `Instant::now()`.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct VirtualClock {
    epoch: Instant,
    accumulated_pause: Duration,
    pause_started_at: Option<Instant>,
    current: Duration,
    delta: Duration,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            epoch: now,
            accumulated_pause: Duration::ZERO,
            pause_started_at: None,
            current: Duration::ZERO,
            delta: Duration::ZERO,
        }
    }

    /// Shader time as of the last update.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Time advanced by the last update; zero while paused.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&mut self, now: Instant) {
        if self.is_paused() {
            self.delta = Duration::ZERO;
            return;
        }
        let running = now
            .saturating_duration_since(self.epoch)
            .saturating_sub(self.accumulated_pause);
        // Instants older than the last update must not rewind the clock.
        let next = running.max(self.current);
        self.delta = next - self.current;
        self.current = next;
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub fn pause_at(&mut self, now: Instant) {
        if self.is_paused() {
            return;
        }
        self.update_at(now);
        self.delta = Duration::ZERO;
        self.pause_started_at = Some(now);
    }

    pub fn play(&mut self) {
        self.play_at(Instant::now());
    }

    pub fn play_at(&mut self, now: Instant) {
        if let Some(started) = self.pause_started_at.take() {
            self.accumulated_pause += now.saturating_duration_since(started);
        }
    }

    pub fn toggle(&mut self) {
        self.toggle_at(Instant::now());
    }

    pub fn toggle_at(&mut self, now: Instant) {
        if self.is_paused() {
            self.play_at(now);
        } else {
            self.pause_at(now);
        }
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        *self = Self::starting_at(now);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}
