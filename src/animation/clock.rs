use log::warn;
use serde::Serialize;

pub const MIN_SPEED: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Decides which frame should be showing, given monotonic time in seconds
/// supplied by the host.
///
/// Every method that can change the visible frame returns `Some(index)` when
/// that frame needs to be rendered.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    durations: Vec<f64>,
    state: PlayState,
    current_index: Option<usize>,
    last_advance: f64,
    // Time already spent on the current frame when playback was paused
    carried: f64,
    speed: f32,
}

impl PlaybackClock {
    pub fn new(durations: Vec<f64>) -> PlaybackClock {
        assert!(!durations.is_empty(), "PlaybackClock needs at least one frame");

        PlaybackClock {
            durations,
            state: PlayState::Stopped,
            current_index: None,
            last_advance: 0.0,
            carried: 0.0,
            speed: 1.0,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn frame_count(&self) -> usize {
        self.durations.len()
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Sets the playback rate. Values below [`MIN_SPEED`] are clamped.
    pub fn set_speed(&mut self, multiplier: f32) {
        if !multiplier.is_finite() {
            warn!("Ignoring non-finite playback speed {}", multiplier);
            return;
        }

        self.speed = multiplier.max(MIN_SPEED);
    }

    pub fn next_frame_index(&self) -> usize {
        match self.current_index {
            Some(index) => (index + 1) % self.durations.len(),
            None => 0,
        }
    }

    pub fn play(&mut self, now: f64) -> Option<usize> {
        if self.state == PlayState::Playing {
            return None;
        }

        let render = match self.current_index {
            None => {
                self.current_index = Some(0);
                Some(0)
            }
            Some(_) => None,
        };

        self.last_advance = now - self.carried;
        self.carried = 0.0;
        self.state = PlayState::Playing;

        render
    }

    pub fn pause(&mut self, now: f64) {
        if self.state != PlayState::Playing {
            return;
        }

        self.carried = (now - self.last_advance).max(0.0);
        self.state = PlayState::Paused;
    }

    /// Stops playback and rewinds to the first frame, which must be redrawn.
    pub fn stop(&mut self) -> Option<usize> {
        self.state = PlayState::Stopped;
        self.current_index = Some(0);
        self.carried = 0.0;

        Some(0)
    }

    /// Back to the initial state with nothing shown.
    pub fn reset(&mut self) {
        self.state = PlayState::Stopped;
        self.current_index = None;
        self.last_advance = 0.0;
        self.carried = 0.0;
    }

    /// Advances at most one frame per call, no matter how much time has
    /// passed since the last advance.
    pub fn tick(&mut self, now: f64) -> Option<usize> {
        if self.state != PlayState::Playing {
            return None;
        }

        let current = self.current_index?;
        let due = self.durations[current] / self.speed as f64;

        if now - self.last_advance >= due {
            let next = self.next_frame_index();
            self.current_index = Some(next);
            self.last_advance = now;

            return Some(next);
        }

        None
    }
}
