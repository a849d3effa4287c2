//! Simulation clock
//!
//! Fixed-timestep clock consumed by every logistics component. Nothing runs
//! while the clock is paused or replaying history.

use super::types::Tick;

/// Which timeline the clock is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineMode {
    /// Primary timeline; state may be mutated
    #[default]
    Record,
    /// Historical rewind or playback; state must not be touched
    Playback,
}

#[derive(Debug, Clone)]
pub struct SimClock {
    tick: Tick,
    delta_secs: f32,
    paused: bool,
    mode: TimelineMode,
}

impl SimClock {
    pub fn new(delta_secs: f32) -> Self {
        Self {
            tick: 0,
            delta_secs,
            paused: false,
            mode: TimelineMode::Record,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn delta_secs(&self) -> f32 {
        self.delta_secs
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn mode(&self) -> TimelineMode {
        self.mode
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_mode(&mut self, mode: TimelineMode) {
        self.mode = mode;
    }

    /// True when logistics systems are allowed to run this tick
    pub fn is_live(&self) -> bool {
        !self.paused && self.mode == TimelineMode::Record
    }

    pub(crate) fn advance(&mut self) {
        self.tick += 1;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0.1)
    }
}
