//! Teacher-forcing decay schedule.

use serde::{Deserialize, Serialize};

/// Linear decay of the teacher-forcing ratio across epochs.
///
/// The ratio starts at `initial` at epoch 0, falls linearly to
/// `final_ratio` at `decay_epochs`, and stays there for any later epoch.
/// The schedule is pure state-free arithmetic, so resuming a run at any
/// epoch reproduces the same ratio the uninterrupted run would have used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeacherForcingSchedule {
    pub initial: f64,
    pub final_ratio: f64,
    pub decay_epochs: usize,
}

impl Default for TeacherForcingSchedule {
    fn default() -> Self {
        Self {
            initial: 0.9,
            final_ratio: 0.1,
            decay_epochs: 20,
        }
    }
}

impl TeacherForcingSchedule {
    /// Ratio in effect for `epoch`.
    pub fn ratio(&self, epoch: usize) -> f64 {
        if self.decay_epochs == 0 || epoch >= self.decay_epochs {
            return self.final_ratio;
        }
        let progress = epoch as f64 / self.decay_epochs as f64;
        self.initial - (self.initial - self.final_ratio) * progress
    }
}
