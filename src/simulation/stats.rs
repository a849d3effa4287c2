//! Logistics statistics
//!
//! Session counters updated by the world as haulers report what they did.

use super::hauler::{HaulOutcome, RollbackReason};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogisticsStats {
    /// Ticks on which the logistics pipeline ran
    pub ticks_run: u64,

    /// Ticks skipped because the clock was paused or replaying
    pub ticks_skipped: u64,

    pub claims_submitted: u64,

    pub reservations_granted: u64,

    pub reservations_fulfilled: u64,

    pub reservations_cancelled: u64,

    /// Hauls dropped because the reservation went away underneath the hauler
    pub stale_abandonments: u64,

    /// Stalled-hauler warnings emitted, one per stall
    pub stall_warnings: u64,

    /// Whole units credited to construction sites
    pub units_delivered: u64,

    /// Carried units that could not be credited at dropoff
    pub units_returned_undelivered: f64,
}

impl LogisticsStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one hauler outcome into the counters
    pub fn record(&mut self, outcome: &HaulOutcome) {
        match outcome {
            HaulOutcome::ClaimSubmitted(_) => self.claims_submitted += 1,
            HaulOutcome::Delivered { credited, leftover } => {
                self.units_delivered += *credited as u64;
                self.units_returned_undelivered += *leftover as f64;
            }
            HaulOutcome::RolledBack(RollbackReason::ReservationStale) => {
                self.stale_abandonments += 1
            }
            _ => {}
        }
    }

    /// Get a summary string for display
    pub fn summary(&self) -> String {
        format!(
            "Ticks: {} run / {} skipped | Claims: {} | Granted: {} | Fulfilled: {} | Cancelled: {} | Delivered: {} units",
            self.ticks_run,
            self.ticks_skipped,
            self.claims_submitted,
            self.reservations_granted,
            self.reservations_fulfilled,
            self.reservations_cancelled,
            self.units_delivered
        )
    }
}
