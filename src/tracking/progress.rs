//! Schedule derived journey progress

use time::OffsetDateTime;

/// Scheduled departure/arrival window of a trip
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduleWindow {
    pub departure: OffsetDateTime,
    pub arrival: OffsetDateTime,
}

impl ScheduleWindow {
    pub fn new(departure: OffsetDateTime, arrival: OffsetDateTime) -> Self {
        Self { departure, arrival }
    }

    /// Fraction of the window elapsed at `now`, clamped to [0, 1]
    ///
    /// A window that never opens (arrival at or before departure) reports
    /// 0 before the departure and 1 from the departure on.
    pub fn progress_at(&self, now: OffsetDateTime) -> f64 {
        if self.arrival <= self.departure {
            return if now >= self.departure { 1.0 } else { 0.0 };
        }

        let total = (self.arrival - self.departure).as_seconds_f64();
        let elapsed = (now - self.departure).as_seconds_f64();

        (elapsed / total).clamp(0.0, 1.0)
    }

    /// Progress against the current wall clock
    pub fn progress_now(&self) -> f64 {
        self.progress_at(OffsetDateTime::now_utc())
    }

    /// Progress as a whole percentage, for display
    pub fn percent_at(&self, now: OffsetDateTime) -> u8 {
        (self.progress_at(now) * 100.0).round() as u8
    }
}
