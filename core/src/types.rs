//! Shared primitive types used across the whole core.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Integer provider identifier. Graph arenas are keyed by this.
pub type ProviderId = i64;

/// Opaque beneficiary (patient) identifier.
pub type BeneficiaryId = String;

/// ISO date format used for every date stored in the claims database.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive service-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end:   NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days`-long window ending on (and including) `as_of`. A span
    /// reaching past the earliest representable date starts there instead.
    pub fn lookback(as_of: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: as_of
                .checked_sub_signed(Duration::days(span))
                .unwrap_or(NaiveDate::MIN),
            end:   as_of,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}
