use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Upper bounds (exclusive, in days) of the nested recency windows,
/// tightest first.
pub const LAST_MONTH_DAYS: i64 = 32;
pub const LAST_3_MONTH_DAYS: i64 = 93;
pub const LAST_6_MONTH_DAYS: i64 = 184;
pub const LAST_YEAR_DAYS: i64 = 366;

/// Line counts split into nested recency windows.
///
/// A line counted in a tighter window is also counted in every looser one,
/// so `last_month <= last_3_month <= last_6_month <= last_year <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyStat {
    pub total: u64,
    pub last_month: u64,
    pub last_3_month: u64,
    pub last_6_month: u64,
    pub last_year: u64,
}

/// Which sub-counters a line of a given age falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buckets {
    pub last_month: bool,
    pub last_3_month: bool,
    pub last_6_month: bool,
    pub last_year: bool,
}

/// Map a commit age to the windows it belongs to. `total` is implied.
pub fn bucket(days_after_commit: i64) -> Buckets {
    let last_month = days_after_commit < LAST_MONTH_DAYS;
    let last_3_month = last_month || days_after_commit < LAST_3_MONTH_DAYS;
    let last_6_month = last_3_month || days_after_commit < LAST_6_MONTH_DAYS;
    let last_year = last_6_month || days_after_commit < LAST_YEAR_DAYS;
    Buckets {
        last_month,
        last_3_month,
        last_6_month,
        last_year,
    }
}

impl RecencyStat {
    /// Count one line of the given age.
    pub fn record(&mut self, days_after_commit: i64) {
        let b = bucket(days_after_commit);
        self.total += 1;
        self.last_year += b.last_year as u64;
        self.last_6_month += b.last_6_month as u64;
        self.last_3_month += b.last_3_month as u64;
        self.last_month += b.last_month as u64;
    }

    /// Field-wise addition.
    pub fn append(&mut self, other: &RecencyStat) {
        self.total += other.total;
        self.last_month += other.last_month;
        self.last_3_month += other.last_3_month;
        self.last_6_month += other.last_6_month;
        self.last_year += other.last_year;
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Share of `total` in percent, truncated.
    pub fn percent(&self, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        (100.0 * self.total as f64 / total as f64) as u64
    }

    pub fn is_nested(&self) -> bool {
        self.last_month <= self.last_3_month
            && self.last_3_month <= self.last_6_month
            && self.last_6_month <= self.last_year
            && self.last_year <= self.total
    }
}

impl AddAssign<&RecencyStat> for RecencyStat {
    fn add_assign(&mut self, rhs: &RecencyStat) {
        self.append(rhs);
    }
}

impl Add for RecencyStat {
    type Output = RecencyStat;

    fn add(mut self, rhs: RecencyStat) -> RecencyStat {
        self.append(&rhs);
        self
    }
}
