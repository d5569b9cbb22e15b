use chrono::{Datelike, NaiveDate};

/// Calendar fields derived from a single date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFeatures {
    pub month: u32,
    pub day: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub quarter: u32,
    pub is_weekend: u32,
    pub season: u32,
}

/// Column names in the order they are emitted.
pub const TEMPORAL_COLUMNS: [&str; 6] = [
    "month",
    "day",
    "day_of_week",
    "quarter",
    "is_weekend",
    "season",
];

impl TemporalFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let month = date.month();
        let day_of_week = date.weekday().num_days_from_monday();
        TemporalFeatures {
            month,
            day: date.day(),
            day_of_week,
            quarter: quarter_of(month),
            is_weekend: is_weekend(day_of_week),
            season: season_of(month),
        }
    }

    pub fn columns(&self) -> [(&'static str, f64); 6] {
        [
            ("month", self.month as f64),
            ("day", self.day as f64),
            ("day_of_week", self.day_of_week as f64),
            ("quarter", self.quarter as f64),
            ("is_weekend", self.is_weekend as f64),
            ("season", self.season as f64),
        ]
    }
}

pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

/// 1 = winter, 2 = spring, 3 = summer, 4 = fall.
pub fn season_of(month: u32) -> u32 {
    match month {
        12 | 1 | 2 => 1,
        3..=5 => 2,
        6..=8 => 3,
        _ => 4,
    }
}

pub fn is_weekend(day_of_week: u32) -> u32 {
    u32::from(day_of_week >= 5)
}
