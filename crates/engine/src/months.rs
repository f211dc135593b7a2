//! Month options of the dashboard picker.

use chrono::{Datelike, Months, NaiveDate};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthOption {
    /// `YYYY-MM`, the summary key.
    pub month: String,
    /// `Mar 2025`
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthOption {
    /// The calendar month containing `day`.
    pub fn containing(day: NaiveDate) -> Self {
        let start = day.with_day(1).unwrap_or(day);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(start);
        Self {
            month: start.format("%Y-%m").to_string(),
            label: start.format("%b %Y").to_string(),
            start,
            end,
        }
    }

    pub fn parse(month: &str) -> Option<Self> {
        NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
            .ok()
            .map(Self::containing)
    }
}

/// The current month and the eleven before it, newest first.
pub fn last_12_months(today: NaiveDate) -> Vec<MonthOption> {
    let current = today.with_day(1).unwrap_or(today);
    (0..12)
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(MonthOption::containing)
        .collect()
}
