//! Net position rating of a monthly summary.

use api_types::summary::SummaryAggregate;

/// Share of income kept after outflows, in percent, that counts as healthy.
pub const EXCELLENT_RATIO: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rating {
    Excellent,
    NeedsImprovement,
    Critical,
}

impl Rating {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::NeedsImprovement => "Needs Improvement",
            Self::Critical => "Critical",
        }
    }

    /// Rates a ratio in percent. `NaN` is never good news.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= EXCELLENT_RATIO {
            Self::Excellent
        } else if ratio >= 0.0 {
            Self::NeedsImprovement
        } else {
            Self::Critical
        }
    }
}

/// `net_position / income * 100`, with plain float semantics: zero income
/// gives an infinite or `NaN` ratio.
pub fn net_position_ratio(aggregate: &SummaryAggregate) -> f64 {
    aggregate.net_position / aggregate.income * 100.0
}

pub fn rating(aggregate: &SummaryAggregate) -> Rating {
    Rating::from_ratio(net_position_ratio(aggregate))
}

/// Savings as a percent of income, only when both are positive.
pub fn savings_percent(aggregate: &SummaryAggregate) -> Option<f64> {
    (aggregate.savings > 0.0 && aggregate.income > 0.0)
        .then(|| aggregate.savings / aggregate.income * 100.0)
}
