//! Query filters and the cache keys derived from them.

use std::fmt;

use api_types::{Currency, SortOrder};
use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::transport::Params;

/// Logical family of a cached query. Invalidation matches on this tag, not
/// on the full signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryCategory {
    Expenses,
    Summary,
}

impl QueryCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expenses => "expenses",
            Self::Summary => "summary",
        }
    }
}

/// Cache key: a category tag plus the serialized filters.
///
/// Two requests with equal filters always produce equal keys; any differing
/// filter produces a different one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    category: QueryCategory,
    signature: String,
}

impl QueryKey {
    pub fn new(category: QueryCategory, params: &Params) -> Self {
        // serde_json's map keeps keys sorted, so field order never matters.
        let map: Map<String, Value> = params
            .iter()
            .map(|(key, value)| ((*key).to_string(), Value::String(value.clone())))
            .collect();
        Self {
            category,
            signature: Value::Object(map).to_string(),
        }
    }

    pub fn category(&self) -> QueryCategory {
        self.category
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category.as_str(), self.signature)
    }
}

/// Filters of the paginated expense list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpenseFilters {
    pub q: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<u32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub currency: Option<Currency>,
}

impl ExpenseFilters {
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(q) = self.q.as_deref().filter(|q| !q.is_empty()) {
            params.push(("q", q.to_string()));
        }
        if let Some(order) = self.order {
            params.push(("order", order.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(start) = self.start {
            params.push(("start", start.to_string()));
        }
        if let Some(end) = self.end {
            params.push(("end", end.to_string()));
        }
        if let Some(currency) = self.currency {
            params.push(("currency", currency.as_str().to_string()));
        }
        params
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(QueryCategory::Expenses, &self.params())
    }
}

/// Key of a monthly summary: `month` is `YYYY-MM`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryQuery {
    pub month: String,
    pub currency: Currency,
}

impl SummaryQuery {
    pub fn params(&self) -> Params {
        vec![
            ("month", self.month.clone()),
            ("currency", self.currency.as_str().to_string()),
        ]
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::new(QueryCategory::Summary, &self.params())
    }
}

/// Date range and currency of the breakdown charts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartFilters {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub currency: Currency,
}

impl ChartFilters {
    pub fn params(&self) -> Params {
        vec![
            ("start", self.start.to_string()),
            ("end", self.end.to_string()),
            ("currency", self.currency.as_str().to_string()),
        ]
    }
}
