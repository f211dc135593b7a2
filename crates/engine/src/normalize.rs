//! Coercion of loosely-typed `/expenses` pages into [`ExpensesPage`].

use api_types::{
    Envelope,
    expense::{ExpenseRecord, ExpensesPageRaw},
};
use serde_json::Value;

use crate::EngineError;

pub const DEFAULT_TOTAL: f64 = 0.0;
pub const DEFAULT_PAGE: f64 = 1.0;
pub const DEFAULT_LIMIT: f64 = 20.0;

/// One fetched page of records plus its pagination metadata.
///
/// The numeric fields are `f64` on purpose: a numeric string the server
/// mangled becomes `NaN` and stays that way.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpensesPage {
    pub items: Vec<ExpenseRecord>,
    pub total: f64,
    pub page: f64,
    pub limit: f64,
}

impl ExpensesPage {
    /// `false` when any metadata field failed to parse.
    pub fn is_well_formed(&self) -> bool {
        self.total.is_finite() && self.page.is_finite() && self.limit.is_finite()
    }
}

pub fn normalize_page(raw: ExpensesPageRaw) -> ExpensesPage {
    ExpensesPage {
        items: raw.items.unwrap_or_default(),
        total: raw.total.map_or(DEFAULT_TOTAL, |n| n.to_f64()),
        page: raw.page.map_or(DEFAULT_PAGE, |n| n.to_f64()),
        limit: raw.limit.map_or(DEFAULT_LIMIT, |n| n.to_f64()),
    }
}

/// Decodes a full `{success, data}` response body and normalizes its page.
pub fn decode_page(body: Value) -> Result<ExpensesPage, EngineError> {
    let envelope: Envelope<ExpensesPageRaw> = serde_json::from_value(body)?;
    let raw = envelope
        .data
        .ok_or_else(|| EngineError::MalformedPayload("missing \"data\" in expenses page".to_string()))?;
    Ok(normalize_page(raw))
}
