//! Client-side validation of new entries.
//!
//! The server has the final word; this only stops obviously broken drafts
//! from being sent and tells the user which field to fix.

use std::fmt;

use api_types::{Category, Channel, Currency, EntryType, expense::ExpenseNew};
use chrono::NaiveDate;

/// Smallest accepted amount.
pub const MIN_AMOUNT: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Amount,
    Date,
    Type,
    Currency,
    Channel,
    Category,
    BillingMonth,
}

impl Field {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Amount => "amount",
            Self::Date => "date",
            Self::Type => "type",
            Self::Currency => "currency",
            Self::Channel => "channel",
            Self::Category => "category",
            Self::BillingMonth => "billingMonth",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

/// Every failing field of a draft, in form order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: Field, message: &str) {
        self.errors.push(FieldError {
            field,
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn field(&self, field: Field) -> Option<&FieldError> {
        self.errors.iter().find(|err| err.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", err.field.as_str(), err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Raw form values, as typed by the user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpenseDraft {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
    pub entry_type: Option<String>,
    pub currency: Option<String>,
    pub channel: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub billing_month: Option<NaiveDate>,
}

fn required<T: std::str::FromStr>(
    raw: Option<&str>,
    field: Field,
    missing: &str,
    invalid: &str,
    errors: &mut ValidationErrors,
) -> Option<T> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty());
    let Some(raw) = raw else {
        errors.push(field, missing);
        return None;
    };
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(field, invalid);
            None
        }
    }
}

impl ExpenseDraft {
    /// Checks every field and builds the request body.
    ///
    /// `billingMonth` is required for credit card spending and dropped for
    /// every other channel.
    pub fn validate(&self) -> Result<ExpenseNew, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty());
        if title.is_none() {
            errors.push(Field::Title, "Title is required");
        }

        let amount = match self.amount {
            None => {
                errors.push(Field::Amount, "Amount is required");
                None
            }
            Some(amount) if amount.is_nan() => {
                errors.push(Field::Amount, "Amount is required");
                None
            }
            Some(amount) if amount < MIN_AMOUNT => {
                errors.push(Field::Amount, "Amount must be greater than 0");
                None
            }
            Some(amount) => Some(amount),
        };

        if self.date.is_none() {
            errors.push(Field::Date, "Date is required");
        }

        let entry_type: Option<EntryType> = required(
            self.entry_type.as_deref(),
            Field::Type,
            "Type is required",
            "Type is invalid",
            &mut errors,
        );
        // Anything outside MYR/INR reads as "not chosen" on the form.
        let currency: Option<Currency> = required(
            self.currency.as_deref(),
            Field::Currency,
            "Currency is required",
            "Currency is required",
            &mut errors,
        );
        let channel: Option<Channel> = required(
            self.channel.as_deref(),
            Field::Channel,
            "Channel is required",
            "Channel is invalid",
            &mut errors,
        );
        let category: Option<Category> = required(
            self.category.as_deref(),
            Field::Category,
            "Category is required",
            "Category is invalid",
            &mut errors,
        );

        let is_credit_card = channel == Some(Channel::CreditCard);
        if is_credit_card && self.billing_month.is_none() {
            errors.push(Field::BillingMonth, "Billing Month is required");
        }

        match (title, amount, self.date, entry_type, currency, channel, category) {
            (
                Some(title),
                Some(amount),
                Some(date),
                Some(entry_type),
                Some(currency),
                Some(channel),
                Some(category),
            ) if errors.is_empty() => Ok(ExpenseNew {
                title: title.to_string(),
                amount,
                date,
                entry_type,
                currency,
                channel,
                category,
                notes: self
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .map(str::to_string),
                billing_month: if is_credit_card {
                    self.billing_month
                } else {
                    None
                },
            }),
            _ => Err(errors),
        }
    }
}
