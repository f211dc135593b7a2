//! Wire types shared with the expenses API.
//!
//! Everything here mirrors what the server sends or accepts. Normalization
//! into strict internal values happens in the `engine` crate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[macro_use]
mod macros;

/// Error returned when parsing an enum from its wire code fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: \"{}\"", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

wire_enum! {
    /// Currency of an entry. Each region of the app works in exactly one.
    pub enum Currency {
        Myr = "MYR" => "Malaysian Ringgit (MYR)",
        Inr = "INR" => "Indian Rupee (INR)",
    }
}

impl Currency {
    /// BCP 47 locale used when formatting amounts in this currency.
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Currency::Myr => "ms-MY",
            Currency::Inr => "en-IN",
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Currency::Myr => "RM",
            Currency::Inr => "₹",
        }
    }
}

wire_enum! {
    pub enum EntryType {
        Income = "income" => "Income",
        Expense = "expense" => "Expense",
        CarryForward = "carryForward" => "Carry Forward",
    }
}

wire_enum! {
    /// Payment channel. Unknown codes decode to `Unknown` so one odd record
    /// does not fail a whole page.
    pub enum Channel {
        Cash = "cash" => "Cash",
        CreditCard = "creditCard" => "Credit Card",
        DebitCard = "debitCard" => "Debit Card",
        OnlineBanking = "onlineBanking" => "Online Banking",
        Tng = "tng" => "Touch n Go",
        GrabPay = "grabPay" => "Grab Pay",
        Upi = "upi" => "UPI",
        CarryForward = "carryForward" => "Carry Forward",
        Others = "others" => "Others",
    }
    fallback Unknown
}

wire_enum! {
    pub enum Category {
        Rent = "rent" => "Home Rent",
        Groceries = "groceries" => "Groceries",
        WaterBill = "waterbill" => "Water Bill",
        ElectricityBill = "electricitybill" => "Electricity Bill",
        Internet = "internet" => "Internet Bill",
        MobileBill = "mobileBill" => "Mobile Bill",
        WaterPurifierBill = "waterPurifierBill" => "Water Purifier Bill",
        CreditCardBill = "creditCardBill" => "Credit Card Bill",
        EatingOut = "eatingout" => "Eating Out",
        Entertainment = "entertainment" => "Entertainment",
        Transportation = "transportation" => "Transportation",
        Healthcare = "healthcare" => "Healthcare",
        Education = "education" => "Education",
        Shopping = "shopping" => "Shopping",
        Cricket = "cricket" => "Cricket",
        Transfer = "transfer" => "India Transfer",
        PiggyBankSavings = "piggyBankSavings" => "Piggy Bank Savings",
        Others = "others" => "Others",
        Salary = "salary" => "Salary",
        Savings = "savings" => "Savings",
        MaidSalary = "maidSalary" => "Maid Salary",
        CarryForward = "carryForward" => "Carry Forward",
    }
    fallback Unknown
}

wire_enum! {
    pub enum SortOrder {
        Asc = "ASC" => "Oldest first",
        Desc = "DESC" => "Newest first",
    }
}

/// A number that may arrive either as a JSON number or as a decimal string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    /// Base-10 coercion. Unparseable text becomes `NaN` instead of a default,
    /// so a broken backend contract stays visible.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            LooseNumber::Number(value) => *value,
            LooseNumber::Text(text) => text.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

/// Standard `{success, data}` response wrapper.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

mod dates {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, de::Error};

    fn parse<E: Error>(raw: &str) -> Result<NaiveDate, E> {
        // Accepts plain dates and full timestamps; only the calendar day matters.
        let day = raw.trim().get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|err| E::custom(format!("invalid date \"{raw}\": {err}")))
    }

    pub(crate) fn lenient<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
    }

    pub(crate) fn lenient_opt<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => parse(&raw).map(Some),
            _ => Ok(None),
        }
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    LooseNumber::deserialize(deserializer).map(|n| n.to_f64())
}

pub mod expense {
    use chrono::NaiveDate;

    use super::*;

    /// One expense/income entry as stored by the server.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExpenseRecord {
        pub id: String,
        pub title: String,
        #[serde(deserialize_with = "lenient_amount")]
        pub amount: f64,
        #[serde(deserialize_with = "dates::lenient")]
        pub date: NaiveDate,
        #[serde(rename = "type")]
        pub entry_type: EntryType,
        pub currency: Currency,
        pub channel: Channel,
        pub category: Category,
        #[serde(default)]
        pub notes: Option<String>,
        /// Present only for credit card spending.
        #[serde(default, deserialize_with = "dates::lenient_opt")]
        pub billing_month: Option<NaiveDate>,
        #[serde(default)]
        pub is_recurring: bool,
        #[serde(default, deserialize_with = "dates::lenient_opt")]
        pub recurring_end: Option<NaiveDate>,
    }

    /// One page of `/expenses` exactly as the server sends it.
    ///
    /// `total`, `page` and `limit` have been seen both as numbers and as
    /// strings (`"1"`, `"20"`).
    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    pub struct ExpensesPageRaw {
        #[serde(default)]
        pub items: Option<Vec<ExpenseRecord>>,
        #[serde(default)]
        pub total: Option<LooseNumber>,
        #[serde(default)]
        pub page: Option<LooseNumber>,
        #[serde(default)]
        pub limit: Option<LooseNumber>,
    }

    /// Body of `POST /regular-expenses`.
    ///
    /// Dates serialize as `YYYY-MM-DD`. `billingMonth` is omitted unless the
    /// channel is a credit card.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExpenseNew {
        pub title: String,
        pub amount: f64,
        pub date: NaiveDate,
        #[serde(rename = "type")]
        pub entry_type: EntryType,
        pub currency: Currency,
        pub channel: Channel,
        pub category: Category,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub notes: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub billing_month: Option<NaiveDate>,
    }
}

pub mod summary {
    use super::*;

    /// Monthly totals computed server-side. Treated as opaque.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SummaryAggregate {
        #[serde(default, deserialize_with = "lenient_amount")]
        pub income: f64,
        #[serde(default, deserialize_with = "lenient_amount")]
        pub expense: f64,
        #[serde(default, deserialize_with = "lenient_amount")]
        pub savings: f64,
        #[serde(default, deserialize_with = "lenient_amount")]
        pub net_position: f64,
        #[serde(
            default,
            rename = "potentialNextMonthCCBill",
            deserialize_with = "lenient_amount"
        )]
        pub potential_next_month_cc_bill: f64,
    }
}

pub mod chart {
    //! Chart rows keep the key exactly as the server sent it. Besides the
    //! known codes the server emits aggregate buckets such as `other` or
    //! `Other Channels`, which are labelled as sent.
    use super::*;

    /// Label for a category key: the known label, or the key itself.
    #[must_use]
    pub fn category_label(key: &str) -> &str {
        key.parse::<Category>().map_or(key, |category| category.label())
    }

    /// Label for a channel key: the known label, or the key itself.
    #[must_use]
    pub fn channel_label(key: &str) -> &str {
        key.parse::<Channel>().map_or(key, |channel| channel.label())
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CategoryBreakdown {
        pub category: String,
        #[serde(deserialize_with = "lenient_amount")]
        pub total: f64,
    }

    /// One bar of the spending-by-category chart. The aggregated "other"
    /// bar carries the categories it folds in.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct CategoryTotal {
        pub category: String,
        #[serde(deserialize_with = "lenient_amount")]
        pub total: f64,
        #[serde(default)]
        pub breakdown: Option<Vec<CategoryBreakdown>>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ChannelBreakdown {
        pub channel: String,
        #[serde(deserialize_with = "lenient_amount")]
        pub total: f64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ChannelTotal {
        pub channel: String,
        #[serde(deserialize_with = "lenient_amount")]
        pub total: f64,
        #[serde(default)]
        pub breakdown: Option<Vec<ChannelBreakdown>>,
    }
}
