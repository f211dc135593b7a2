use api_types::Currency;

/// How the integer part of an amount is grouped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grouping {
    /// `1,234,567`
    Thousands,
    /// `12,34,567`: the last three digits, then pairs.
    Indian,
}

impl Grouping {
    pub const fn for_currency(currency: Currency) -> Self {
        match currency {
            Currency::Myr => Self::Thousands,
            Currency::Inr => Self::Indian,
        }
    }

    fn apply(self, digits: &str) -> String {
        let len = digits.len();
        if len <= 3 {
            return digits.to_string();
        }
        let (head, tail) = digits.split_at(len - 3);
        let step = match self {
            Self::Thousands => 3,
            Self::Indian => 2,
        };

        let mut groups = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(step);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        groups.push(tail);
        groups.join(",")
    }
}

/// Formats an amount the way the currency's locale shows it.
///
/// Returns an empty string for `NaN`, so a broken number renders as nothing
/// rather than as a wrong figure.
///
/// # Examples
///
/// ```rust
/// use api_types::Currency;
/// use engine::format_currency;
///
/// assert_eq!(format_currency(1234.5, Currency::Myr, 2), "RM1,234.50");
/// assert_eq!(format_currency(1234567.0, Currency::Inr, 2), "₹12,34,567.00");
/// assert_eq!(format_currency(f64::NAN, Currency::Myr, 2), "");
/// ```
pub fn format_currency(amount: f64, currency: Currency, decimals: usize) -> String {
    if amount.is_nan() {
        return String::new();
    }
    let symbol = currency.symbol();
    if amount.is_infinite() {
        let sign = if amount < 0.0 { "-" } else { "" };
        return format!("{sign}{symbol}∞");
    }

    let rendered = format!("{:.*}", decimals, amount.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (rendered.as_str(), None),
    };
    let is_zero = rendered.bytes().all(|b| b == b'0' || b == b'.');
    let sign = if amount < 0.0 && !is_zero { "-" } else { "" };

    let grouped = Grouping::for_currency(currency).apply(int_part);
    match frac_part {
        Some(frac) => format!("{sign}{symbol}{grouped}.{frac}"),
        None => format!("{sign}{symbol}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ringgit_uses_thousands() {
        assert_eq!(format_currency(0.0, Currency::Myr, 2), "RM0.00");
        assert_eq!(format_currency(999.999, Currency::Myr, 2), "RM1,000.00");
        assert_eq!(format_currency(1_234_567.891, Currency::Myr, 2), "RM1,234,567.89");
    }

    #[test]
    fn rupee_uses_indian_grouping() {
        assert_eq!(format_currency(1000.0, Currency::Inr, 2), "₹1,000.00");
        assert_eq!(format_currency(100_000.0, Currency::Inr, 2), "₹1,00,000.00");
        assert_eq!(format_currency(123_456_789.0, Currency::Inr, 2), "₹12,34,56,789.00");
    }

    #[test]
    fn negative_amounts_lead_with_the_sign() {
        assert_eq!(format_currency(-1500.0, Currency::Myr, 2), "-RM1,500.00");
        assert_eq!(format_currency(-0.001, Currency::Myr, 2), "RM0.00");
    }

    #[test]
    fn decimals_are_configurable() {
        assert_eq!(format_currency(1234.6, Currency::Myr, 0), "RM1,235");
        assert_eq!(format_currency(12.3456, Currency::Inr, 3), "₹12.346");
    }

    #[test]
    fn nan_is_blank() {
        assert_eq!(format_currency(f64::NAN, Currency::Inr, 2), "");
    }
}
