//! Currency rounding and display. Amounts are stored unrounded in `f64`;
//! the ledger compares settled balances at the precision of [`round_currency`].

/// Round to two decimal places.
pub fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Whole-unit amount with thousands separators, e.g. `1,250`.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Amount prefixed with the country's currency symbol, e.g. `KSh 1,250`.
pub fn format_currency(amount: f64, symbol: &str) -> String {
    format!("{symbol} {}", format_amount(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(1250.0), "1,250");
        assert_eq!(format_amount(50_000_000.0), "50,000,000");
        assert_eq!(format_amount(-1500.4), "-1,500");
    }

    #[test]
    fn formats_with_symbol() {
        assert_eq!(format_currency(1100.0, "KSh"), "KSh 1,100");
        assert_eq!(format_currency(1249.6, "UGX"), "UGX 1,250");
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_currency(142.857_142), 142.86);
        assert_eq!(round_currency(100.0), 100.0);
    }
}
