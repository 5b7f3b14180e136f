/// Integer division rounding half up. Both operands are expected non-negative.
pub fn round_div(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    (numerator + denominator / 2) / denominator
}

/// Unit price after a percentage discount, rounded to the nearest cent.
pub fn discounted_cents(base_cents: i64, discount_pct: u32) -> i64 {
    let pct = i64::from(discount_pct.min(100));
    round_div(base_cents * (100 - pct), 100)
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Formats cents as en-US dollars, e.g. `$1,234.56`.
pub fn format_usd(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let remainder = abs % 100;

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{remainder:02}")
}
