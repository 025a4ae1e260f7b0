use estados_core::{Money, NormalizedRow};

/// Sum of `credit` over rows marked `si`. Missing credits count as zero.
pub fn included_credit_total(rows: &[NormalizedRow]) -> Money {
    rows.iter()
        .filter(|row| row.include.is_yes())
        .filter_map(|row| row.credit)
        .map(Money::from_decimal)
        .sum()
}
