use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do with amount cells that are not numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Unparseable amounts silently become missing.
    #[default]
    Lenient,
    /// Unparseable amounts still become missing, but each one is reported.
    Strict,
}

/// A non-empty amount cell that could not be read as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountWarning {
    /// Zero-based data row, in file order.
    pub row: usize,
    pub column: String,
    pub raw: String,
}

/// Strips `$` and thousands separators and parses what is left.
/// Empty or non-numeric text gives `None`; this never fails.
pub fn coerce_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.replace(['$', ','], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(cleaned)
        .or_else(|_| Decimal::from_scientific(cleaned))
        .ok()
}

/// Coerces amount cells for one parse, remembering failures under the strict policy.
#[derive(Debug)]
pub(crate) struct AmountReader {
    policy: AmountPolicy,
    warnings: Vec<AmountWarning>,
}

impl AmountReader {
    pub fn new(policy: AmountPolicy) -> Self {
        Self { policy, warnings: Vec::new() }
    }

    pub fn read(&mut self, raw: &str, row: usize, column: &str) -> Option<Decimal> {
        let value = coerce_amount(raw);
        if value.is_none() && !raw.trim().is_empty() {
            match self.policy {
                AmountPolicy::Lenient => {
                    tracing::debug!(row, column, raw, "unparseable amount treated as missing");
                }
                AmountPolicy::Strict => {
                    tracing::warn!(row, column, raw, "unparseable amount treated as missing");
                    self.warnings.push(AmountWarning {
                        row,
                        column: column.to_string(),
                        raw: raw.to_string(),
                    });
                }
            }
        }
        value
    }

    pub fn into_warnings(self) -> Vec<AmountWarning> {
        self.warnings
    }
}
