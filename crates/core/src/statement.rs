use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a movement counts towards the income total (`Considerar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Include {
    #[default]
    #[serde(rename = "si")]
    Yes,
    #[serde(rename = "no")]
    No,
}

impl Include {
    pub fn is_yes(self) -> bool {
        self == Include::Yes
    }

    pub fn label(self) -> &'static str {
        match self {
            Include::Yes => "si",
            Include::No => "no",
        }
    }
}

impl fmt::Display for Include {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Include {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "si" | "sí" | "yes" => Ok(Include::Yes),
            "no" => Ok(Include::No),
            other => Err(format!("Unknown include flag: '{other}'")),
        }
    }
}

/// One statement line after column selection and amount coercion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// Transaction label; Afirme's `Concepto`, Hey's `Descripción`.
    pub concept: String,
    pub date: String,
    pub reference: Option<String>,
    pub charge: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub balance: Option<String>,
    /// Hey's own category column, carried through untouched.
    pub classification: Option<String>,
    pub comment: String,
    pub include: Include,
}

impl NormalizedRow {
    /// Resets the classifier output to its pre-rule state.
    pub fn reset_classification(&mut self) {
        self.comment.clear();
        self.include = Include::Yes;
    }
}

/// Logical columns a statement can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Concept,
    Date,
    Reference,
    Charge,
    Credit,
    Balance,
    Classification,
    Comment,
    Include,
}

/// A column as it appears in a bank's file and in the exported workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub field: Field,
    pub header: &'static str,
}

impl ColumnSpec {
    pub const fn new(field: Field, header: &'static str) -> Self {
        Self { field, header }
    }
}

/// The value of one cell, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue<'a> {
    Text(&'a str),
    Amount(Decimal),
    Empty,
}

impl NormalizedRow {
    pub fn cell(&self, field: Field) -> CellValue<'_> {
        fn text(value: Option<&str>) -> CellValue<'_> {
            match value {
                Some(s) if !s.is_empty() => CellValue::Text(s),
                _ => CellValue::Empty,
            }
        }
        match field {
            Field::Concept => text(Some(self.concept.as_str())),
            Field::Date => text(Some(self.date.as_str())),
            Field::Reference => text(self.reference.as_deref()),
            Field::Charge => self.charge.map_or(CellValue::Empty, CellValue::Amount),
            Field::Credit => self.credit.map_or(CellValue::Empty, CellValue::Amount),
            Field::Balance => text(self.balance.as_deref()),
            Field::Classification => text(self.classification.as_deref()),
            Field::Comment => text(Some(self.comment.as_str())),
            Field::Include => CellValue::Text(self.include.label()),
        }
    }
}

/// Classified rows in file order, plus the column layout they export with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedTable {
    pub columns: &'static [ColumnSpec],
    pub rows: Vec<NormalizedRow>,
}

impl AnnotatedTable {
    pub fn new(columns: &'static [ColumnSpec], rows: Vec<NormalizedRow>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.header)
    }
}
