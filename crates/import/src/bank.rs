use estados_core::{ColumnSpec, Field, Include, NormalizedRow};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::{AmountPolicy, AmountReader, AmountWarning};
use crate::rules::{ClassificationRule, MatchType, RuleSet};
use crate::table::{cell, optional_cell, ParseError, RawTable};

/// Rows read from one upload, before classification.
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub rows: Vec<NormalizedRow>,
    /// Only filled under [`AmountPolicy::Strict`].
    pub warnings: Vec<AmountWarning>,
}

/// One bank export format: how to read it and how to classify its lines.
pub trait BankVariant: Send + Sync {
    /// Selector used in URLs and logs.
    fn name(&self) -> &'static str;

    /// Download name for the annotated workbook.
    fn export_filename(&self) -> &'static str;

    /// Columns in source order, followed by `Comentarios` and `Considerar`.
    fn columns(&self) -> &'static [ColumnSpec];

    fn parse(&self, data: &[u8], policy: AmountPolicy) -> Result<ParsedRows, ParseError>;

    fn rules(&self) -> RuleSet;

    fn classify(&self, mut rows: Vec<NormalizedRow>) -> Vec<NormalizedRow> {
        self.rules().apply(&mut rows);
        rows
    }
}

// ── Column layouts ────────────────────────────────────────────────────────────

pub const COMMENT_HEADER: &str = "Comentarios";
pub const INCLUDE_HEADER: &str = "Considerar";

pub const AFIRME_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new(Field::Concept, "Concepto"),
    ColumnSpec::new(Field::Date, "Fecha"),
    ColumnSpec::new(Field::Reference, "Referencia"),
    ColumnSpec::new(Field::Charge, "Cargo"),
    ColumnSpec::new(Field::Credit, "Abono"),
    ColumnSpec::new(Field::Balance, "Saldo"),
    ColumnSpec::new(Field::Comment, COMMENT_HEADER),
    ColumnSpec::new(Field::Include, INCLUDE_HEADER),
];

pub const AFIRME_CSV_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new(Field::Concept, "Concepto"),
    ColumnSpec::new(Field::Date, "Fecha (DD/MM/AA)"),
    ColumnSpec::new(Field::Reference, "Referencia"),
    ColumnSpec::new(Field::Charge, "Cargo"),
    ColumnSpec::new(Field::Credit, "Abono"),
    ColumnSpec::new(Field::Balance, "Saldo"),
    ColumnSpec::new(Field::Comment, COMMENT_HEADER),
    ColumnSpec::new(Field::Include, INCLUDE_HEADER),
];

pub const HEY_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new(Field::Date, "Fecha"),
    ColumnSpec::new(Field::Concept, "Descripción"),
    ColumnSpec::new(Field::Reference, "Referencia"),
    ColumnSpec::new(Field::Charge, "Cargo"),
    ColumnSpec::new(Field::Credit, "Abonos"),
    ColumnSpec::new(Field::Balance, "Saldo"),
    ColumnSpec::new(Field::Classification, "Clasificación"),
    ColumnSpec::new(Field::Comment, COMMENT_HEADER),
    ColumnSpec::new(Field::Include, INCLUDE_HEADER),
];

/// Leading rows above the header in Afirme's workbook export.
pub const AFIRME_HEADER_ROW: usize = 7;
/// Leading lines above the header in Hey's CSV export.
pub const HEY_SKIP_LINES: usize = 9;

/// Source columns (everything but the classifier output).
fn source_columns(columns: &'static [ColumnSpec]) -> impl Iterator<Item = &'static ColumnSpec> {
    columns
        .iter()
        .filter(|c| !matches!(c.field, Field::Comment | Field::Include))
}

/// Builds rows from `table`, locating each of `columns` by its header.
pub(crate) fn rows_by_header<'a>(
    table: &RawTable,
    columns: impl IntoIterator<Item = &'a ColumnSpec>,
    policy: AmountPolicy,
) -> Result<ParsedRows, ParseError> {
    // Resolve every column before touching a row so a schema mismatch yields no table.
    let positions = columns
        .into_iter()
        .map(|spec| table.column(spec.header).map(|idx| (spec, idx)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut amounts = AmountReader::new(policy);
    let rows = table
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, raw)| {
            let mut row = NormalizedRow::default();
            for (spec, idx) in &positions {
                let value = cell(raw, *idx);
                match spec.field {
                    Field::Concept => row.concept = value.to_string(),
                    Field::Date => row.date = value.to_string(),
                    Field::Reference => row.reference = optional_cell(raw, *idx),
                    Field::Charge => row.charge = amounts.read(value, row_idx, spec.header),
                    Field::Credit => row.credit = amounts.read(value, row_idx, spec.header),
                    Field::Balance => row.balance = optional_cell(raw, *idx),
                    Field::Classification => row.classification = optional_cell(raw, *idx),
                    Field::Comment => row.comment = value.to_string(),
                    Field::Include => {
                        row.include = value.parse().unwrap_or_default();
                    }
                }
            }
            row
        })
        .collect();

    Ok(ParsedRows { rows, warnings: amounts.into_warnings() })
}

fn afirme_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new("DISPERSION DE FONDOS", MatchType::Exact, "Nómina", Include::Yes),
        ClassificationRule::new("RECH-", MatchType::Prefix, "Domiciliación rechazada", Include::No),
        ClassificationRule::new(
            "propias",
            MatchType::Contains,
            "Traspaso entre cuentas propias",
            Include::No,
        ),
    ]
}

fn hey_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::any_of(
            &["TARJETA DE CREDITO B", "propias", "Ahorro"],
            MatchType::Contains,
            "Traspaso entre cuentas propias",
            Include::No,
        )
        .case_insensitive(),
        ClassificationRule::new("recompensas", MatchType::Contains, "recompensas", Include::No)
            .case_insensitive(),
    ]
}

fn builtin(rules: Vec<ClassificationRule>) -> RuleSet {
    // Built-in patterns are plain text, never regex, so compiling cannot fail.
    RuleSet::new(rules).unwrap_or_else(|e| unreachable!("built-in rules are valid: {e}"))
}

// ── Afirme ────────────────────────────────────────────────────────────────────

/// Afirme workbook export: header on sheet row 8, columns located by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AfirmeXlsx;

impl BankVariant for AfirmeXlsx {
    fn name(&self) -> &'static str {
        "afirme"
    }

    fn export_filename(&self) -> &'static str {
        "afirme_data.xlsx"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        AFIRME_COLUMNS
    }

    fn parse(&self, data: &[u8], policy: AmountPolicy) -> Result<ParsedRows, ParseError> {
        let table = RawTable::from_workbook(data, AFIRME_HEADER_ROW)?;
        tracing::debug!(rows = table.rows.len(), "read afirme workbook");
        rows_by_header(&table, source_columns(AFIRME_COLUMNS), policy)
    }

    fn rules(&self) -> RuleSet {
        builtin(afirme_rules())
    }
}

/// Afirme CSV export: header on the first line, date column named `Fecha (DD/MM/AA)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AfirmeCsv;

impl BankVariant for AfirmeCsv {
    fn name(&self) -> &'static str {
        "afirme-csv"
    }

    fn export_filename(&self) -> &'static str {
        "afirme_data.xlsx"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        AFIRME_CSV_COLUMNS
    }

    fn parse(&self, data: &[u8], policy: AmountPolicy) -> Result<ParsedRows, ParseError> {
        let table = RawTable::from_csv(data, 0)?;
        tracing::debug!(rows = table.rows.len(), "read afirme csv");
        rows_by_header(&table, source_columns(AFIRME_CSV_COLUMNS), policy)
    }

    fn rules(&self) -> RuleSet {
        builtin(afirme_rules())
    }
}

// ── Hey ───────────────────────────────────────────────────────────────────────

/// Hey CSV export. The header text is ignored: the first seven columns are
/// always Fecha, Descripción, Referencia, Cargo, Abonos, Saldo, Clasificación.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hey;

impl BankVariant for Hey {
    fn name(&self) -> &'static str {
        "hey"
    }

    fn export_filename(&self) -> &'static str {
        "hey_data.xlsx"
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        HEY_COLUMNS
    }

    fn parse(&self, data: &[u8], policy: AmountPolicy) -> Result<ParsedRows, ParseError> {
        let mut table = RawTable::from_csv(data, HEY_SKIP_LINES)?;
        let names: Vec<&str> = source_columns(HEY_COLUMNS).map(|c| c.header).collect();
        table.rename_positional(&names)?;
        tracing::debug!(rows = table.rows.len(), "read hey csv");
        rows_by_header(&table, source_columns(HEY_COLUMNS), policy)
    }

    fn rules(&self) -> RuleSet {
        builtin(hey_rules())
    }
}

// ── Selector ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    #[serde(rename = "afirme")]
    AfirmeXlsx,
    #[serde(rename = "afirme-csv")]
    AfirmeCsv,
    #[serde(rename = "hey")]
    Hey,
}

impl Bank {
    pub const ALL: [Bank; 3] = [Bank::AfirmeXlsx, Bank::AfirmeCsv, Bank::Hey];

    pub fn variant(self) -> &'static dyn BankVariant {
        match self {
            Bank::AfirmeXlsx => &AfirmeXlsx,
            Bank::AfirmeCsv => &AfirmeCsv,
            Bank::Hey => &Hey,
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.variant().name())
    }
}

impl std::str::FromStr for Bank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Bank::ALL
            .into_iter()
            .find(|bank| bank.variant().name() == wanted)
            .ok_or_else(|| format!("Unknown bank: '{s}'"))
    }
}
