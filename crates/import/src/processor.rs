use std::collections::HashMap;

use estados_core::{AnnotatedTable, Money};
use serde::Serialize;

use crate::aggregate::included_credit_total;
use crate::amount::{AmountPolicy, AmountWarning};
use crate::bank::Bank;
use crate::export::{self, SerializeError};
use crate::rules::RuleSet;
use crate::table::ParseError;

/// One upload after parsing, classification and totalling.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedStatement {
    pub bank: Bank,
    pub table: AnnotatedTable,
    pub total: Money,
    pub warnings: Vec<AmountWarning>,
}

impl ProcessedStatement {
    /// `$12,345.67`
    pub fn total_display(&self) -> String {
        self.total.to_string()
    }

    pub fn export_filename(&self) -> &'static str {
        self.bank.variant().export_filename()
    }

    pub fn to_xlsx(&self) -> Result<Vec<u8>, SerializeError> {
        export::to_xlsx(&self.table)
    }
}

/// What the caller shows when it doesn't want to branch on a `Result`:
/// either a statement, or a message with a zero total.
#[derive(Debug)]
pub struct Report {
    pub statement: Option<ProcessedStatement>,
    pub total: Money,
    pub error: Option<String>,
    /// The upload was readable but didn't have the bank's layout.
    pub schema: bool,
}

impl Report {
    pub fn total_display(&self) -> String {
        self.total.to_string()
    }
}

/// Runs parse → classify → total for a single upload. Holds only
/// configuration, so one processor can serve any number of uploads.
#[derive(Debug, Clone, Default)]
pub struct StatementProcessor {
    policy: AmountPolicy,
    overrides: HashMap<Bank, RuleSet>,
}

impl StatementProcessor {
    pub fn new(policy: AmountPolicy) -> Self {
        Self { policy, overrides: HashMap::new() }
    }

    /// Replaces the built-in rules for `bank`.
    pub fn with_rules(mut self, bank: Bank, rules: RuleSet) -> Self {
        self.overrides.insert(bank, rules);
        self
    }

    pub fn policy(&self) -> AmountPolicy {
        self.policy
    }

    pub fn process(&self, bank: Bank, data: &[u8]) -> Result<ProcessedStatement, ParseError> {
        let variant = bank.variant();
        let parsed = variant.parse(data, self.policy)?;

        let rows = match self.overrides.get(&bank) {
            Some(rules) => {
                let mut rows = parsed.rows;
                rules.apply(&mut rows);
                rows
            }
            None => variant.classify(parsed.rows),
        };

        let total = included_credit_total(&rows);
        tracing::info!(
            %bank,
            rows = rows.len(),
            warnings = parsed.warnings.len(),
            total = %total,
            "processed statement"
        );

        Ok(ProcessedStatement {
            bank,
            table: AnnotatedTable::new(variant.columns(), rows),
            total,
            warnings: parsed.warnings,
        })
    }

    /// Like [`process`](Self::process), but a bad upload becomes a message and
    /// a zero total instead of an error.
    pub fn process_or_report(&self, bank: Bank, data: &[u8]) -> Report {
        match self.process(bank, data) {
            Ok(statement) => Report {
                total: statement.total,
                statement: Some(statement),
                error: None,
                schema: false,
            },
            Err(e) => {
                tracing::warn!(%bank, error = %e, schema = e.is_schema(), "statement rejected");
                Report {
                    statement: None,
                    total: Money::zero(),
                    error: Some(e.to_string()),
                    schema: e.is_schema(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ClassificationRule, MatchType};
    use estados_core::Include;

    const AFIRME_CSV: &str = "Concepto,Fecha (DD/MM/AA),Referencia,Cargo,Abono,Saldo\n\
                              DISPERSION DE FONDOS,01/02/24,,,$100.00,$100.00\n\
                              RECH-123,02/02/24,,,$50.00,$150.00\n\
                              OTHER,03/02/24,,,$25.00,$175.00\n";

    #[test]
    fn process_afirme_csv() {
        let statement = StatementProcessor::default()
            .process(Bank::AfirmeCsv, AFIRME_CSV.as_bytes())
            .unwrap();
        assert_eq!(statement.table.len(), 3);
        assert_eq!(statement.total_display(), "$125.00");
        assert_eq!(statement.export_filename(), "afirme_data.xlsx");
        assert!(statement.warnings.is_empty());
    }

    #[test]
    fn rule_override_replaces_builtin_rules() {
        let rules = RuleSet::new(vec![ClassificationRule::new(
            "OTHER",
            MatchType::Exact,
            "ignorar",
            Include::No,
        )])
        .unwrap();
        let statement = StatementProcessor::default()
            .with_rules(Bank::AfirmeCsv, rules)
            .process(Bank::AfirmeCsv, AFIRME_CSV.as_bytes())
            .unwrap();
        let comments: Vec<_> = statement.table.rows.iter().map(|r| r.comment.as_str()).collect();
        assert_eq!(comments, vec!["", "", "ignorar"]);
        assert_eq!(statement.total_display(), "$150.00");
    }

    #[test]
    fn report_on_schema_error_has_zero_total() {
        let report = StatementProcessor::default()
            .process_or_report(Bank::AfirmeCsv, b"Concepto,Fecha\nX,01/01/24\n");
        assert!(report.statement.is_none());
        assert!(report.total.is_zero());
        assert_eq!(report.total_display(), "$0.00");
        assert!(report.schema);
        assert!(report.error.unwrap().contains("Missing required column"));
    }

    #[test]
    fn report_on_unreadable_workbook_is_not_schema() {
        let report = StatementProcessor::default().process_or_report(Bank::AfirmeXlsx, b"not a workbook");
        assert!(report.statement.is_none());
        assert!(!report.schema);
        assert_eq!(report.total_display(), "$0.00");
    }

    #[test]
    fn statement_serializes_for_json_clients() {
        let statement = StatementProcessor::default()
            .process(Bank::AfirmeCsv, AFIRME_CSV.as_bytes())
            .unwrap();
        let json = serde_json::to_value(&statement).unwrap();
        assert_eq!(json["bank"], "afirme-csv");
        assert_eq!(json["table"]["rows"][0]["comment"], "Nómina");
        assert_eq!(json["table"]["rows"][1]["include"], "no");
        assert_eq!(json["table"]["columns"][0]["header"], "Concepto");
        assert!(json["warnings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn report_on_success_carries_statement() {
        let report = StatementProcessor::default()
            .process_or_report(Bank::AfirmeCsv, AFIRME_CSV.as_bytes());
        assert!(report.error.is_none());
        assert_eq!(report.total_display(), "$125.00");
        assert!(report.statement.is_some());
    }

    #[test]
    fn repeated_calls_do_not_share_state() {
        let processor = StatementProcessor::new(AmountPolicy::Strict);
        let bad = "Concepto,Fecha (DD/MM/AA),Referencia,Cargo,Abono,Saldo\nX,01/01/24,,,abc,\n";
        let first = processor.process(Bank::AfirmeCsv, bad.as_bytes()).unwrap();
        let second = processor.process(Bank::AfirmeCsv, bad.as_bytes()).unwrap();
        assert_eq!(first.warnings.len(), 1);
        assert_eq!(second.warnings.len(), 1);
    }
}
