pub mod aggregate;
pub mod amount;
pub mod bank;
pub mod export;
pub mod processor;
pub mod rules;
pub mod table;

pub use aggregate::included_credit_total;
pub use amount::{coerce_amount, AmountPolicy, AmountWarning};
pub use bank::{AfirmeCsv, AfirmeXlsx, Bank, BankVariant, Hey, ParsedRows};
pub use export::{read_export, to_xlsx, SerializeError};
pub use processor::{ProcessedStatement, Report, StatementProcessor};
pub use rules::{ClassificationRule, MatchType, RuleError, RuleSet};
pub use table::{ParseError, RawTable};

pub mod import {
    use crate::*;

    /// Parses, classifies and totals one upload with the built-in rules.
    pub fn process_statement(bank: Bank, data: &[u8]) -> Result<ProcessedStatement, ParseError> {
        StatementProcessor::default().process(bank, data)
    }

    pub fn export_statement(statement: &ProcessedStatement) -> Result<Vec<u8>, SerializeError> {
        statement.to_xlsx()
    }

    pub fn load_rules(toml_content: &str) -> Result<RuleSet, RuleError> {
        RuleSet::from_toml(toml_content)
    }
}
