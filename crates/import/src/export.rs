use estados_core::{AnnotatedTable, CellValue, ColumnSpec};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, Workbook, XlsxError};
use thiserror::Error;

use crate::amount::AmountPolicy;
use crate::bank::rows_by_header;
use crate::table::{ParseError, RawTable};

pub const SHEET_NAME: &str = "Sheet1";

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Writes `table` as a single-sheet xlsx: bold header row, then one row per
/// statement line. Identical tables give identical bytes.
pub fn to_xlsx(table: &AnnotatedTable) -> Result<Vec<u8>, SerializeError> {
    let mut workbook = Workbook::new();

    // Pin the document timestamp; the default is "now".
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in table.headers().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (idx, row) in table.rows.iter().enumerate() {
        let sheet_row = (idx + 1) as u32;
        for (col, spec) in table.columns.iter().enumerate() {
            let col = col as u16;
            match row.cell(spec.field) {
                CellValue::Text(text) => {
                    worksheet.write_string(sheet_row, col, text)?;
                }
                CellValue::Amount(amount) => match amount.to_f64() {
                    Some(number) => {
                        worksheet.write_number(sheet_row, col, number)?;
                    }
                    None => {
                        worksheet.write_string(sheet_row, col, amount.to_string())?;
                    }
                },
                CellValue::Empty => {}
            }
        }
    }

    let bytes = workbook.save_to_buffer()?;
    tracing::debug!(rows = table.len(), bytes = bytes.len(), "wrote annotated workbook");
    Ok(bytes)
}

/// Reads a workbook written by [`to_xlsx`] back into a table, classifier
/// columns included. Rules are not re-applied.
pub fn read_export(data: &[u8], columns: &'static [ColumnSpec]) -> Result<AnnotatedTable, ParseError> {
    let table = RawTable::from_workbook(data, 0)?;
    let parsed = rows_by_header(&table, columns, AmountPolicy::Lenient)?;
    Ok(AnnotatedTable::new(columns, parsed.rows))
}
