use std::io::Cursor;

use calamine::{Data, DataType, Reader};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },
    #[error("Header row {0} not found")]
    MissingHeader(usize),
    #[error("Workbook has no worksheets")]
    EmptyWorkbook,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),
}

impl ParseError {
    /// The file was readable but its columns don't match the bank's layout.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            ParseError::MissingColumn(_)
                | ParseError::TooFewColumns { .. }
                | ParseError::MissingHeader(_)
        )
    }
}

/// An uploaded statement as untyped cell text: one header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Reads delimited text. `skip_lines` physical lines are dropped (blank
    /// ones included), the next record is the header. Data rows with no
    /// non-empty cell are dropped, so exports can be shorter than the file.
    pub fn from_csv(data: &[u8], skip_lines: usize) -> Result<Self, ParseError> {
        let body = skip_physical_lines(data, skip_lines);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body);

        let mut records = reader.byte_records();
        let headers = match records.next() {
            Some(record) => record_to_strings(&record?),
            None => return Err(ParseError::MissingHeader(skip_lines)),
        };

        let mut rows = Vec::new();
        for result in records {
            let cells = record_to_strings(&result?);
            if is_blank(&cells) {
                continue;
            }
            rows.push(cells);
        }

        Ok(Self { headers, rows })
    }

    /// Reads the first worksheet of an xlsx/xls/ods workbook. `header_row` is
    /// the zero-based sheet row holding the column names. Gap rows below the
    /// header are dropped like blank CSV rows.
    pub fn from_workbook(data: &[u8], header_row: usize) -> Result<Self, ParseError> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ParseError::EmptyWorkbook)??;

        // Ranges start at the first used cell, not at A1.
        let first_row = range.start().map(|(row, _)| row as usize);
        let offset = match first_row {
            Some(first) if first <= header_row => header_row - first,
            _ => return Err(ParseError::MissingHeader(header_row)),
        };

        let mut sheet_rows = range.rows().skip(offset);
        let headers = match sheet_rows.next() {
            Some(cells) => cells.iter().map(cell_text).collect(),
            None => return Err(ParseError::MissingHeader(header_row)),
        };

        let rows = sheet_rows
            .map(|cells| cells.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|cells| !is_blank(cells))
            .collect();

        Ok(Self { headers, rows })
    }

    /// Position of the column whose header is `name` (surrounding whitespace ignored).
    pub fn column(&self, name: &str) -> Result<usize, ParseError> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ParseError::MissingColumn(name.to_string()))
    }

    /// Replaces the header text with `names`, trusting physical column order.
    pub fn rename_positional(&mut self, names: &[&str]) -> Result<(), ParseError> {
        if self.headers.len() < names.len() {
            return Err(ParseError::TooFewColumns {
                expected: names.len(),
                found: self.headers.len(),
            });
        }
        self.headers = names.iter().map(|n| n.to_string()).collect();
        Ok(())
    }
}

pub(crate) fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or_default()
}

pub(crate) fn optional_cell(row: &[String], idx: usize) -> Option<String> {
    let value = cell(row, idx);
    (!value.trim().is_empty()).then(|| value.to_string())
}

fn skip_physical_lines(data: &[u8], lines: usize) -> &[u8] {
    let mut rest = data;
    for _ in 0..lines {
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return &[],
        }
    }
    rest
}

fn record_to_strings(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => {
            let date: Option<NaiveDate> = cell.as_date();
            date.map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_else(|| cell.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_csv_uses_first_record_as_header() {
        let data = b"Concepto,Cargo\nPAGO,$10.00\nABONO,\n";
        let table = RawTable::from_csv(data, 0).unwrap();
        assert_eq!(table.headers, vec!["Concepto", "Cargo"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["ABONO", ""]);
    }

    #[test]
    fn from_csv_skips_physical_lines_including_blank_ones() {
        let data = b"Banco\n\nCuenta: 123\nFecha,Monto\n01/01/24,5\n";
        let table = RawTable::from_csv(data, 3).unwrap();
        assert_eq!(table.headers, vec!["Fecha", "Monto"]);
        assert_eq!(table.rows, vec![vec!["01/01/24".to_string(), "5".to_string()]]);
    }

    #[test]
    fn from_csv_tolerates_ragged_preamble_and_rows() {
        let data = b"only-one-field\nA,B,C\n1,2\n";
        let table = RawTable::from_csv(data, 1).unwrap();
        assert_eq!(table.headers.len(), 3);
        assert_eq!(cell(&table.rows[0], 2), "");
    }

    #[test]
    fn from_csv_drops_blank_rows() {
        let data = b"A,B\n1,2\n,\n3,4\n";
        let table = RawTable::from_csv(data, 0).unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn from_csv_decodes_invalid_utf8_lossily() {
        let data = b"A\nCAF\xC9\n";
        let table = RawTable::from_csv(data, 0).unwrap();
        assert!(table.rows[0][0].starts_with("CAF"));
    }

    #[test]
    fn from_csv_past_end_is_missing_header() {
        let data = b"a\nb\n";
        let err = RawTable::from_csv(data, 5).unwrap_err();
        assert!(matches!(err, ParseError::MissingHeader(5)));
        assert!(err.is_schema());
    }

    #[test]
    fn column_lookup_ignores_padding() {
        let table = RawTable {
            headers: vec![" Concepto ".to_string(), "Abono".to_string()],
            rows: vec![],
        };
        assert_eq!(table.column("Concepto").unwrap(), 0);
        assert!(matches!(
            table.column("Saldo"),
            Err(ParseError::MissingColumn(name)) if name == "Saldo"
        ));
    }

    #[test]
    fn rename_positional_requires_enough_columns() {
        let mut table = RawTable {
            headers: vec!["x".to_string(), "y".to_string()],
            rows: vec![],
        };
        let err = table.rename_positional(&["a", "b", "c"]).unwrap_err();
        assert!(matches!(err, ParseError::TooFewColumns { expected: 3, found: 2 }));

        table.rename_positional(&["a"]).unwrap();
        assert_eq!(table.headers, vec!["a"]);
    }

    #[test]
    fn optional_cell_treats_whitespace_as_missing() {
        let row = vec!["  ".to_string(), "REF1".to_string()];
        assert_eq!(optional_cell(&row, 0), None);
        assert_eq!(optional_cell(&row, 1).as_deref(), Some("REF1"));
        assert_eq!(optional_cell(&row, 9), None);
    }

    #[test]
    fn workbook_cells_render_as_text() {
        assert_eq!(cell_text(&Data::Float(1234.5)), "1234.5");
        assert_eq!(cell_text(&Data::Float(100.0)), "100");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("$1,000.00".into())), "$1,000.00");
    }

    #[test]
    fn garbage_bytes_are_not_a_workbook() {
        let err = RawTable::from_workbook(b"not a spreadsheet", 7).unwrap_err();
        assert!(matches!(err, ParseError::Workbook(_)));
        assert!(!err.is_schema());
    }
}
