pub mod money;
pub mod statement;

pub use money::Money;
pub use statement::{AnnotatedTable, CellValue, ColumnSpec, Field, Include, NormalizedRow};
