//! Tabular (CSV) input: parsing and positional column extraction.

pub mod extract;
pub mod reader;

pub use extract::{ColumnSchema, ExtractedValues, Row};
pub use reader::{parse_delimiter, parse_rows, read_rows, RowDelimiter, TabularOptions};
