//! Round output: the per-round CSV log and the end-of-run JSON summary.

mod csv;
mod error;
mod summary;

pub use csv::{format_row, CsvRoundLog, HEADER};
pub use error::{ReportError, ReportResult};
pub use summary::RunSummary;
