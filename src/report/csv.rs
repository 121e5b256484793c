use crate::client::SyncRoundResult;
use crate::report::error::ReportResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const HEADER: &str = "sequence_number,sent_at,round_trip_time,estimated_offset,uncertainty_bound,epsilon_max,within_tolerance,status";

/// Append-only CSV log with one row per round, flushed as each row lands
pub struct CsvRoundLog {
    writer: BufWriter<Box<dyn Write + Send>>,
    rows: u64,
}

impl CsvRoundLog {
    /// Create (truncating) the file at `path` and write the header
    pub fn create(path: impl AsRef<Path>) -> ReportResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        tracing::debug!(path = %path.display(), "Opened round log");
        Self::from_writer(Box::new(file))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> ReportResult<Self> {
        let mut writer = BufWriter::new(writer);
        writeln!(writer, "{HEADER}")?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_round(&mut self, result: &SyncRoundResult) -> ReportResult<()> {
        writeln!(self.writer, "{}", format_row(result))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> ReportResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Render one result as a CSV line without the trailing newline.
///
/// Timed-out rounds leave the measurement and decision cells empty.
pub fn format_row(result: &SyncRoundResult) -> String {
    format!(
        "{},{:.6},{},{},{},{:.6},{},{}",
        result.sequence_number,
        result.sent_at,
        decimal(result.round_trip_time),
        decimal(result.estimated_offset),
        decimal(result.uncertainty_bound),
        result.epsilon_max,
        result
            .within_tolerance
            .map(|within| within.to_string())
            .unwrap_or_default(),
        result.status,
    )
}

fn decimal(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}
