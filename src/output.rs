use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, SchemaResult};
use crate::etl::MigrationReport;
use crate::report::BatchReport;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_repair(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_migration(result: &MigrationReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_schema(result: &SchemaResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
///
/// Items already log their outcome at info level, so events carry only
/// timings at debug level.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::debug!("{}", event.message),
        }
    }
}
