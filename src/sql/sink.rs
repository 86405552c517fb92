use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use super::Row;
use crate::error::MigrationError;

/// Destination of migrated rows. Each insert commits on its own.
pub trait RowSink: Send + Sync {
    fn insert(&self, row: &Row) -> Result<(), MigrationError>;
}

/// Appends one `INSERT` statement per row to a SQL script.
pub struct SqlScriptSink {
    path: Utf8PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl SqlScriptSink {
    pub fn create(path: &Utf8Path) -> Result<Self, MigrationError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| MigrationError::Filesystem(err.to_string()))?;
        }
        let file = File::create(path.as_std_path())
            .map_err(|err| MigrationError::Filesystem(format!("create {path}: {err}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn write_raw(&self, sql: &str) -> Result<(), MigrationError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MigrationError::Filesystem("script writer poisoned".to_string()))?;
        writeln!(writer, "{sql}").map_err(|err| MigrationError::Filesystem(err.to_string()))
    }

    pub fn flush(&self) -> Result<(), MigrationError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MigrationError::Filesystem("script writer poisoned".to_string()))?;
        writer
            .flush()
            .map_err(|err| MigrationError::Filesystem(err.to_string()))
    }
}

impl RowSink for SqlScriptSink {
    fn insert(&self, row: &Row) -> Result<(), MigrationError> {
        let statement = row.to_sql();
        let mut writer = self.writer.lock().map_err(|_| MigrationError::SqlWrite {
            table: row.table(),
            message: "script writer poisoned".to_string(),
        })?;
        writeln!(writer, "{statement}").map_err(|err| MigrationError::SqlWrite {
            table: row.table(),
            message: err.to_string(),
        })
    }
}

/// Keeps rows in memory in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<Row>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.iter().filter(|row| row.table() == table).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().map(|rows| rows.is_empty()).unwrap_or(true)
    }
}

impl RowSink for RecordingSink {
    fn insert(&self, row: &Row) -> Result<(), MigrationError> {
        let mut rows = self.rows.lock().map_err(|_| MigrationError::SqlWrite {
            table: row.table(),
            message: "recording sink poisoned".to_string(),
        })?;
        rows.push(row.clone());
        Ok(())
    }
}
