use std::time::Duration;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::document_store::{DumpDocumentStore, Dumps};
use crate::domain::ExperimentId;
use crate::error::MigrationError;
use crate::etl::{MigrationReport, StoreMigration};
use crate::object_store;
use crate::pool::BoundedPool;
use crate::repair::CellSetRepair;
use crate::report::BatchReport;
use crate::sql::{SqlScriptSink, schema};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResult {
    pub direction: String,
    pub statements: usize,
    pub sql: String,
}

/// Wires the configured collaborators into the two jobs.
pub struct App {
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Repairs the listed experiments, or every document in the bucket when none are given.
    pub fn repair_cell_sets(
        &self,
        experiment_ids: &[ExperimentId],
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, MigrationError> {
        sink.event(ProgressEvent {
            message: format!("loading documents for {}", self.config.environment),
            elapsed: None,
        });
        let documents = DumpDocumentStore::from_dumps(Dumps::load_documents(&self.config.dumps)?);
        let objects = object_store::open(&self.config.object_store)?;
        let pool = BoundedPool::new(self.config.max_in_flight)?;

        let repair = CellSetRepair::new(documents, objects);
        if experiment_ids.is_empty() {
            return repair.repair_all(&pool, sink);
        }
        let keys = experiment_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect::<Vec<_>>();
        Ok(repair.repair_experiments(&keys, &pool, sink))
    }

    pub fn migrate_sql(&self, sink: &dyn ProgressSink) -> Result<MigrationReport, MigrationError> {
        sink.event(ProgressEvent {
            message: format!("loading dumps for {}", self.config.environment),
            elapsed: None,
        });
        let dumps = Dumps::load(&self.config.dumps)?;
        let script = SqlScriptSink::create(&self.config.sql_output)?;
        script.write_raw(&format!(
            "-- document store migration ({}) generated {}",
            self.config.environment,
            chrono::Utc::now().to_rfc3339()
        ))?;
        let pool = BoundedPool::new(self.config.max_in_flight)?;

        let migration = StoreMigration::new(dumps, script);
        let report = migration.run(&pool, sink);
        migration.sink().flush()?;
        tracing::info!(path = %migration.sink().path(), "wrote insert script");
        Ok(report)
    }

    pub fn schema(&self, down: bool) -> SchemaResult {
        let (direction, sql) = if down {
            ("down", schema::down())
        } else {
            ("up", schema::up())
        };
        SchemaResult {
            direction: direction.to_string(),
            statements: schema::statements(sql).len(),
            sql: sql.to_string(),
        }
    }
}
