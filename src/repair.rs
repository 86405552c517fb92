use std::time::Instant;

use chrono::Utc;

use crate::app::{ProgressEvent, ProgressSink};
use crate::cellsets::rebuild_all;
use crate::document_store::DocumentStore;
use crate::error::MigrationError;
use crate::metadata::track_values_by_key;
use crate::object_store::{ObjectStore, read_cell_sets, write_cell_sets};
use crate::pool::BoundedPool;
use crate::report::{BatchReport, ItemOutcome, ItemReport};

pub const JOB_NAME: &str = "repair-cell-sets";

/// Re-pairs metadata values with sample ids in every cell-set document.
pub struct CellSetRepair<D: DocumentStore, O: ObjectStore> {
    documents: D,
    objects: O,
}

impl<D: DocumentStore, O: ObjectStore> CellSetRepair<D, O> {
    pub fn new(documents: D, objects: O) -> Self {
        Self { documents, objects }
    }

    pub fn objects(&self) -> &O {
        &self.objects
    }

    /// Repairs one experiment. Errors end up in the returned outcome.
    pub fn repair_experiment(&self, experiment_id: &str, sink: &dyn ProgressSink) -> ItemOutcome {
        let started = Instant::now();
        tracing::info!(experiment_id, "migrating experiment");

        let outcome = ItemOutcome::from_result(self.try_repair(experiment_id));
        match &outcome {
            ItemOutcome::Migrated => tracing::info!(experiment_id, "cell sets repaired"),
            ItemOutcome::Skipped { reason } => {
                tracing::info!(experiment_id, reason = %reason, "experiment skipped")
            }
            ItemOutcome::Failed { error, .. } => {
                tracing::error!(experiment_id, error = %error, "error migrating experiment")
            }
        }
        sink.event(ProgressEvent {
            message: format!("experiment {experiment_id}: {}", outcome.describe()),
            elapsed: Some(started.elapsed()),
        });
        outcome
    }

    fn try_repair(&self, experiment_id: &str) -> Result<ItemOutcome, MigrationError> {
        let experiment = self.documents.get_experiment(experiment_id)?;
        let project_id = experiment
            .project_id
            .as_deref()
            .ok_or_else(|| MigrationError::not_found("project reference", experiment_id))?;
        let tracks = self
            .documents
            .get_project(project_id)?
            .projects
            .map(|project| project.metadata_keys)
            .ok_or_else(|| MigrationError::not_found("project data", project_id))?;
        let samples = self.documents.get_samples(experiment_id)?;

        if tracks.is_empty() {
            return Ok(ItemOutcome::skipped("no metadata tracks"));
        }

        let track_values = track_values_by_key(&tracks, &experiment.sample_ids, &samples.samples)?;

        let mut cell_sets = read_cell_sets(&self.objects, experiment_id)?;
        rebuild_all(&mut cell_sets, &experiment.sample_ids, &track_values)?;
        write_cell_sets(&self.objects, experiment_id, &cell_sets)?;

        Ok(ItemOutcome::Migrated)
    }

    pub fn repair_experiments(
        &self,
        experiment_ids: &[String],
        pool: &BoundedPool,
        sink: &dyn ProgressSink,
    ) -> BatchReport {
        let started_at = Utc::now();
        let items = pool.map(experiment_ids, |experiment_id| ItemReport {
            id: experiment_id.clone(),
            outcome: self.repair_experiment(experiment_id, sink),
        });
        BatchReport::new(JOB_NAME, started_at, items)
    }

    /// Repairs every document in the bucket. Only a failed listing is an error.
    pub fn repair_all(
        &self,
        pool: &BoundedPool,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, MigrationError> {
        sink.event(ProgressEvent {
            message: "listing cell-set documents".to_string(),
            elapsed: None,
        });
        let keys = self.objects.list_keys()?;
        tracing::info!(count = keys.len(), max_in_flight = pool.max_in_flight(), "repairing experiments");
        Ok(self.repair_experiments(&keys, pool, sink))
    }
}
