use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::app::{ProgressEvent, ProgressSink};
use crate::document_store::{DumpRecord, Dumps};
use crate::domain::{ExecutionMeta, ExperimentRecord, ProjectData, ProjectRecord, Sample, SamplesRecord};
use crate::error::MigrationError;
use crate::pool::BoundedPool;
use crate::report::{BatchReport, ItemOutcome, ItemReport};
use crate::sql::schema::{AccessRole, PipelineType, SampleFileType, SampleTechnology, UploadStatus};
use crate::sql::{
    ExperimentExecutionRow, ExperimentRow, InviteAccessRow, MetadataTrackRow, PlotRow, Row,
    RowSink, SampleFileRow, SampleInMetadataTrackRow, SampleRow, SampleToSampleFileRow,
    UserAccessRow,
};

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub projects: BatchReport,
    pub user_access: BatchReport,
    pub invite_access: BatchReport,
    pub plots: BatchReport,
}

impl MigrationReport {
    pub fn has_failures(&self) -> bool {
        self.projects.has_failures()
            || self.user_access.has_failures()
            || self.invite_access.has_failures()
            || self.plots.has_failures()
    }
}

/// Rows for one sample; each file row is followed by its mapping row.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePlan {
    pub sample: SampleRow,
    pub files: Vec<(SampleFileRow, SampleToSampleFileRow)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPlan {
    pub track: MetadataTrackRow,
    pub values: Vec<SampleInMetadataTrackRow>,
}

/// Every row a project migrates to, built before anything is inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPlan {
    pub experiment: ExperimentRow,
    pub executions: Vec<ExperimentExecutionRow>,
    pub samples: Vec<SamplePlan>,
    pub tracks: Vec<TrackPlan>,
}

impl ProjectPlan {
    pub fn row_count(&self) -> usize {
        1 + self.executions.len()
            + self
                .samples
                .iter()
                .map(|sample| 1 + sample.files.len() * 2)
                .sum::<usize>()
            + self
                .tracks
                .iter()
                .map(|track| 1 + track.values.len())
                .sum::<usize>()
    }
}

/// Outcome of resolving a project against the dumps.
#[derive(Debug)]
pub enum Resolution<'a> {
    Ready {
        data: &'a ProjectData,
        experiment: &'a ExperimentRecord,
        samples: &'a SamplesRecord,
    },
    Skip(String),
}

/// Projects the document-store dumps onto the relational schema.
pub struct StoreMigration<S: RowSink> {
    dumps: Dumps,
    sink: S,
}

impl<S: RowSink> StoreMigration<S> {
    pub fn new(dumps: Dumps, sink: S) -> Self {
        Self { dumps, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn dumps(&self) -> &Dumps {
        &self.dumps
    }

    pub fn run(&self, pool: &BoundedPool, progress: &dyn ProgressSink) -> MigrationReport {
        let projects = self.migrate_projects(pool, progress);
        // access grants and plots reference experiments, so they go after projects
        let (user_access, (invite_access, plots)) = pool.join(
            || self.migrate_user_access(pool),
            || pool.join(|| self.migrate_invite_access(pool), || self.migrate_plots(pool)),
        );
        MigrationReport {
            projects,
            user_access,
            invite_access,
            plots,
        }
    }

    pub fn migrate_projects(&self, pool: &BoundedPool, progress: &dyn ProgressSink) -> BatchReport {
        let started_at = Utc::now();
        let items = pool.map(&self.dumps.projects, |project| {
            let started = Instant::now();
            let outcome = self.migrate_project(project, pool);
            progress.event(ProgressEvent {
                message: format!("project {}: {}", project.key(), outcome.describe()),
                elapsed: Some(started.elapsed()),
            });
            ItemReport {
                id: project.key().to_string(),
                outcome,
            }
        });
        BatchReport::new("projects", started_at, items)
    }

    /// Migrates one project. Skips and failures are reported, never raised.
    pub fn migrate_project(
        &self,
        project: &DumpRecord<ProjectRecord>,
        pool: &BoundedPool,
    ) -> ItemOutcome {
        let project_uuid = project.key();
        let outcome = ItemOutcome::from_result(self.try_migrate_project(project, pool));
        match &outcome {
            ItemOutcome::Migrated => tracing::info!(project_uuid, "project migrated"),
            ItemOutcome::Skipped { reason } => {
                tracing::warn!(project_uuid, reason = %reason, "malformed project skipped")
            }
            ItemOutcome::Failed { error, .. } => {
                tracing::error!(project_uuid, error = %error, "error on project")
            }
        }
        outcome
    }

    fn try_migrate_project(
        &self,
        project: &DumpRecord<ProjectRecord>,
        pool: &BoundedPool,
    ) -> Result<ItemOutcome, MigrationError> {
        let project = project.get()?;
        let (data, experiment, samples) = match resolve_project(&self.dumps, project)? {
            Resolution::Ready {
                data,
                experiment,
                samples,
            } => (data, experiment, samples),
            Resolution::Skip(reason) => return Ok(ItemOutcome::Skipped { reason }),
        };
        tracing::info!(
            project_uuid = %project.project_uuid,
            experiment_id = %experiment.experiment_id,
            "migrating project"
        );

        let plan = plan_project(&project.project_uuid, data, experiment, samples)?;
        tracing::debug!(rows = plan.row_count(), "project plan built");
        self.insert_plan(&plan, pool)?;
        Ok(ItemOutcome::Migrated)
    }

    fn insert_plan(&self, plan: &ProjectPlan, pool: &BoundedPool) -> Result<(), MigrationError> {
        self.sink.insert(&Row::Experiment(plan.experiment.clone()))?;
        for execution in &plan.executions {
            self.sink.insert(&Row::ExperimentExecution(execution.clone()))?;
        }

        if plan.samples.is_empty() {
            tracing::info!(
                experiment_id = %plan.experiment.id,
                "no samples in experiment, skipping sample migration"
            );
            return Ok(());
        }

        pool.map(&plan.samples, |sample| {
            self.sink.insert(&Row::Sample(sample.sample.clone()))?;
            pool.map(&sample.files, |(file, mapping)| {
                self.sink.insert(&Row::SampleFile(file.clone()))?;
                self.sink.insert(&Row::SampleToSampleFile(mapping.clone()))
            })
            .into_iter()
            .collect::<Result<(), MigrationError>>()
        })
        .into_iter()
        .collect::<Result<(), MigrationError>>()?;

        pool.map(&plan.tracks, |track| {
            self.sink.insert(&Row::MetadataTrack(track.track.clone()))?;
            pool.map(&track.values, |value| {
                self.sink.insert(&Row::SampleInMetadataTrack(value.clone()))
            })
            .into_iter()
            .collect::<Result<(), MigrationError>>()
        })
        .into_iter()
        .collect::<Result<(), MigrationError>>()
    }

    pub fn migrate_user_access(&self, pool: &BoundedPool) -> BatchReport {
        let started_at = Utc::now();
        let items = pool.map(&self.dumps.user_access, |record| {
            let result = record.get().and_then(|grant| {
                let access_role = grant.role.parse::<AccessRole>()?;
                self.sink.insert(&Row::UserAccess(UserAccessRow {
                    user_id: grant.user_id.clone(),
                    experiment_id: grant.experiment_id.clone(),
                    access_role,
                    updated_at: grant.created_date.clone(),
                }))
            });
            record_report("user_access", record.key().to_string(), result)
        });
        BatchReport::new("user_access", started_at, items)
    }

    pub fn migrate_invite_access(&self, pool: &BoundedPool) -> BatchReport {
        let started_at = Utc::now();
        let items = pool.map(&self.dumps.invite_access, |record| {
            let result = record.get().and_then(|invite| {
                let access_role = invite.role.parse::<AccessRole>()?;
                self.sink.insert(&Row::InviteAccess(InviteAccessRow {
                    user_email: invite.user_email.clone(),
                    experiment_id: invite.experiment_id.clone(),
                    access_role,
                    updated_at: invite.created_date.clone(),
                }))
            });
            record_report("invite_access", record.key().to_string(), result)
        });
        BatchReport::new("invite_access", started_at, items)
    }

    pub fn migrate_plots(&self, pool: &BoundedPool) -> BatchReport {
        let started_at = Utc::now();
        let items = pool.map(&self.dumps.plots, |record| {
            let result = record.get().and_then(|plot| {
                self.sink.insert(&Row::Plot(PlotRow {
                    id: plot.plot_uuid.clone(),
                    experiment_id: plot.experiment_id.clone(),
                    config: plot.config.clone(),
                    s3_data_key: plot.plot_data_key.clone(),
                }))
            });
            record_report("plot", record.key().to_string(), result)
        });
        BatchReport::new("plots", started_at, items)
    }
}

fn record_report(table: &str, id: String, result: Result<(), MigrationError>) -> ItemReport {
    let outcome = match result {
        Ok(()) => ItemOutcome::Migrated,
        Err(err) => {
            tracing::error!(table, id = %id, error = %err, "row insert failed");
            ItemOutcome::failed(&err)
        }
    };
    ItemReport { id, outcome }
}

/// Finds the experiment and samples a project migrates from.
///
/// Absent records are a skip; a project naming several experiments is an
/// error because only one of them would be migrated.
pub fn resolve_project<'a>(
    dumps: &'a Dumps,
    project: &'a ProjectRecord,
) -> Result<Resolution<'a>, MigrationError> {
    let Some(data) = project.projects.as_ref() else {
        return Ok(Resolution::Skip("project data missing".to_string()));
    };
    let experiment_id = match data.experiments.as_slice() {
        [] => return Ok(Resolution::Skip("project has no experiment".to_string())),
        [experiment_id] => experiment_id,
        many => {
            return Err(MigrationError::Precondition(format!(
                "project {} lists {} experiments, expected one",
                project.project_uuid,
                many.len()
            )));
        }
    };
    let Some(experiment) = dumps.experiment(experiment_id).map(DumpRecord::get).transpose()? else {
        return Ok(Resolution::Skip(format!(
            "experiment {experiment_id} missing from dump"
        )));
    };
    let Some(samples) = dumps.samples_of(experiment_id).map(DumpRecord::get).transpose()? else {
        return Ok(Resolution::Skip(format!(
            "samples of experiment {experiment_id} missing from dump"
        )));
    };
    Ok(Resolution::Ready {
        data,
        experiment,
        samples,
    })
}

/// Builds every row of a project, validating all of them first.
pub fn plan_project(
    project_uuid: &str,
    data: &ProjectData,
    experiment: &ExperimentRecord,
    samples: &SamplesRecord,
) -> Result<ProjectPlan, MigrationError> {
    let experiment_id = experiment.experiment_id.as_str();

    let experiment_row = ExperimentRow {
        id: experiment_id.to_string(),
        name: experiment
            .experiment_name
            .clone()
            .or_else(|| data.name.clone())
            .ok_or_else(|| MigrationError::not_found("experiment name", experiment_id))?,
        description: data.description.clone().unwrap_or_default(),
        processing_config: experiment.processing_config.clone(),
        notify_by_email: experiment.notify_by_email.unwrap_or(true),
        samples_order: experiment.sample_ids.clone(),
        created_at: experiment.created_date.clone(),
    };

    let mut executions = Vec::new();
    if let Some(meta) = &experiment.meta.gem2s {
        executions.push(execution_row(experiment_id, PipelineType::Gem2s, meta)?);
    }
    if let Some(meta) = &experiment.meta.pipeline {
        let mut row = execution_row(experiment_id, PipelineType::Qc, meta)?;
        row.params_hash = None;
        executions.push(row);
    }

    let sample_list = samples
        .samples
        .iter()
        .map(|(key, sample)| (sample.uuid.as_deref().unwrap_or(key.as_str()), sample))
        .collect::<Vec<_>>();

    let sample_plans = sample_list
        .iter()
        .map(|(sample_id, sample)| plan_sample(project_uuid, experiment_id, sample_id, sample))
        .collect::<Result<Vec<_>, _>>()?;

    let tracks = match sample_list.first() {
        Some((_, first)) => {
            let tracks = first.metadata.keys().cloned().collect::<Vec<_>>();
            let expected = tracks.iter().collect::<BTreeSet<_>>();
            for (sample_id, sample) in &sample_list {
                if sample.metadata.keys().collect::<BTreeSet<_>>() != expected {
                    return Err(MigrationError::Precondition(format!(
                        "sample {sample_id} does not share the metadata tracks of the first sample"
                    )));
                }
            }
            tracks
                .into_iter()
                .map(|key| TrackPlan {
                    values: sample_list
                        .iter()
                        .map(|(sample_id, sample)| SampleInMetadataTrackRow {
                            experiment_id: experiment_id.to_string(),
                            track_key: key.clone(),
                            sample_id: sample_id.to_string(),
                            value: sample.metadata_value(&key),
                        })
                        .collect(),
                    track: MetadataTrackRow {
                        experiment_id: experiment_id.to_string(),
                        key,
                    },
                })
                .collect()
        }
        None => Vec::new(),
    };

    Ok(ProjectPlan {
        experiment: experiment_row,
        executions,
        samples: sample_plans,
        tracks,
    })
}

fn execution_row(
    experiment_id: &str,
    pipeline_type: PipelineType,
    meta: &ExecutionMeta,
) -> Result<ExperimentExecutionRow, MigrationError> {
    let required = |value: &Option<String>, field: &str| {
        value.clone().ok_or_else(|| {
            MigrationError::Precondition(format!(
                "{pipeline_type} execution of {experiment_id} has no {field}"
            ))
        })
    };
    Ok(ExperimentExecutionRow {
        experiment_id: experiment_id.to_string(),
        pipeline_type,
        params_hash: meta.params_hash.clone(),
        state_machine_arn: required(&meta.state_machine_arn, "stateMachineArn")?,
        execution_arn: required(&meta.execution_arn, "executionArn")?,
    })
}

fn plan_sample(
    project_uuid: &str,
    experiment_id: &str,
    sample_id: &str,
    sample: &Sample,
) -> Result<SamplePlan, MigrationError> {
    let technology = SampleTechnology::from_label(sample.technology.as_deref().unwrap_or(""))?;

    let files = sample
        .attached_files()?
        .into_iter()
        .map(|(file_key, file)| {
            let status = file
                .upload
                .as_ref()
                .and_then(|upload| upload.status.as_deref())
                .unwrap_or("");
            let file_id = Uuid::new_v4();
            Ok((
                SampleFileRow {
                    id: file_id,
                    sample_file_type: SampleFileType::from_file_key(file_key, technology)?,
                    valid: file.valid.unwrap_or(false),
                    size: file.size.unwrap_or(0),
                    s3_path: format!("{project_uuid}/{sample_id}/{file_key}"),
                    upload_status: status.parse::<UploadStatus>()?,
                    updated_at: sample.last_modified.clone(),
                },
                SampleToSampleFileRow {
                    sample_id: sample_id.to_string(),
                    sample_file_id: file_id,
                },
            ))
        })
        .collect::<Result<Vec<_>, MigrationError>>()?;

    Ok(SamplePlan {
        sample: SampleRow {
            id: sample_id.to_string(),
            experiment_id: experiment_id.to_string(),
            name: sample.name.clone().unwrap_or_else(|| sample_id.to_string()),
            sample_technology: technology,
            created_at: sample.created_date.clone(),
            updated_at: sample.last_modified.clone(),
        },
        files,
    })
}
