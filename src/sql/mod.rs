//! Rows of the relational schema and the sinks that receive them.

pub mod schema;
pub mod sink;

use serde_json::Value;
use uuid::Uuid;

use schema::{AccessRole, PipelineType, SampleFileType, SampleTechnology, UploadStatus};

pub use sink::{RecordingSink, RowSink, SqlScriptSink};

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub processing_config: Option<Value>,
    pub notify_by_email: bool,
    pub samples_order: Vec<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentExecutionRow {
    pub experiment_id: String,
    pub pipeline_type: PipelineType,
    pub params_hash: Option<String>,
    pub state_machine_arn: String,
    pub execution_arn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    pub id: String,
    pub experiment_id: String,
    pub name: String,
    pub sample_technology: SampleTechnology,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleFileRow {
    pub id: Uuid,
    pub sample_file_type: SampleFileType,
    pub valid: bool,
    pub size: u64,
    pub s3_path: String,
    pub upload_status: UploadStatus,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTrackRow {
    pub experiment_id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToSampleFileRow {
    pub sample_id: String,
    pub sample_file_id: Uuid,
}

/// The track id is serial, so rows name the track by `(experiment_id, key)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInMetadataTrackRow {
    pub experiment_id: String,
    pub track_key: String,
    pub sample_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotRow {
    pub id: String,
    pub experiment_id: String,
    pub config: Value,
    pub s3_data_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserAccessRow {
    pub user_id: String,
    pub experiment_id: String,
    pub access_role: AccessRole,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InviteAccessRow {
    pub user_email: String,
    pub experiment_id: String,
    pub access_role: AccessRole,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Experiment(ExperimentRow),
    ExperimentExecution(ExperimentExecutionRow),
    Sample(SampleRow),
    SampleFile(SampleFileRow),
    MetadataTrack(MetadataTrackRow),
    SampleToSampleFile(SampleToSampleFileRow),
    SampleInMetadataTrack(SampleInMetadataTrackRow),
    Plot(PlotRow),
    UserAccess(UserAccessRow),
    InviteAccess(InviteAccessRow),
}

#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Text(String),
    Bool(bool),
    Int(u64),
    Json(Value),
    UuidArray(Vec<String>),
    Enum(&'static str, &'static str),
    Timestamp(String),
    Raw(String),
}

impl SqlValue {
    fn text(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }

    fn optional_text(value: Option<&str>) -> Self {
        value.map(SqlValue::text).unwrap_or(SqlValue::Null)
    }

    fn timestamp(value: Option<&str>) -> Self {
        match value {
            Some(value) => SqlValue::Timestamp(value.to_string()),
            None => SqlValue::Raw("now()".to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Text(value) => quote(value),
            SqlValue::Bool(value) => value.to_string(),
            SqlValue::Int(value) => value.to_string(),
            SqlValue::Json(value) => format!("{}::jsonb", quote(&value.to_string())),
            SqlValue::UuidArray(values) => {
                let items = values.iter().map(|value| quote(value)).collect::<Vec<_>>();
                format!("ARRAY[{}]::uuid[]", items.join(", "))
            }
            SqlValue::Enum(type_name, value) => format!("{}::{type_name}", quote(value)),
            SqlValue::Timestamp(value) => format!("{}::timestamptz", quote(value)),
            SqlValue::Raw(sql) => sql.clone(),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Row {
    pub fn table(&self) -> &'static str {
        match self {
            Row::Experiment(_) => "experiment",
            Row::ExperimentExecution(_) => "experiment_execution",
            Row::Sample(_) => "sample",
            Row::SampleFile(_) => "sample_file",
            Row::MetadataTrack(_) => "metadata_track",
            Row::SampleToSampleFile(_) => "sample_to_sample_file_map",
            Row::SampleInMetadataTrack(_) => "sample_in_metadata_track_map",
            Row::Plot(_) => "plot",
            Row::UserAccess(_) => "user_access",
            Row::InviteAccess(_) => "invite_access",
        }
    }

    fn columns(&self) -> Vec<(&'static str, SqlValue)> {
        match self {
            Row::Experiment(row) => vec![
                ("id", SqlValue::text(&row.id)),
                ("name", SqlValue::text(&row.name)),
                ("description", SqlValue::text(&row.description)),
                (
                    "processing_config",
                    row.processing_config
                        .clone()
                        .map(SqlValue::Json)
                        .unwrap_or(SqlValue::Null),
                ),
                ("notify_by_email", SqlValue::Bool(row.notify_by_email)),
                ("samples_order", SqlValue::UuidArray(row.samples_order.clone())),
                ("created_at", SqlValue::timestamp(row.created_at.as_deref())),
            ],
            Row::ExperimentExecution(row) => vec![
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                (
                    "pipeline_type",
                    SqlValue::Enum(PipelineType::TYPE_NAME, row.pipeline_type.as_str()),
                ),
                ("params_hash", SqlValue::optional_text(row.params_hash.as_deref())),
                ("state_machine_arn", SqlValue::text(&row.state_machine_arn)),
                ("execution_arn", SqlValue::text(&row.execution_arn)),
            ],
            Row::Sample(row) => vec![
                ("id", SqlValue::text(&row.id)),
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                ("name", SqlValue::text(&row.name)),
                (
                    "sample_technology",
                    SqlValue::Enum(SampleTechnology::TYPE_NAME, row.sample_technology.as_str()),
                ),
                ("created_at", SqlValue::timestamp(row.created_at.as_deref())),
                ("updated_at", SqlValue::timestamp(row.updated_at.as_deref())),
            ],
            Row::SampleFile(row) => vec![
                ("id", SqlValue::Text(row.id.to_string())),
                (
                    "sample_file_type",
                    SqlValue::Enum(SampleFileType::TYPE_NAME, row.sample_file_type.as_str()),
                ),
                ("valid", SqlValue::Bool(row.valid)),
                ("size", SqlValue::Int(row.size)),
                ("s3_path", SqlValue::text(&row.s3_path)),
                (
                    "upload_status",
                    SqlValue::Enum(UploadStatus::TYPE_NAME, row.upload_status.as_str()),
                ),
                ("updated_at", SqlValue::timestamp(row.updated_at.as_deref())),
            ],
            Row::MetadataTrack(row) => vec![
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                ("key", SqlValue::text(&row.key)),
            ],
            Row::SampleToSampleFile(row) => vec![
                ("sample_id", SqlValue::text(&row.sample_id)),
                ("sample_file_id", SqlValue::Text(row.sample_file_id.to_string())),
            ],
            Row::SampleInMetadataTrack(row) => vec![
                (
                    "metadata_track_id",
                    SqlValue::Raw(format!(
                        "(SELECT id FROM metadata_track WHERE experiment_id = {} AND key = {} ORDER BY id DESC LIMIT 1)",
                        quote(&row.experiment_id),
                        quote(&row.track_key)
                    )),
                ),
                ("sample_id", SqlValue::text(&row.sample_id)),
                ("value", SqlValue::text(&row.value)),
            ],
            Row::Plot(row) => vec![
                ("id", SqlValue::text(&row.id)),
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                ("config", SqlValue::Json(row.config.clone())),
                ("s3_data_key", SqlValue::optional_text(row.s3_data_key.as_deref())),
            ],
            Row::UserAccess(row) => vec![
                ("user_id", SqlValue::text(&row.user_id)),
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                (
                    "access_role",
                    SqlValue::Enum(AccessRole::TYPE_NAME, row.access_role.as_str()),
                ),
                ("updated_at", SqlValue::timestamp(row.updated_at.as_deref())),
            ],
            Row::InviteAccess(row) => vec![
                ("user_email", SqlValue::text(&row.user_email)),
                ("experiment_id", SqlValue::text(&row.experiment_id)),
                (
                    "access_role",
                    SqlValue::Enum(AccessRole::TYPE_NAME, row.access_role.as_str()),
                ),
                ("updated_at", SqlValue::timestamp(row.updated_at.as_deref())),
            ],
        }
    }

    /// Single Postgres `INSERT` statement for this row.
    pub fn to_sql(&self) -> String {
        let columns = self.columns();
        let names = columns.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        let values = columns
            .iter()
            .map(|(_, value)| value.render())
            .collect::<Vec<_>>();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.table(),
            names.join(", "),
            values.join(", ")
        )
    }
}
