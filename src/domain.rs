use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MigrationError;

/// Value recorded for a sample that has no entry for a metadata track.
pub const DEFAULT_METADATA_VALUE: &str = "N/A";

/// Key of the cell-set group whose children hold the per-sample cells.
pub const SAMPLE_GROUP_KEY: &str = "sample";

/// Pseudo-file entry carried next to the real files of a sample.
pub const LAST_MODIFIED_FILE_KEY: &str = "lastModified";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExperimentId {
    type Err = MigrationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(MigrationError::MalformedReference(format!(
                "invalid experiment id: {value:?}"
            )));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellId {
    Index(u64),
    Opaque(String),
}

impl From<u64> for CellId {
    fn from(value: u64) -> Self {
        CellId::Index(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSetChild {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub name: String,
    #[serde(rename = "cellIds", default)]
    pub cell_ids: Vec<CellId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CellSetChild {
    pub fn new(key: Option<&str>, name: &str, cell_ids: Vec<CellId>) -> Self {
        Self {
            key: key.map(str::to_string),
            name: name.to_string(),
            cell_ids,
            extra: Map::new(),
        }
    }

    /// Sample children are keyed by sample id; older documents only carry a name.
    pub fn sample_id(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSetGroup {
    pub key: String,
    #[serde(default)]
    pub children: Vec<CellSetChild>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CellSetGroup {
    pub fn new(key: &str, children: Vec<CellSetChild>) -> Self {
        Self {
            key: key.to_string(),
            children,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSets {
    #[serde(rename = "cellSets")]
    pub cell_sets: Vec<CellSetGroup>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CellSets {
    pub fn new(cell_sets: Vec<CellSetGroup>) -> Self {
        Self {
            cell_sets,
            extra: Map::new(),
        }
    }

    pub fn group(&self, key: &str) -> Option<&CellSetGroup> {
        self.cell_sets.iter().find(|group| group.key == key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMeta {
    #[serde(default)]
    pub params_hash: Option<String>,
    #[serde(default)]
    pub state_machine_arn: Option<String>,
    #[serde(default)]
    pub execution_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    #[serde(default)]
    pub gem2s: Option<ExecutionMeta>,
    #[serde(default)]
    pub pipeline: Option<ExecutionMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRecord {
    pub experiment_id: String,
    #[serde(default)]
    pub sample_ids: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub experiment_name: Option<String>,
    #[serde(default)]
    pub meta: ExperimentMeta,
    #[serde(default)]
    pub processing_config: Option<Value>,
    #[serde(default)]
    pub notify_by_email: Option<bool>,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub experiments: Vec<String>,
    #[serde(default)]
    pub metadata_keys: Vec<String>,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub project_uuid: String,
    #[serde(default)]
    pub projects: Option<ProjectData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadInfo {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleFile {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub upload: Option<UploadInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
    #[serde(default)]
    pub files: IndexMap<String, Value>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl Sample {
    /// Scalar value of a metadata track; absent, null or empty resolves to `"N/A"`.
    pub fn metadata_value(&self, track: &str) -> String {
        match self.metadata.get(track) {
            None | Some(Value::Null) => DEFAULT_METADATA_VALUE.to_string(),
            Some(Value::String(value)) if value.is_empty() => DEFAULT_METADATA_VALUE.to_string(),
            Some(Value::String(value)) => value.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Real files of the sample, without the `lastModified` pseudo entry.
    pub fn attached_files(&self) -> Result<Vec<(&str, SampleFile)>, MigrationError> {
        self.files
            .iter()
            .filter(|(name, _)| name.as_str() != LAST_MODIFIED_FILE_KEY)
            .map(|(name, value)| {
                let file: SampleFile = serde_json::from_value(value.clone()).map_err(|err| {
                    MigrationError::Decode(format!("sample file {name}: {err}"))
                })?;
                Ok((name.as_str(), file))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplesRecord {
    pub experiment_id: String,
    #[serde(default)]
    pub samples: IndexMap<String, Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccessRecord {
    pub user_id: String,
    pub experiment_id: String,
    pub role: String,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteAccessRecord {
    pub user_email: String,
    pub experiment_id: String,
    pub role: String,
    #[serde(default)]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotRecord {
    pub plot_uuid: String,
    pub experiment_id: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub plot_data_key: Option<String>,
}
