use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::DumpPaths;
use crate::domain::{
    ExperimentRecord, InviteAccessRecord, PlotRecord, ProjectRecord, SamplesRecord,
    UserAccessRecord,
};
use crate::error::MigrationError;

/// Keyed lookups against the experiments, projects and samples tables.
pub trait DocumentStore: Send + Sync {
    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord, MigrationError>;
    fn get_project(&self, project_uuid: &str) -> Result<ProjectRecord, MigrationError>;
    fn get_samples(&self, experiment_id: &str) -> Result<SamplesRecord, MigrationError>;
}

/// A dump entry decoded on its own, so one bad record only fails its own item.
#[derive(Debug, Clone)]
pub struct DumpRecord<T> {
    key: Option<String>,
    decoded: Result<T, String>,
}

impl<T> DumpRecord<T> {
    /// Raw key of the entry, readable even when the record failed to decode.
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(UNKEYED)
    }

    pub fn get(&self) -> Result<&T, MigrationError> {
        self.decoded
            .as_ref()
            .map_err(|err| MigrationError::Decode(format!("record {}: {err}", self.key())))
    }
}

impl<T: DeserializeOwned + DumpKey> DumpRecord<T> {
    pub fn from_value(raw: Value) -> Self {
        let key = T::dump_key(&raw);
        let decoded = serde_json::from_value(raw).map_err(|err| err.to_string());
        Self { key, decoded }
    }
}

impl<'de, T: DeserializeOwned + DumpKey> Deserialize<'de> for DumpRecord<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

const UNKEYED: &str = "<unkeyed>";

/// Identifies a dump entry from its raw JSON.
pub trait DumpKey {
    fn dump_key(raw: &Value) -> Option<String>;
}

fn text_field(raw: &Value, field: &str) -> Option<String> {
    raw.get(field).and_then(Value::as_str).map(str::to_string)
}

fn pair_key(raw: &Value, first: &str, second: &str) -> Option<String> {
    Some(format!("{}/{}", text_field(raw, first)?, text_field(raw, second)?))
}

impl DumpKey for ProjectRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        text_field(raw, "projectUuid")
    }
}

impl DumpKey for ExperimentRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        text_field(raw, "experimentId")
    }
}

impl DumpKey for SamplesRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        text_field(raw, "experimentId")
    }
}

impl DumpKey for UserAccessRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        pair_key(raw, "userId", "experimentId")
    }
}

impl DumpKey for InviteAccessRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        pair_key(raw, "userEmail", "experimentId")
    }
}

impl DumpKey for PlotRecord {
    fn dump_key(raw: &Value) -> Option<String> {
        pair_key(raw, "plotUuid", "experimentId")
    }
}

/// Whole-table exports of the document store, one JSON array per table.
#[derive(Debug, Clone, Default)]
pub struct Dumps {
    pub projects: Vec<DumpRecord<ProjectRecord>>,
    pub experiments: Vec<DumpRecord<ExperimentRecord>>,
    pub samples: Vec<DumpRecord<SamplesRecord>>,
    pub user_access: Vec<DumpRecord<UserAccessRecord>>,
    pub invite_access: Vec<DumpRecord<InviteAccessRecord>>,
    pub plots: Vec<DumpRecord<PlotRecord>>,
}

impl Dumps {
    pub fn load(paths: &DumpPaths) -> Result<Self, MigrationError> {
        let mut dumps = Self::load_documents(paths)?;
        dumps.user_access = read_dump(&paths.user_access)?;
        dumps.invite_access = read_dump(&paths.invite_access)?;
        dumps.plots = read_dump(&paths.plots)?;
        Ok(dumps)
    }

    /// Only the tables the cell-set repair reads.
    pub fn load_documents(paths: &DumpPaths) -> Result<Self, MigrationError> {
        Ok(Self {
            projects: read_dump(&paths.projects)?,
            experiments: read_dump(&paths.experiments)?,
            samples: read_dump(&paths.samples)?,
            ..Self::default()
        })
    }

    pub fn experiment(&self, experiment_id: &str) -> Option<&DumpRecord<ExperimentRecord>> {
        self.experiments
            .iter()
            .find(|record| record.key.as_deref() == Some(experiment_id))
    }

    pub fn samples_of(&self, experiment_id: &str) -> Option<&DumpRecord<SamplesRecord>> {
        self.samples
            .iter()
            .find(|record| record.key.as_deref() == Some(experiment_id))
    }
}

/// Only a file that is not a JSON array fails here; entries decode lazily.
fn read_dump<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, MigrationError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| MigrationError::DumpRead {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|err| MigrationError::DumpRead {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    })
}

/// Document store served from loaded dumps.
#[derive(Debug, Clone, Default)]
pub struct DumpDocumentStore {
    experiments: HashMap<String, DumpRecord<ExperimentRecord>>,
    projects: HashMap<String, DumpRecord<ProjectRecord>>,
    samples: HashMap<String, DumpRecord<SamplesRecord>>,
}

impl DumpDocumentStore {
    pub fn from_dumps(dumps: Dumps) -> Self {
        Self {
            experiments: by_key("experiments", dumps.experiments),
            projects: by_key("projects", dumps.projects),
            samples: by_key("samples", dumps.samples),
        }
    }
}

fn by_key<T>(table: &str, records: Vec<DumpRecord<T>>) -> HashMap<String, DumpRecord<T>> {
    let mut indexed = HashMap::with_capacity(records.len());
    for record in records {
        match record.key.clone() {
            Some(key) => {
                indexed.insert(key, record);
            }
            None => tracing::warn!(table, "dump entry without key ignored"),
        }
    }
    indexed
}

fn lookup<T: Clone>(
    records: &HashMap<String, DumpRecord<T>>,
    kind: &'static str,
    key: &str,
) -> Result<T, MigrationError> {
    records
        .get(key)
        .ok_or_else(|| MigrationError::not_found(kind, key))?
        .get()
        .cloned()
}

impl DocumentStore for DumpDocumentStore {
    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord, MigrationError> {
        lookup(&self.experiments, "experiment", experiment_id)
    }

    fn get_project(&self, project_uuid: &str) -> Result<ProjectRecord, MigrationError> {
        lookup(&self.projects, "project", project_uuid)
    }

    fn get_samples(&self, experiment_id: &str) -> Result<SamplesRecord, MigrationError> {
        lookup(&self.samples, "samples", experiment_id)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn lookups_by_key() {
        let dumps = Dumps {
            experiments: serde_json::from_value(json!([
                { "experimentId": "e1", "sampleIds": ["s1"], "projectId": "p1" }
            ]))
            .unwrap(),
            ..Dumps::default()
        };
        let store = DumpDocumentStore::from_dumps(dumps);

        let experiment = store.get_experiment("e1").unwrap();
        assert_eq!(experiment.project_id.as_deref(), Some("p1"));
        assert_matches!(
            store.get_samples("e1").unwrap_err(),
            MigrationError::NotFound { kind: "samples", .. }
        );
    }

    #[test]
    fn malformed_entry_does_not_fail_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("experiments.json");
        fs::write(
            path.as_std_path(),
            json!([
                { "experimentId": "e1", "sampleIds": ["s1"] },
                { "experimentId": "e2", "sampleIds": null },
                { "sampleIds": [] }
            ])
            .to_string(),
        )
        .unwrap();

        let records: Vec<DumpRecord<ExperimentRecord>> = read_dump(&path).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get().unwrap().sample_ids, vec!["s1".to_string()]);
        assert_eq!(records[1].key(), "e2");
        assert_matches!(records[1].get(), Err(MigrationError::Decode(_)));
        assert_eq!(records[2].key(), UNKEYED);

        let store = DumpDocumentStore::from_dumps(Dumps {
            experiments: records,
            ..Dumps::default()
        });
        assert!(store.get_experiment("e1").is_ok());
        assert_matches!(
            store.get_experiment("e2").unwrap_err(),
            MigrationError::Decode(_)
        );
    }

    #[test]
    fn access_entries_are_keyed_by_user_and_experiment() {
        let record = DumpRecord::<UserAccessRecord>::from_value(
            json!({ "userId": "u1", "experimentId": "e1", "role": 3 }),
        );
        assert_eq!(record.key(), "u1/e1");
        assert!(record.get().is_err());
    }
}
