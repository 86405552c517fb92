use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use cellset_migrations::app::App;
use cellset_migrations::config::{Config, ConfigLoader, DumpsEntry, Environment};
use cellset_migrations::document_store::Dumps;
use cellset_migrations::etl::StoreMigration;
use cellset_migrations::output::JsonOutput;
use cellset_migrations::pool::BoundedPool;
use cellset_migrations::report::ItemOutcome;
use cellset_migrations::sql::schema::{PipelineType, SampleFileType, UploadStatus};
use cellset_migrations::sql::{RecordingSink, Row};

fn project(uuid: &str, experiments: &[&str]) -> Value {
    json!({
        "projectUuid": uuid,
        "projects": {
            "name": "Lung atlas",
            "description": "two donors",
            "experiments": experiments,
            "metadataKeys": ["Group"]
        }
    })
}

fn experiment(id: &str, sample_ids: &[&str]) -> Value {
    json!({
        "experimentId": id,
        "projectId": "P1",
        "experimentName": "Lung",
        "sampleIds": sample_ids,
        "notifyByEmail": false,
        "meta": {
            "gem2s": {
                "paramsHash": "abc",
                "stateMachineArn": "arn:sm:gem2s",
                "executionArn": "arn:exec:gem2s"
            },
            "pipeline": {
                "paramsHash": "ignored",
                "stateMachineArn": "arn:sm:qc",
                "executionArn": "arn:exec:qc"
            }
        }
    })
}

fn sample(uuid: &str, group: Value) -> Value {
    json!({
        "uuid": uuid,
        "name": format!("sample {uuid}"),
        "type": "10X Chromium",
        "metadata": { "Group": group },
        "files": {
            "features.tsv.gz": {
                "size": 120,
                "valid": true,
                "upload": { "status": "uploaded" }
            },
            "lastModified": "2021-06-01T10:00:00.000Z"
        },
        "lastModified": "2021-06-01T10:00:00.000Z"
    })
}

fn dumps(projects: Vec<Value>, experiments: Vec<Value>, samples: Vec<Value>) -> Dumps {
    Dumps {
        projects: projects
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect(),
        experiments: experiments
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect(),
        samples: samples
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect(),
        ..Dumps::default()
    }
}

fn single_project() -> Dumps {
    dumps(
        vec![project("P1", &["E1"])],
        vec![experiment("E1", &["s1", "s2"])],
        vec![json!({
            "experimentId": "E1",
            "samples": {
                "s1": sample("s1", json!("control")),
                "s2": sample("s2", json!(""))
            }
        })],
    )
}

#[test]
fn project_expands_into_rows() {
    let migration = StoreMigration::new(single_project(), RecordingSink::new());
    let pool = BoundedPool::new(2).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert_eq!(report.outcome("P1"), Some(&ItemOutcome::Migrated));
    let sink = migration.sink();
    assert_eq!(sink.count("experiment"), 1);
    assert_eq!(sink.count("experiment_execution"), 2);
    assert_eq!(sink.count("sample"), 2);
    assert_eq!(sink.count("sample_file"), 2);
    assert_eq!(sink.count("sample_to_sample_file_map"), 2);
    assert_eq!(sink.count("metadata_track"), 1);
    assert_eq!(sink.count("sample_in_metadata_track_map"), 2);

    let rows = sink.rows();
    assert_matches!(&rows[0], Row::Experiment(row) if row.name == "Lung" && !row.notify_by_email);

    let qc = rows
        .iter()
        .find_map(|row| match row {
            Row::ExperimentExecution(row) if row.pipeline_type == PipelineType::Qc => Some(row),
            _ => None,
        })
        .unwrap();
    assert_eq!(qc.params_hash, None);
    assert_eq!(qc.execution_arn, "arn:exec:qc");

    let file = rows
        .iter()
        .find_map(|row| match row {
            Row::SampleFile(row) if row.s3_path.starts_with("P1/s1/") => Some(row),
            _ => None,
        })
        .unwrap();
    assert_eq!(file.s3_path, "P1/s1/features.tsv.gz");
    assert_eq!(file.sample_file_type, SampleFileType::Features10x);
    assert_eq!(file.upload_status, UploadStatus::Uploaded);
    assert!(rows.iter().any(|row| matches!(
        row,
        Row::SampleToSampleFile(mapping) if mapping.sample_file_id == file.id && mapping.sample_id == "s1"
    )));

    let mut values = rows
        .iter()
        .filter_map(|row| match row {
            Row::SampleInMetadataTrack(row) => Some((row.sample_id.clone(), row.value.clone())),
            _ => None,
        })
        .collect::<Vec<_>>();
    values.sort();
    assert_eq!(
        values,
        vec![
            ("s1".to_string(), "control".to_string()),
            ("s2".to_string(), "N/A".to_string())
        ]
    );
}

#[test]
fn parent_rows_precede_their_children() {
    let migration = StoreMigration::new(single_project(), RecordingSink::new());
    let pool = BoundedPool::new(4).unwrap();

    migration.migrate_projects(&pool, &JsonOutput);

    let rows = migration.sink().rows();
    let position = |predicate: &dyn Fn(&Row) -> bool| rows.iter().position(predicate).unwrap();
    let experiment = position(&|row| matches!(row, Row::Experiment(_)));
    let first_sample = position(&|row| matches!(row, Row::Sample(_)));
    let track = position(&|row| matches!(row, Row::MetadataTrack(_)));
    let first_value = position(&|row| matches!(row, Row::SampleInMetadataTrack(_)));
    assert!(experiment < first_sample);
    assert!(track < first_value);

    for (index, row) in rows.iter().enumerate() {
        if let Row::SampleToSampleFile(mapping) = row {
            let file = rows
                .iter()
                .position(|row| matches!(row, Row::SampleFile(file) if file.id == mapping.sample_file_id))
                .unwrap();
            assert!(file < index);
        }
    }
}

#[test]
fn incomplete_projects_are_skipped_without_rows() {
    let dumps = dumps(
        vec![
            json!({ "projectUuid": "P-no-data" }),
            project("P-no-experiment", &[]),
            project("P-dangling", &["E-missing"]),
            project("P-no-samples", &["E2"]),
        ],
        vec![experiment("E2", &[])],
        vec![],
    );
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(2).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert_eq!(report.summary.skipped, 4);
    assert!(!report.has_failures());
    assert!(migration.sink().is_empty());
}

#[test]
fn several_experiments_fail_the_project() {
    let dumps = dumps(
        vec![project("P1", &["E1", "E2"])],
        vec![experiment("E1", &["s1"]), experiment("E2", &[])],
        vec![json!({ "experimentId": "E1", "samples": { "s1": sample("s1", json!("a")) } })],
    );
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(1).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert_matches!(
        report.outcome("P1"),
        Some(ItemOutcome::Failed { kind, .. }) if kind == "precondition"
    );
    assert!(migration.sink().is_empty());
}

#[test]
fn mismatched_tracks_fail_before_any_insert() {
    let mut other = sample("s2", json!("b"));
    other["metadata"] = json!({ "Donor": "d1" });
    let dumps = dumps(
        vec![project("P1", &["E1"])],
        vec![experiment("E1", &["s1", "s2"])],
        vec![json!({
            "experimentId": "E1",
            "samples": { "s1": sample("s1", json!("a")), "s2": other }
        })],
    );
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(2).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert_matches!(
        report.outcome("P1"),
        Some(ItemOutcome::Failed { kind, .. }) if kind == "precondition"
    );
    assert!(migration.sink().is_empty());
}

#[test]
fn unknown_upload_status_fails_the_project() {
    let mut broken = sample("s1", json!("a"));
    broken["files"]["features.tsv.gz"]["upload"] = json!({});
    let dumps = dumps(
        vec![project("P1", &["E1"])],
        vec![experiment("E1", &["s1"])],
        vec![json!({ "experimentId": "E1", "samples": { "s1": broken } })],
    );
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(1).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert!(report.has_failures());
    assert!(migration.sink().is_empty());
}

#[test]
fn malformed_experiment_fails_only_its_project() {
    let mut broken = experiment("E2", &["s9"]);
    broken["sampleIds"] = Value::Null;
    let dumps = dumps(
        vec![project("P1", &["E1"]), project("P2", &["E2"]), json!({ "projectUuid": 7 })],
        vec![experiment("E1", &["s1", "s2"]), broken],
        vec![json!({
            "experimentId": "E1",
            "samples": {
                "s1": sample("s1", json!("control")),
                "s2": sample("s2", json!("treated"))
            }
        })],
    );
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(2).unwrap();

    let report = migration.migrate_projects(&pool, &JsonOutput);

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.outcome("P1"), Some(&ItemOutcome::Migrated));
    assert_matches!(
        report.outcome("P2"),
        Some(ItemOutcome::Failed { kind, .. }) if kind == "malformed_reference"
    );
    assert_eq!(report.summary.failed, 2);
    assert_eq!(migration.sink().count("experiment"), 1);
}

#[test]
fn malformed_access_record_fails_alone() {
    let mut dumps = Dumps::default();
    dumps.user_access = serde_json::from_value(json!([
        { "userId": "u1", "experimentId": "E1", "role": "owner" },
        { "userId": "u2", "experimentId": "E1", "role": null }
    ]))
    .unwrap();
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(1).unwrap();

    let report = migration.migrate_user_access(&pool);

    assert_eq!(report.outcome("u1/E1"), Some(&ItemOutcome::Migrated));
    assert_matches!(
        report.outcome("u2/E1"),
        Some(ItemOutcome::Failed { kind, .. }) if kind == "malformed_reference"
    );
}

#[test]
fn access_and_plot_records_report_one_item_each() {
    let mut dumps = Dumps::default();
    dumps.user_access = serde_json::from_value(json!([
        { "userId": "u1", "experimentId": "E1", "role": "owner" },
        { "userId": "u2", "experimentId": "E1", "role": "superuser" }
    ]))
    .unwrap();
    dumps.invite_access = serde_json::from_value(json!([
        { "userEmail": "a@example.org", "experimentId": "E1", "role": "viewer" }
    ]))
    .unwrap();
    dumps.plots = serde_json::from_value(json!([
        { "plotUuid": "embeddingCategoricalMain", "experimentId": "E1", "config": { "axes": {} } }
    ]))
    .unwrap();
    let migration = StoreMigration::new(dumps, RecordingSink::new());
    let pool = BoundedPool::new(2).unwrap();

    let report = migration.run(&pool, &JsonOutput);

    assert_eq!(report.user_access.summary.migrated, 1);
    assert_matches!(
        report.user_access.outcome("u2/E1"),
        Some(ItemOutcome::Failed { kind, .. }) if kind == "malformed_reference"
    );
    assert_eq!(report.invite_access.summary.migrated, 1);
    assert_eq!(report.plots.summary.migrated, 1);
    assert!(report.has_failures());
    assert_eq!(migration.sink().count("user_access"), 1);
    assert_eq!(migration.sink().count("invite_access"), 1);
    assert_eq!(migration.sink().count("plot"), 1);
}

#[test]
fn app_writes_insert_script_from_dump_files() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("dumps")).unwrap();
    std::fs::create_dir_all(dir.as_std_path()).unwrap();
    let write = |collection: &str, value: Value| {
        std::fs::write(
            dir.join(format!("{collection}-staging.json")).as_std_path(),
            serde_json::to_vec(&value).unwrap(),
        )
        .unwrap();
    };
    write("projects", json!([project("P1", &["E1"])]));
    write("experiments", json!([experiment("E1", &["s1"])]));
    write(
        "samples",
        json!([{ "experimentId": "E1", "samples": { "s1": sample("s1", json!("O'Brien")) } }]),
    );
    write(
        "user-access",
        json!([{ "userId": "u1", "experimentId": "E1", "role": "admin" }]),
    );
    write("invite-access", json!([]));
    write("plots-tables", json!([]));

    let output = Utf8PathBuf::from_path_buf(temp.path().join("out/migration.sql")).unwrap();
    let resolved = ConfigLoader::resolve_config(Config {
        environment: Some(Environment::Staging),
        max_in_flight: Some(2),
        dumps: Some(DumpsEntry::Shorthand(dir.to_string())),
        sql_output: Some(output.to_string()),
        ..Config::default()
    })
    .unwrap();

    let report = App::new(resolved).migrate_sql(&JsonOutput).unwrap();

    assert!(!report.has_failures());
    let script = std::fs::read_to_string(output.as_std_path()).unwrap();
    assert!(script.starts_with("-- document store migration (staging)"));
    assert!(script.contains("INSERT INTO experiment "));
    assert!(script.contains("'O''Brien'"));
    assert!(script.contains("INSERT INTO user_access "));
    let experiment = script.find("INSERT INTO experiment ").unwrap();
    let access = script.find("INSERT INTO user_access ").unwrap();
    assert!(experiment < access);
}

#[test]
fn app_survives_malformed_dump_entries() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let write = |collection: &str, value: Value| {
        std::fs::write(
            dir.join(format!("{collection}-development.json")).as_std_path(),
            serde_json::to_vec(&value).unwrap(),
        )
        .unwrap();
    };
    let mut broken = experiment("E2", &[]);
    broken["sampleIds"] = Value::Null;
    write("projects", json!([project("P1", &["E1"]), project("P2", &["E2"])]));
    write("experiments", json!([experiment("E1", &["s1"]), broken]));
    write(
        "samples",
        json!([{ "experimentId": "E1", "samples": { "s1": sample("s1", json!("a")) } }]),
    );
    write("user-access", json!([]));
    write("invite-access", json!([]));
    write("plots-tables", json!([]));

    let resolved = ConfigLoader::resolve_config(Config {
        dumps: Some(DumpsEntry::Shorthand(dir.to_string())),
        sql_output: Some(dir.join("out.sql").to_string()),
        ..Config::default()
    })
    .unwrap();

    let report = App::new(resolved).migrate_sql(&JsonOutput).unwrap();

    assert_eq!(report.projects.summary.migrated, 1);
    assert_eq!(report.projects.summary.failed, 1);
}

#[test]
fn missing_dump_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let resolved = ConfigLoader::resolve_config(Config {
        dumps: Some(DumpsEntry::Shorthand(temp.path().to_string_lossy().to_string())),
        sql_output: Some(temp.path().join("out.sql").to_string_lossy().to_string()),
        ..Config::default()
    })
    .unwrap();

    let result = App::new(resolved).migrate_sql(&JsonOutput);

    assert_matches!(
        result,
        Err(cellset_migrations::error::MigrationError::DumpRead { .. })
    );
}
