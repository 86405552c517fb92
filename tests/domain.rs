use assert_matches::assert_matches;
use serde_json::json;

use cellset_migrations::domain::{CellId, CellSets, ExperimentId, Sample};
use cellset_migrations::error::MigrationError;
use cellset_migrations::metadata::{sanitize_track_name, track_values_by_key};
use cellset_migrations::sql::schema::{SampleFileType, SampleTechnology, UploadStatus};

#[test]
fn parse_experiment_id() {
    let id: ExperimentId = "e52b39624588791a7889e39c617f669e".parse().unwrap();
    assert_eq!(id.as_str(), "e52b39624588791a7889e39c617f669e");

    let err = "../etc".parse::<ExperimentId>().unwrap_err();
    assert_matches!(err, MigrationError::MalformedReference(_));
}

#[test]
fn cell_ids_keep_their_shape() {
    let sets: CellSets = serde_json::from_value(json!({
        "cellSets": [
            { "key": "sample", "children": [{ "key": "s1", "name": "s1", "cellIds": [3, "AAAC-1"] }] }
        ]
    }))
    .unwrap();

    let child = &sets.cell_sets[0].children[0];
    assert_eq!(
        child.cell_ids,
        vec![CellId::Index(3), CellId::Opaque("AAAC-1".to_string())]
    );
}

#[test]
fn track_keys_are_sanitized_and_values_follow_sample_order() {
    let samples = serde_json::from_value(json!({
        "a": { "metadata": { "Cell--line": "HeLa" } },
        "b": { "metadata": { "Cell--line": 42 } },
        "c": { "metadata": {} }
    }))
    .unwrap();
    let sample_ids = ["c", "a", "b"].map(String::from);

    let values = track_values_by_key(&["Cell--line".to_string()], &sample_ids, &samples).unwrap();

    assert_eq!(sanitize_track_name("Cell--line"), "Cell_line");
    assert_eq!(values["Cell_line"], vec!["N/A", "HeLa", "42"]);
}

#[test]
fn unknown_sample_in_order_is_not_found() {
    let samples = serde_json::from_value(json!({ "a": { "metadata": { "Group": "X" } } })).unwrap();

    let err = track_values_by_key(&["Group".to_string()], &["zz".to_string()], &samples).unwrap_err();

    assert_matches!(err, MigrationError::NotFound { .. });
}

#[test]
fn sample_files_skip_last_modified() {
    let sample: Sample = serde_json::from_value(json!({
        "type": "BD Rhapsody",
        "files": {
            "expression_data.st.gz": { "size": 9, "valid": true, "upload": { "status": "uploaded" } },
            "lastModified": "2022-01-01T00:00:00Z"
        }
    }))
    .unwrap();

    let files = sample.attached_files().unwrap();
    assert_eq!(files.len(), 1);

    let technology = SampleTechnology::from_label(sample.technology.as_deref().unwrap()).unwrap();
    assert_eq!(technology, SampleTechnology::Rhapsody);
    assert_eq!(
        SampleFileType::from_file_key(files[0].0, technology).unwrap(),
        SampleFileType::Rhapsody
    );
}

#[test]
fn enum_values_match_the_schema() {
    assert_eq!("fileNotFound".parse::<UploadStatus>().unwrap(), UploadStatus::FileNotFound);
    assert_matches!(
        "done".parse::<UploadStatus>(),
        Err(MigrationError::InvalidEnum { kind: "upload_status", .. })
    );
    assert_eq!(SampleTechnology::TenX.to_string(), "10x");
}
