use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use cellset_migrations::config::{
    Config, ConfigLoader, Environment, ObjectStoreTarget, default_dump_paths,
};
use cellset_migrations::error::MigrationError;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("cellset-migrate.json");
    std::fs::write(
        &path,
        r#"{
            "environment": "production",
            "max_in_flight": 3,
            "object_store": { "endpoint": "https://s3.example.org/", "bucket": "archive" },
            "dumps": { "dir": "exports", "plots": "plots.json" },
            "sql_output": "out.sql"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.environment, Environment::Production);
    assert_eq!(resolved.max_in_flight, 3);
    assert_eq!(
        resolved.object_store,
        ObjectStoreTarget::Endpoint {
            endpoint: "https://s3.example.org".to_string(),
            region: "eu-west-1".to_string(),
            bucket: "archive".to_string(),
        }
    );
    assert_eq!(resolved.dumps.plots, Utf8PathBuf::from("exports/plots.json"));
    assert_eq!(
        resolved.dumps.samples,
        Utf8PathBuf::from("exports/samples-production.json")
    );
    assert_eq!(resolved.sql_output, Utf8PathBuf::from("out.sql"));
}

#[test]
fn directory_object_store_shorthand() {
    let config: Config =
        serde_json::from_str(r#"{ "object_store": "mirror/cell-sets", "dumps": "dumps" }"#)
            .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(
        resolved.object_store,
        ObjectStoreTarget::Directory(Utf8PathBuf::from("mirror/cell-sets"))
    );
    assert_eq!(resolved.dumps, default_dump_paths("dumps", Environment::Development));
}

#[test]
fn development_defaults_to_local_emulator() {
    let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
    assert_eq!(resolved.environment, Environment::Development);
    assert_matches!(
        resolved.object_store,
        ObjectStoreTarget::Endpoint { endpoint, bucket, .. }
            if endpoint == "http://localhost:4566" && bucket == "cell-sets-development"
    );
    assert_eq!(
        resolved.dumps.user_access,
        Utf8PathBuf::from("downloaded_data/user-access-development.json")
    );
}

#[test]
fn malformed_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(MigrationError::ConfigParse(_))
    );
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");

    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(MigrationError::ConfigRead(_))
    );
}
