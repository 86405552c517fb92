use std::fmt;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

pub const DEFAULT_CONFIG_FILE: &str = "cellset-migrate.json";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    #[serde(default)]
    pub object_store: Option<ObjectStoreEntry>,
    #[serde(default)]
    pub dumps: Option<DumpsEntry>,
    #[serde(default)]
    pub sql_output: Option<String>,
}

/// Either a directory mirroring the bucket or an S3-compatible endpoint.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ObjectStoreEntry {
    Directory(String),
    Endpoint(ObjectStoreEndpoint),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ObjectStoreEndpoint {
    pub endpoint: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DumpsEntry {
    Shorthand(String),
    Detailed(DumpsEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DumpsEntryObject {
    pub dir: String,
    #[serde(default)]
    pub projects: Option<String>,
    #[serde(default)]
    pub experiments: Option<String>,
    #[serde(default)]
    pub samples: Option<String>,
    #[serde(default)]
    pub user_access: Option<String>,
    #[serde(default)]
    pub invite_access: Option<String>,
    #[serde(default)]
    pub plots: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreTarget {
    Directory(Utf8PathBuf),
    Endpoint {
        endpoint: String,
        region: String,
        bucket: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPaths {
    pub projects: Utf8PathBuf,
    pub experiments: Utf8PathBuf,
    pub samples: Utf8PathBuf,
    pub user_access: Utf8PathBuf,
    pub invite_access: Utf8PathBuf,
    pub plots: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub max_in_flight: usize,
    pub object_store: ObjectStoreTarget,
    pub dumps: DumpPaths,
    pub sql_output: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MigrationError> {
        Self::resolve_config(Self::load(path)?)
    }

    /// Reads the raw config file without applying defaults.
    pub fn load(path: Option<&str>) -> Result<Config, MigrationError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(MigrationError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MigrationError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| MigrationError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MigrationError> {
        let environment = config.environment.unwrap_or(Environment::Development);

        let max_in_flight = config.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT);
        if max_in_flight == 0 {
            return Err(MigrationError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        let object_store = match config.object_store {
            Some(ObjectStoreEntry::Directory(dir)) => {
                ObjectStoreTarget::Directory(Utf8PathBuf::from(dir))
            }
            Some(ObjectStoreEntry::Endpoint(obj)) => ObjectStoreTarget::Endpoint {
                endpoint: obj.endpoint.trim_end_matches('/').to_string(),
                region: obj.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
                bucket: obj.bucket.unwrap_or_else(|| cell_sets_bucket(environment)),
            },
            None => default_object_store(environment),
        };

        let dumps = match config.dumps {
            Some(DumpsEntry::Shorthand(dir)) => default_dump_paths(&dir, environment),
            Some(DumpsEntry::Detailed(obj)) => {
                let defaults = default_dump_paths(&obj.dir, environment);
                let dir = Utf8PathBuf::from(&obj.dir);
                let pick = |value: Option<String>, fallback: Utf8PathBuf| {
                    value.map(|name| dir.join(name)).unwrap_or(fallback)
                };
                DumpPaths {
                    projects: pick(obj.projects, defaults.projects),
                    experiments: pick(obj.experiments, defaults.experiments),
                    samples: pick(obj.samples, defaults.samples),
                    user_access: pick(obj.user_access, defaults.user_access),
                    invite_access: pick(obj.invite_access, defaults.invite_access),
                    plots: pick(obj.plots, defaults.plots),
                }
            }
            None => default_dump_paths("downloaded_data", environment),
        };

        let sql_output = config
            .sql_output
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(format!("migration-{environment}.sql")));

        Ok(ResolvedConfig {
            environment,
            max_in_flight,
            object_store,
            dumps,
            sql_output,
        })
    }
}

pub fn cell_sets_bucket(environment: Environment) -> String {
    format!("cell-sets-{environment}")
}

/// Development talks to a local S3 emulator; other environments to AWS proper.
pub fn default_object_store(environment: Environment) -> ObjectStoreTarget {
    let endpoint = match environment {
        Environment::Development => "http://localhost:4566".to_string(),
        _ => format!("https://s3.{DEFAULT_REGION}.amazonaws.com"),
    };
    ObjectStoreTarget::Endpoint {
        endpoint,
        region: DEFAULT_REGION.to_string(),
        bucket: cell_sets_bucket(environment),
    }
}

pub fn default_dump_paths(dir: &str, environment: Environment) -> DumpPaths {
    let dir = Utf8PathBuf::from(dir);
    let file = |collection: &str| dir.join(format!("{collection}-{environment}.json"));
    DumpPaths {
        projects: file("projects"),
        experiments: file("experiments"),
        samples: file("samples"),
        user_access: file("user-access"),
        invite_access: file("invite-access"),
        plots: file("plots-tables"),
    }
}
