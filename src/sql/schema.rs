use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MigrationError;

const SCHEMA_UP: &str = include_str!("schema_up.sql");
const SCHEMA_DOWN: &str = include_str!("schema_down.sql");

/// DDL creating the enums, tables and `updated_at` triggers.
pub fn up() -> &'static str {
    SCHEMA_UP
}

/// DDL dropping everything `up` creates, dependents first.
pub fn down() -> &'static str {
    SCHEMA_DOWN
}

/// Splits a DDL script into statements, keeping `$$` function bodies intact.
pub fn statements(script: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_body = false;
    let bytes = script.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index..].starts_with(b"$$") {
            in_body = !in_body;
            index += 2;
            continue;
        }
        if bytes[index] == b';' && !in_body {
            let statement = script[start..index].trim();
            if !statement.is_empty() {
                statements.push(statement);
            }
            start = index + 1;
        }
        index += 1;
    }
    let tail = script[start..].trim();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}

macro_rules! sql_enum {
    ($name:ident, $type_name:literal, { $($variant:ident => $value:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const TYPE_NAME: &'static str = $type_name;
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MigrationError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(MigrationError::InvalidEnum {
                        kind: $type_name,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

sql_enum!(PipelineType, "pipeline_type", {
    Qc => "qc",
    Gem2s => "gem2s",
});

sql_enum!(SampleTechnology, "sample_technology", {
    TenX => "10x",
    Rhapsody => "rhapsody",
});

sql_enum!(SampleFileType, "sample_file_type", {
    Features10x => "features10x",
    Barcodes10x => "barcodes10x",
    Matrix10x => "matrix10x",
    Rhapsody => "rhapsody",
});

sql_enum!(UploadStatus, "upload_status", {
    Uploaded => "uploaded",
    Uploading => "uploading",
    Compressing => "compressing",
    UploadError => "uploadError",
    FileNotFound => "fileNotFound",
    FileReadError => "fileReadError",
    FileReadAborted => "fileReadAborted",
});

sql_enum!(AccessRole, "access_role", {
    Owner => "owner",
    Admin => "admin",
    Explorer => "explorer",
    Viewer => "viewer",
});

impl SampleTechnology {
    /// Accepts both the stored enum value and the labels the UI used to write.
    pub fn from_label(label: &str) -> Result<Self, MigrationError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "10x" | "10x chromium" => Ok(SampleTechnology::TenX),
            "rhapsody" | "bd rhapsody" => Ok(SampleTechnology::Rhapsody),
            _ => Err(MigrationError::InvalidEnum {
                kind: SampleTechnology::TYPE_NAME,
                value: label.to_string(),
            }),
        }
    }
}

impl SampleFileType {
    /// File type from the key a file is stored under in a sample.
    pub fn from_file_key(key: &str, technology: SampleTechnology) -> Result<Self, MigrationError> {
        if technology == SampleTechnology::Rhapsody {
            return Ok(SampleFileType::Rhapsody);
        }
        let lower = key.to_ascii_lowercase();
        if lower.contains("features") || lower.contains("genes") {
            Ok(SampleFileType::Features10x)
        } else if lower.contains("barcodes") {
            Ok(SampleFileType::Barcodes10x)
        } else if lower.contains("matrix") {
            Ok(SampleFileType::Matrix10x)
        } else {
            Err(MigrationError::InvalidEnum {
                kind: SampleFileType::TYPE_NAME,
                value: key.to_string(),
            })
        }
    }
}

/// Tables carrying an `updated_at` column refreshed by trigger.
pub const TIMESTAMPED_TABLES: &[&str] = &[
    "experiment",
    "sample",
    "sample_file",
    "invite_access",
    "user_access",
];
