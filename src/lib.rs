//! Run-once migrations for the single-cell analysis platform.
//!
//! Two independent batch jobs live here: [`repair::CellSetRepair`] rebuilds
//! metadata cell sets whose values were paired with the wrong samples, and
//! [`etl::StoreMigration`] projects document-store dumps onto the
//! relational schema in [`sql::schema`].

pub mod app;
pub mod cellsets;
pub mod config;
pub mod document_store;
pub mod domain;
pub mod error;
pub mod etl;
pub mod metadata;
pub mod object_store;
pub mod output;
pub mod pool;
pub mod repair;
pub mod report;
pub mod sql;
