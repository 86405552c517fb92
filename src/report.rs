use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MigrationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Migrated,
    Skipped { reason: String },
    Failed { kind: String, error: String },
}

impl ItemOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        ItemOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: &MigrationError) -> Self {
        ItemOutcome::Failed {
            kind: error.category().to_string(),
            error: error.to_string(),
        }
    }

    pub fn from_result(result: Result<ItemOutcome, MigrationError>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(err) => ItemOutcome::failed(&err),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }

    /// Short human form used in progress messages.
    pub fn describe(&self) -> String {
        match self {
            ItemOutcome::Migrated => "migrated".to_string(),
            ItemOutcome::Skipped { reason } => format!("skipped ({reason})"),
            ItemOutcome::Failed { error, .. } => format!("failed ({error})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn new(job: &str, started_at: DateTime<Utc>, items: Vec<ItemReport>) -> Self {
        let mut summary = BatchSummary {
            total: items.len(),
            ..BatchSummary::default()
        };
        for item in &items {
            match item.outcome {
                ItemOutcome::Migrated => summary.migrated += 1,
                ItemOutcome::Skipped { .. } => summary.skipped += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        Self {
            job: job.to_string(),
            started_at,
            finished_at: Utc::now(),
            summary,
            items,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn outcome(&self, id: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .map(|item| &item.outcome)
    }
}
