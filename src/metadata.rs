use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::domain::Sample;
use crate::error::MigrationError;

static HYPHEN_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

/// Replace every run of hyphens with a single underscore.
///
/// Downstream pipeline steps reject hyphens in identifiers, so cell-set
/// groups for metadata tracks are keyed by this form.
pub fn sanitize_track_name(track: &str) -> String {
    HYPHEN_RUNS.replace_all(track, "_").into_owned()
}

/// Values of `track`, one per entry of `sample_ids` and in that order.
pub fn ordered_track_values(
    track: &str,
    sample_ids: &[String],
    samples: &IndexMap<String, Sample>,
) -> Result<Vec<String>, MigrationError> {
    sample_ids
        .iter()
        .map(|sample_id| {
            samples
                .get(sample_id)
                .map(|sample| sample.metadata_value(track))
                .ok_or_else(|| MigrationError::not_found("sample", sample_id.as_str()))
        })
        .collect()
}

/// Canonical-order values for every track, keyed by sanitized track name.
pub fn track_values_by_key(
    tracks: &[String],
    sample_ids: &[String],
    samples: &IndexMap<String, Sample>,
) -> Result<IndexMap<String, Vec<String>>, MigrationError> {
    let mut values = IndexMap::with_capacity(tracks.len());
    for track in tracks {
        let key = sanitize_track_name(track);
        let track_values = ordered_track_values(track, sample_ids, samples)?;
        if values.insert(key.clone(), track_values).is_some() {
            return Err(MigrationError::Precondition(format!(
                "tracks {track:?} and an earlier track both map to cell set group {key}"
            )));
        }
    }
    Ok(values)
}
