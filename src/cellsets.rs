use indexmap::{IndexMap, IndexSet};

use crate::domain::{CellId, CellSets, SAMPLE_GROUP_KEY};
use crate::error::MigrationError;

/// Recompute the `cellIds` of every child of the group keyed `track_key`.
///
/// `values[i]` is the track value of `sample_ids[i]`. Each distinct value
/// receives the concatenated cells of its samples, in `sample_ids` order.
/// Nothing is written unless every group, child and sample resolves. With
/// no samples there is nothing to look up and the document is left as is.
pub fn rebuild_track_group(
    cell_sets: &mut CellSets,
    track_key: &str,
    sample_ids: &[String],
    values: &[String],
) -> Result<(), MigrationError> {
    if values.len() != sample_ids.len() {
        return Err(MigrationError::MalformedReference(format!(
            "track {track_key} has {} values for {} samples",
            values.len(),
            sample_ids.len()
        )));
    }

    if values.is_empty() {
        return Ok(());
    }

    let sample_cells = sample_cell_ids(cell_sets, sample_ids)?;

    let group_index = cell_sets
        .cell_sets
        .iter()
        .position(|group| group.key == track_key)
        .ok_or_else(|| {
            MigrationError::MalformedReference(format!("no cell set group keyed {track_key}"))
        })?;
    let group = &mut cell_sets.cell_sets[group_index];

    let distinct = values.iter().map(String::as_str).collect::<IndexSet<_>>();
    let mut updates = Vec::with_capacity(distinct.len());
    for value in distinct {
        let child_index = group
            .children
            .iter()
            .position(|child| child.name == value)
            .ok_or_else(|| {
                MigrationError::MalformedReference(format!(
                    "group {track_key} has no child named {value:?}"
                ))
            })?;

        let mut cell_ids = Vec::new();
        for (index, cells) in sample_cells.iter().enumerate() {
            if values[index] == value {
                cell_ids.extend(cells.iter().cloned());
            }
        }
        updates.push((child_index, cell_ids));
    }

    for (child_index, cell_ids) in updates {
        group.children[child_index].cell_ids = cell_ids;
    }
    Ok(())
}

/// Rebuild every track group listed in `track_values` (sanitized key → values).
pub fn rebuild_all(
    cell_sets: &mut CellSets,
    sample_ids: &[String],
    track_values: &IndexMap<String, Vec<String>>,
) -> Result<(), MigrationError> {
    for (track_key, values) in track_values {
        rebuild_track_group(cell_sets, track_key, sample_ids, values)?;
    }
    Ok(())
}

fn sample_cell_ids(
    cell_sets: &CellSets,
    sample_ids: &[String],
) -> Result<Vec<Vec<CellId>>, MigrationError> {
    let sample_group = cell_sets.group(SAMPLE_GROUP_KEY).ok_or_else(|| {
        MigrationError::MalformedReference(format!("no {SAMPLE_GROUP_KEY} cell set group"))
    })?;

    sample_ids
        .iter()
        .map(|sample_id| {
            sample_group
                .children
                .iter()
                .find(|child| child.sample_id() == sample_id)
                .map(|child| child.cell_ids.clone())
                .ok_or_else(|| {
                    MigrationError::MalformedReference(format!(
                        "sample group has no child for sample {sample_id}"
                    ))
                })
        })
        .collect()
}
