//! Catalog diffing keyed by stable id

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{CatalogSnapshot, Changeset, EntityChanges};

fn diff_by_id<T, F>(current: &[T], new: &[T], id_of: F) -> EntityChanges
where
    T: PartialEq,
    F: Fn(&T) -> &str,
{
    let existing: HashMap<&str, &T> = current.iter().map(|r| (id_of(r), r)).collect();
    let mut changes = EntityChanges::default();
    let mut seen = std::collections::HashSet::with_capacity(new.len());

    for record in new {
        let id = id_of(record);
        seen.insert(id);
        match existing.get(id) {
            None => changes.added.push(id.to_string()),
            Some(old) if *old != record => changes.changed.push(id.to_string()),
            Some(_) => {}
        }
    }

    changes.removed = current
        .iter()
        .map(|r| id_of(r))
        .filter(|id| !seen.contains(id))
        .map(str::to_string)
        .collect();

    changes
}

/// Compares the stored catalog with a freshly built one.
///
/// Records are plain catalog rows, so user-owned state such as favorites
/// never takes part in the comparison. A series counts as changed when any
/// of its episodes does.
pub fn compute_changeset(
    source_id: Uuid,
    current: &CatalogSnapshot,
    new: CatalogSnapshot,
) -> Changeset {
    let channels = diff_by_id(&current.channels, &new.channels, |c| c.id.as_str());
    let movies = diff_by_id(&current.movies, &new.movies, |m| m.id.as_str());
    let series = diff_by_id(&current.series, &new.series, |s| s.id.as_str());

    Changeset {
        source_id,
        catalog: new,
        channels,
        movies,
        series,
    }
}
