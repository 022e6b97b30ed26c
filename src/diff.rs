//! Three-way classification of source and sink snapshots.
//!
//! Every key in `keys(source) ∪ keys(sink)` lands in exactly one set:
//!
//! | Set | Condition |
//! |-----|-----------|
//! | `to_upsert` (new) | in source, absent from sink |
//! | `to_upsert` (changed) | in both, titles differ |
//! | `unchanged` | in both, titles equal |
//! | `to_delete` | in sink, absent from source |
//!
//! Ordering: `to_upsert` and `unchanged` follow source iteration order,
//! `to_delete` follows sink iteration order. Both snapshots iterate in
//! insertion order, so a run over the same inputs always yields the same
//! sequence.

use crate::models::{Snapshot, UpsertCandidate, UpsertKind};

/// Result of [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub to_upsert: Vec<UpsertCandidate>,
    pub to_delete: Vec<String>,
    pub unchanged: Vec<String>,
}

impl DiffResult {
    /// True when the sink already matches the source.
    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }

    pub fn count(&self, kind: UpsertKind) -> usize {
        self.to_upsert.iter().filter(|c| c.kind == kind).count()
    }
}

/// Compare the authoritative source with the current sink.
///
/// Linear in `|source| + |sink|`: one hash lookup per key on each side.
pub fn diff(source: &Snapshot, sink: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();

    for page in source.iter() {
        let kind = match sink.get(&page.key) {
            None => UpsertKind::New,
            Some(existing) if existing != page.title => UpsertKind::Changed,
            Some(_) => {
                result.unchanged.push(page.key.clone());
                continue;
            }
        };
        result.to_upsert.push(UpsertCandidate {
            key: page.key.clone(),
            title: page.title.clone(),
            kind,
        });
    }

    result.to_delete = sink
        .keys()
        .filter(|key| !source.contains_key(key))
        .map(str::to_string)
        .collect();

    result
}
