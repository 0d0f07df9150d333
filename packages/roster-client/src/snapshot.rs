//! Immutable cache snapshots.

use std::sync::Arc;

use roster_core::{FieldPatch, Person, PersonId};

use crate::pending::MutationId;

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Nothing loaded yet
    Empty,
    /// Authoritative `getAll` response of the given fetch generation
    Fetch { generation: u64 },
    /// Optimistic apply of a pending mutation
    Optimistic { mutation: MutationId },
    /// Restored from the pre-edit capture of a failed mutation
    Rollback { mutation: MutationId },
}

/// Ordered Person records in server return order, plus where they came from.
///
/// Records sit behind an `Arc`, so capturing a snapshot for rollback is a
/// pointer copy.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    records: Arc<Vec<Person>>,
    origin: SnapshotOrigin,
}

impl CacheSnapshot {
    pub fn empty() -> Self {
        Self {
            records: Arc::new(Vec::new()),
            origin: SnapshotOrigin::Empty,
        }
    }

    pub fn new(records: Vec<Person>, origin: SnapshotOrigin) -> Self {
        Self {
            records: Arc::new(records),
            origin,
        }
    }

    pub fn records(&self) -> &[Person] {
        &self.records
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &PersonId) -> Option<&Person> {
        self.records.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.get(id).is_some()
    }

    /// Whether any record still carries a placeholder id.
    pub fn has_placeholders(&self) -> bool {
        self.records.iter().any(|p| p.id.is_placeholder())
    }

    /// Copy with `person` appended.
    pub fn with_appended(&self, person: Person, origin: SnapshotOrigin) -> Self {
        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.extend(self.records.iter().cloned());
        records.push(person);
        Self::new(records, origin)
    }

    /// Copy with `patch` applied to record `id`, or `None` if `id` is absent.
    pub fn with_patched(
        &self,
        id: &PersonId,
        patch: &FieldPatch,
        origin: SnapshotOrigin,
    ) -> Option<Self> {
        let index = self.records.iter().position(|p| &p.id == id)?;
        let mut records = self.records.as_ref().clone();
        records[index].apply(patch);
        Some(Self::new(records, origin))
    }

    /// Same records, different origin.
    pub(crate) fn relabel(&self, origin: SnapshotOrigin) -> Self {
        Self {
            records: self.records.clone(),
            origin,
        }
    }
}

/// Snapshots compare by records only.
impl PartialEq for CacheSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for CacheSnapshot {}
