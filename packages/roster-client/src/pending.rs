//! In-flight optimistic mutations.

use std::fmt;

use roster_core::{FieldPatch, Person, PersonId};

use crate::snapshot::{CacheSnapshot, SnapshotOrigin};

/// Identifies one dispatched mutation for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => f.write_str("create"),
            MutationKind::Update => f.write_str("update"),
        }
    }
}

/// Lifecycle of the most recent mutation of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Pending,
    Confirmed,
    RolledBack,
}

/// A mutation that has been applied optimistically and not yet settled.
///
/// Both variants carry the snapshot captured right before their optimistic
/// apply, and both roll back the same way.
#[derive(Debug, Clone)]
pub enum PendingMutation {
    Create {
        id: MutationId,
        /// Draft with its placeholder id, as appended to the snapshot
        optimistic: Person,
        before: CacheSnapshot,
    },
    Update {
        id: MutationId,
        target: PersonId,
        patch: FieldPatch,
        before: CacheSnapshot,
    },
}

impl PendingMutation {
    pub fn id(&self) -> MutationId {
        match self {
            PendingMutation::Create { id, .. } | PendingMutation::Update { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            PendingMutation::Create { .. } => MutationKind::Create,
            PendingMutation::Update { .. } => MutationKind::Update,
        }
    }

    pub fn before(&self) -> &CacheSnapshot {
        match self {
            PendingMutation::Create { before, .. } | PendingMutation::Update { before, .. } => {
                before
            }
        }
    }

    /// Replaces the captured snapshot after an earlier mutation was rolled back.
    pub(crate) fn rebase(&mut self, snapshot: CacheSnapshot) {
        match self {
            PendingMutation::Create { before, .. } | PendingMutation::Update { before, .. } => {
                *before = snapshot
            }
        }
    }

    /// Snapshot to restore when this mutation fails.
    pub fn rollback(self) -> CacheSnapshot {
        let id = self.id();
        self.before().relabel(SnapshotOrigin::Rollback { mutation: id })
    }

    /// Applies this mutation's optimistic effect on top of `base`.
    ///
    /// Creates are skipped when the placeholder is already present; updates
    /// are skipped when the target is not in `base`.
    pub fn apply_to(&self, base: &CacheSnapshot) -> CacheSnapshot {
        let origin = base.origin();
        match self {
            PendingMutation::Create { optimistic, .. } => {
                if base.contains(&optimistic.id) {
                    base.clone()
                } else {
                    base.with_appended(optimistic.clone(), origin)
                }
            }
            PendingMutation::Update { target, patch, .. } => base
                .with_patched(target, patch, origin)
                .unwrap_or_else(|| base.clone()),
        }
    }
}
