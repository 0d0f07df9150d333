//! Client cache and reconciliation state machine.
//!
//! The reconciler is synchronous. It decides what the snapshot looks like
//! and which network calls must happen next (returned as tickets), while
//! [`crate::Session`] performs those calls and feeds the outcomes back.

use roster_core::{FieldPatch, FieldValue, Person, PersonDraft, PersonField, PersonId};

use crate::error::{ClientError, Result};
use crate::pending::{MutationId, MutationKind, MutationState, PendingMutation};
use crate::reset_guard::PageResetGuard;
use crate::snapshot::{CacheSnapshot, SnapshotOrigin};

/// A `getAll` call to perform. The result must be fed back with the same generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
}

/// A `create` call to perform.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub mutation: MutationId,
    pub draft: PersonDraft,
}

/// An `update` call to perform.
#[derive(Debug, Clone)]
pub struct UpdateTicket {
    pub mutation: MutationId,
    pub id: PersonId,
    pub patch: FieldPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    CreateFailed,
    UpdateFailed,
    FetchFailed,
}

/// A user-visible failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    InFlight { generation: u64 },
}

pub struct Reconciler {
    snapshot: CacheSnapshot,
    /// Bumped whenever the snapshot's records change
    revision: u64,
    loaded: bool,
    stale: bool,
    /// Last fetch generation handed out; results from older ones are ignored
    generation: u64,
    fetch: FetchState,
    /// An invalidation arrived while a fetch was in flight
    refetch_queued: bool,
    fetches_started: u64,
    pending: Vec<PendingMutation>,
    next_mutation: u64,
    next_placeholder: u64,
    create_state: MutationState,
    update_state: MutationState,
    notices: Vec<Notice>,
    reset_guard: PageResetGuard,
    reapply_pending: bool,
}

impl Reconciler {
    /// Creates an empty reconciler.
    ///
    /// With `reapply_pending` set, every fetched snapshot gets the still-pending
    /// optimistic mutations replayed on top of it.
    pub fn new(reapply_pending: bool) -> Self {
        Self {
            snapshot: CacheSnapshot::empty(),
            revision: 0,
            loaded: false,
            stale: true,
            generation: 0,
            fetch: FetchState::Idle,
            refetch_queued: false,
            fetches_started: 0,
            pending: Vec::new(),
            next_mutation: 1,
            next_placeholder: 1,
            create_state: MutationState::Idle,
            update_state: MutationState::Idle,
            notices: Vec::new(),
            reset_guard: PageResetGuard::default(),
            reapply_pending,
        }
    }

    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// At least one fetch has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn fetch_in_flight(&self) -> bool {
        matches!(self.fetch, FetchState::InFlight { .. })
    }

    /// Generation of the fetch whose result is still awaited.
    pub fn in_flight_generation(&self) -> Option<u64> {
        match self.fetch {
            FetchState::InFlight { generation } => Some(generation),
            FetchState::Idle => None,
        }
    }

    /// Total fetches handed out since creation.
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started
    }

    pub fn pending(&self) -> &[PendingMutation] {
        &self.pending
    }

    pub fn create_state(&self) -> MutationState {
        self.create_state
    }

    pub fn update_state(&self) -> MutationState {
        self.update_state
    }

    /// Nothing in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && !self.fetch_in_flight() && !self.refetch_queued
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn reset_guard_mut(&mut self) -> &mut PageResetGuard {
        &mut self.reset_guard
    }

    /// Marks the snapshot stale and returns a fetch to perform, unless one
    /// is already in flight, in which case a single follow-up is queued.
    pub fn invalidate(&mut self) -> Option<FetchTicket> {
        self.stale = true;
        match self.fetch {
            FetchState::InFlight { .. } => {
                self.refetch_queued = true;
                None
            }
            FetchState::Idle => Some(self.start_fetch()),
        }
    }

    /// The change feed reported an insert, update or delete.
    pub fn on_external_change(&mut self) -> Option<FetchTicket> {
        tracing::debug!("External change, invalidating snapshot");
        self.invalidate()
    }

    /// Cancels any in-flight fetch. Returns whether one was in flight.
    ///
    /// A late result of a cancelled fetch is ignored by [`Reconciler::complete_fetch`].
    pub fn cancel_fetches(&mut self) -> bool {
        let was_in_flight = self.fetch_in_flight();
        self.generation += 1;
        self.fetch = FetchState::Idle;
        self.refetch_queued = false;
        if was_in_flight {
            tracing::debug!("Cancelled in-flight fetch");
        }
        was_in_flight
    }

    /// Feeds back the result of a fetch.
    ///
    /// Returns the queued follow-up fetch, if any.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        result: Result<Vec<Person>>,
    ) -> Option<FetchTicket> {
        match self.fetch {
            FetchState::InFlight { generation: current } if current == generation => {}
            _ => {
                tracing::debug!("Ignoring result of superseded fetch {}", generation);
                return None;
            }
        }
        self.fetch = FetchState::Idle;

        match result {
            Ok(records) => {
                let mut next = CacheSnapshot::new(records, SnapshotOrigin::Fetch { generation });
                if self.reapply_pending {
                    for mutation in &self.pending {
                        next = mutation.apply_to(&next);
                    }
                }
                self.replace_snapshot(next);
                self.loaded = true;
                self.stale = self.refetch_queued;
            }
            Err(e) => {
                tracing::warn!("Fetch failed: {}", e);
                self.notices.push(Notice {
                    kind: NoticeKind::FetchFailed,
                    message: format!("Failed to load people: {}", e),
                });
            }
        }

        if self.refetch_queued {
            self.refetch_queued = false;
            Some(self.start_fetch())
        } else {
            None
        }
    }

    /// Optimistically appends `draft` under a placeholder id.
    pub fn begin_create(&mut self, draft: PersonDraft) -> CreateTicket {
        self.cancel_fetches();

        let mutation = self.next_mutation_id();
        let placeholder = PersonId::placeholder(self.next_placeholder);
        self.next_placeholder += 1;

        let before = self.snapshot.clone();
        let optimistic = draft.clone().into_person(placeholder);
        let after =
            before.with_appended(optimistic.clone(), SnapshotOrigin::Optimistic { mutation });
        self.set_snapshot(after);

        tracing::debug!("Optimistic create {} as {}", mutation, optimistic.id);
        self.pending.push(PendingMutation::Create {
            id: mutation,
            optimistic,
            before,
        });
        self.reset_guard.disarm();
        self.create_state = MutationState::Pending;

        CreateTicket { mutation, draft }
    }

    /// Validates a typed value for `field` and applies it optimistically.
    pub fn submit_field_update(
        &mut self,
        id: &PersonId,
        field: PersonField,
        value: FieldValue,
    ) -> Result<UpdateTicket> {
        let patch = FieldPatch::new(field, value)?;
        self.begin_field_update(id, patch)
    }

    /// Applies `patch` to record `id` optimistically.
    ///
    /// Placeholder ids and ids missing from the snapshot are rejected without
    /// touching any state.
    pub fn begin_field_update(&mut self, id: &PersonId, patch: FieldPatch) -> Result<UpdateTicket> {
        if id.is_placeholder() {
            return Err(ClientError::Validation(format!(
                "record '{}' has not been saved yet",
                id
            )));
        }
        if !self.snapshot.contains(id) {
            return Err(ClientError::NotFound(format!("record '{}' is not loaded", id)));
        }

        self.cancel_fetches();
        let mutation = self.next_mutation_id();
        let before = self.snapshot.clone();
        let after = before
            .with_patched(id, &patch, SnapshotOrigin::Optimistic { mutation })
            .ok_or_else(|| ClientError::NotFound(format!("record '{}' is not loaded", id)))?;
        self.set_snapshot(after);

        tracing::debug!("Optimistic update {} of {}.{}", mutation, id, patch.field());
        self.pending.push(PendingMutation::Update {
            id: mutation,
            target: id.clone(),
            patch: patch.clone(),
            before,
        });
        self.reset_guard.disarm();
        self.update_state = MutationState::Pending;

        Ok(UpdateTicket {
            mutation,
            id: id.clone(),
            patch,
        })
    }

    /// Settles a dispatched mutation.
    ///
    /// Failure restores the snapshot captured before the optimistic apply,
    /// with later pending mutations replayed on top, and records a notice. Either way the snapshot is invalidated; the returned
    /// ticket is the refetch to perform.
    pub fn settle(
        &mut self,
        mutation: MutationId,
        outcome: Result<Person>,
    ) -> Option<FetchTicket> {
        let Some(index) = self.pending.iter().position(|m| m.id() == mutation) else {
            tracing::warn!("Settle for unknown mutation {}", mutation);
            return self.invalidate();
        };
        let pending = self.pending.remove(index);
        let kind = pending.kind();

        let state = match outcome {
            Ok(person) => {
                tracing::debug!("{} {} confirmed as {}", kind, mutation, person.id);
                MutationState::Confirmed
            }
            Err(e) => {
                tracing::warn!("{} {} failed, rolling back: {}", kind, mutation, e);
                let message = match &pending {
                    PendingMutation::Create { optimistic, .. } => format!(
                        "Failed to create {} {}: {}",
                        optimistic.first_name, optimistic.last_name, e
                    ),
                    PendingMutation::Update { target, patch, .. } => {
                        format!("Failed to update {} of {}: {}", patch.field(), target, e)
                    }
                };
                self.notices.push(Notice {
                    kind: match kind {
                        MutationKind::Create => NoticeKind::CreateFailed,
                        MutationKind::Update => NoticeKind::UpdateFailed,
                    },
                    message,
                });
                // Later mutations were captured on top of this one; replay
                // them onto the restored snapshot and rebase their own rollback.
                let mut restored = pending.rollback();
                for later in &mut self.pending[index..] {
                    later.rebase(restored.clone());
                    restored = later.apply_to(&restored);
                }
                self.set_snapshot(restored);
                MutationState::RolledBack
            }
        };

        let still_pending = self.pending.iter().any(|m| m.kind() == kind);
        let slot = match kind {
            MutationKind::Create => &mut self.create_state,
            MutationKind::Update => &mut self.update_state,
        };
        *slot = if still_pending {
            MutationState::Pending
        } else {
            state
        };

        self.invalidate()
    }

    fn start_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.fetch = FetchState::InFlight {
            generation: self.generation,
        };
        self.fetches_started += 1;
        FetchTicket {
            generation: self.generation,
        }
    }

    fn next_mutation_id(&mut self) -> MutationId {
        let id = MutationId(self.next_mutation);
        self.next_mutation += 1;
        id
    }

    fn set_snapshot(&mut self, snapshot: CacheSnapshot) {
        self.snapshot = snapshot;
        self.revision += 1;
    }

    /// Like `set_snapshot`, but keeps the revision when the records are unchanged.
    fn replace_snapshot(&mut self, snapshot: CacheSnapshot) {
        if snapshot == self.snapshot {
            self.snapshot = snapshot;
        } else {
            self.set_snapshot(snapshot);
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(first: &str, last: &str, age: i32) -> Person {
        PersonDraft::new(first, last, age).into_person(PersonId::generate())
    }

    fn loaded(records: Vec<Person>) -> Reconciler {
        let mut core = Reconciler::default();
        let ticket = core.invalidate().unwrap();
        assert!(core.complete_fetch(ticket.generation, Ok(records)).is_none());
        core
    }

    fn failed() -> Result<Person> {
        Err(ClientError::Server {
            status: 500,
            message: "boom".into(),
        })
    }

    #[test]
    fn test_failed_create_restores_prior_snapshot() {
        let mut core = loaded(vec![person("Ada", "Lovelace", 36)]);
        let before = core.snapshot().clone();

        let ticket = core.begin_create(PersonDraft::new("Alan", "Turing", 41));
        assert_eq!(core.snapshot().len(), 2);
        assert!(core.snapshot().records()[1].id.is_placeholder());
        assert_eq!(core.create_state(), MutationState::Pending);

        let refetch = core.settle(ticket.mutation, failed());
        assert!(refetch.is_some());
        assert_eq!(core.snapshot(), &before);
        assert_eq!(
            core.snapshot().origin(),
            SnapshotOrigin::Rollback {
                mutation: ticket.mutation
            }
        );
        assert_eq!(core.create_state(), MutationState::RolledBack);
        let notices = core.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::CreateFailed);
        assert!(notices[0].message.contains("Alan Turing"));
    }

    #[test]
    fn test_placeholder_gone_after_refetch() {
        let mut core = loaded(Vec::new());
        let ticket = core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        let created = PersonDraft::new("Ada", "Lovelace", 36).into_person(PersonId::generate());

        let refetch = core.settle(ticket.mutation, Ok(created.clone())).unwrap();
        // Confirmation alone does not swap the placeholder.
        assert!(core.snapshot().has_placeholders());

        core.complete_fetch(refetch.generation, Ok(vec![created.clone()]));
        assert!(!core.snapshot().has_placeholders());
        assert_eq!(core.snapshot().records(), &[created]);
        assert_eq!(core.create_state(), MutationState::Confirmed);
        assert!(core.is_idle());
    }

    #[test]
    fn test_second_create_rollback_keeps_first() {
        let mut core = loaded(Vec::new());
        let first = core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        let second = core.begin_create(PersonDraft::new("Alan", "Turing", 41));
        assert_eq!(core.snapshot().len(), 2);

        core.settle(second.mutation, failed());
        assert_eq!(core.snapshot().len(), 1);
        assert_eq!(core.snapshot().records()[0].first_name, "Ada");
        assert!(core.snapshot().records()[0].id.is_placeholder());
        // The first create is still in flight.
        assert_eq!(core.create_state(), MutationState::Pending);

        core.settle(first.mutation, failed());
        assert!(core.snapshot().is_empty());
        assert_eq!(core.create_state(), MutationState::RolledBack);
    }

    #[test]
    fn test_earlier_rollback_keeps_later_optimistic_rows() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let before = core.snapshot().clone();

        let first = core.begin_create(PersonDraft::new("Alan", "Turing", 41));
        let second = core.begin_create(PersonDraft::new("Grace", "Hopper", 85));
        let edit = core
            .begin_field_update(&ada.id, FieldPatch::parse_input(PersonField::Age, "37").unwrap())
            .unwrap();

        core.settle(first.mutation, failed());
        let names: Vec<_> = core
            .snapshot()
            .records()
            .iter()
            .map(|p| p.first_name.as_str())
            .collect();
        assert_eq!(names, ["Ada", "Grace"]);
        assert_eq!(core.snapshot().records()[0].age, 37);
        assert_eq!(
            core.snapshot().origin(),
            SnapshotOrigin::Rollback {
                mutation: first.mutation
            }
        );

        // The later mutations no longer carry the failed row in their rollback.
        core.settle(second.mutation, failed());
        assert_eq!(core.snapshot().len(), 1);
        assert_eq!(core.snapshot().records()[0].age, 37);
        core.settle(edit.mutation, failed());
        assert_eq!(core.snapshot(), &before);
    }

    #[test]
    fn test_change_burst_coalesces_to_one_follow_up() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let started = core.fetches_started();

        let first = core.on_external_change().unwrap();
        for _ in 0..10 {
            assert!(core.on_external_change().is_none());
        }
        assert_eq!(core.fetches_started(), started + 1);

        let alan = person("Alan", "Turing", 41);
        let follow_up = core
            .complete_fetch(first.generation, Ok(vec![ada.clone()]))
            .unwrap();
        assert!(core.is_stale());
        assert!(core
            .complete_fetch(follow_up.generation, Ok(vec![ada.clone(), alan.clone()]))
            .is_none());
        assert_eq!(core.fetches_started(), started + 2);
        assert!(!core.is_stale());
        assert_eq!(core.snapshot().records(), &[ada, alan]);
    }

    #[test]
    fn test_single_change_reaches_same_final_state() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(Vec::new());
        let ticket = core.on_external_change().unwrap();
        assert!(core
            .complete_fetch(ticket.generation, Ok(vec![ada.clone()]))
            .is_none());
        assert_eq!(core.snapshot().records(), &[ada]);
    }

    #[test]
    fn test_non_numeric_age_rejected_before_dispatch() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let revision = core.revision();
        let fetches = core.fetches_started();

        let err = core
            .submit_field_update(&ada.id, PersonField::Age, FieldValue::Text("forty".into()))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(core.revision(), revision);
        assert_eq!(core.fetches_started(), fetches);
        assert!(core.pending().is_empty());
        assert_eq!(core.update_state(), MutationState::Idle);
    }

    #[test]
    fn test_update_rejects_placeholder_and_unknown_ids() {
        let mut core = loaded(Vec::new());
        core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        let placeholder = core.snapshot().records()[0].id.clone();

        let err = core
            .submit_field_update(&placeholder, PersonField::Age, FieldValue::Integer(37))
            .unwrap_err();
        assert!(err.is_validation());

        let err = core
            .submit_field_update(&PersonId::generate(), PersonField::Age, FieldValue::Integer(37))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[test]
    fn test_update_is_optimistic_and_rolls_back() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let before = core.snapshot().clone();

        let ticket = core
            .submit_field_update(&ada.id, PersonField::Age, FieldValue::Integer(41))
            .unwrap();
        assert_eq!(ticket.patch.value(), &FieldValue::Integer(41));
        assert_eq!(core.snapshot().records()[0].age, 41);

        core.settle(ticket.mutation, failed());
        assert_eq!(core.snapshot(), &before);
        assert_eq!(core.update_state(), MutationState::RolledBack);
        assert_eq!(core.notices()[0].kind, NoticeKind::UpdateFailed);
    }

    #[test]
    fn test_mutation_cancels_in_flight_fetch() {
        let mut core = loaded(Vec::new());
        let stale_fetch = core.on_external_change().unwrap();

        core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        assert!(!core.fetch_in_flight());

        // The cancelled fetch's late result must not clobber the optimistic row.
        assert!(core.complete_fetch(stale_fetch.generation, Ok(Vec::new())).is_none());
        assert_eq!(core.snapshot().len(), 1);
    }

    #[test]
    fn test_refetch_overwrites_pending_by_default() {
        let mut core = loaded(Vec::new());
        core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        let fetch = core.on_external_change().unwrap();
        core.complete_fetch(fetch.generation, Ok(Vec::new()));
        assert!(core.snapshot().is_empty());
    }

    #[test]
    fn test_refetch_reapplies_pending_when_enabled() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = Reconciler::new(true);
        let fetch = core.invalidate().unwrap();
        core.complete_fetch(fetch.generation, Ok(vec![ada.clone()]));

        core.begin_create(PersonDraft::new("Alan", "Turing", 41));
        core.submit_field_update(&ada.id, PersonField::FirstName, FieldValue::Text("Augusta".into()))
            .unwrap();

        let fetch = core.on_external_change().unwrap();
        core.complete_fetch(fetch.generation, Ok(vec![ada.clone()]));
        let records = core.snapshot().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].first_name, "Augusta");
        assert!(records[1].id.is_placeholder());
    }

    #[test]
    fn test_failed_fetch_keeps_snapshot_and_reports() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let fetch = core.invalidate().unwrap();
        core.complete_fetch(
            fetch.generation,
            Err(ClientError::Transport("connection refused".into())),
        );
        assert_eq!(core.snapshot().records(), &[ada]);
        assert!(core.is_stale());
        assert_eq!(core.notices()[0].kind, NoticeKind::FetchFailed);
    }

    #[test]
    fn test_identical_refetch_keeps_revision() {
        let ada = person("Ada", "Lovelace", 36);
        let mut core = loaded(vec![ada.clone()]);
        let revision = core.revision();
        let fetch = core.invalidate().unwrap();
        core.complete_fetch(fetch.generation, Ok(vec![ada]));
        assert_eq!(core.revision(), revision);
    }

    #[test]
    fn test_mutation_disarms_reset_guard() {
        let mut core = loaded(Vec::new());
        assert!(core.reset_guard_mut().is_armed());
        core.begin_create(PersonDraft::new("Ada", "Lovelace", 36));
        assert_eq!(
            *core.reset_guard_mut(),
            PageResetGuard::DisarmedForNextCycle
        );
    }
}
