//! Person table storage.
//!
//! The table has:
//! - Copy-on-write record list behind an `ArcSwap` for lock-free reads
//! - Id index guarded by the writer mutex
//! - Revision counter bumped on every write (drives persistence flushes)
//! - Change feed that receives one event per write

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::change_feed::{ChangeFeed, ChangeKind};
use crate::error::StoreError;
use crate::person::{FieldPatch, Person, PersonDraft, PersonId, PERSON_TABLE};

/// In-memory Person table.
#[derive(Debug)]
pub struct PersonTable {
    /// Table name as reported by the change feed
    pub name: String,
    /// Records in insertion order
    records: ArcSwap<Vec<Person>>,
    /// Record id to position in `records`; also serializes writers
    index: Mutex<HashMap<PersonId, usize>>,
    /// Number of writes applied since startup
    revision: AtomicU64,
    /// Feed notified of every insert and update
    feed: Arc<ChangeFeed>,
}

impl PersonTable {
    /// Creates an empty table publishing to `feed`.
    pub fn new(feed: Arc<ChangeFeed>) -> Self {
        Self {
            name: PERSON_TABLE.to_string(),
            records: ArcSwap::from_pointee(Vec::new()),
            index: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            feed,
        }
    }

    /// Returns every record in insertion order.
    pub fn find_many(&self) -> Arc<Vec<Person>> {
        self.records.load_full()
    }

    /// Looks up one record by id.
    pub fn get(&self, id: &PersonId) -> Option<Person> {
        let index = self.index.lock().ok()?;
        let position = *index.get(id)?;
        self.records.load().get(position).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write counter, used to detect unflushed changes.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    /// Inserts a draft under a freshly generated id.
    ///
    /// # Returns
    /// The stored record, including its server-assigned id.
    pub fn create(&self, draft: PersonDraft) -> Result<Person, StoreError> {
        let person = {
            let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut id = PersonId::generate();
            while index.contains_key(&id) {
                id = PersonId::generate();
            }
            let person = draft.into_person(id);

            let mut records = Vec::clone(&self.records.load());
            index.insert(person.id.clone(), records.len());
            records.push(person.clone());
            self.records.store(Arc::new(records));
            self.revision.fetch_add(1, Ordering::AcqRel);
            person
        };

        tracing::debug!("Created {} {}", self.name, person.id);
        self.feed
            .publish(ChangeKind::Insert, &self.name, person.id.clone())?;
        Ok(person)
    }

    /// Applies a single-field patch to the record with `id`.
    ///
    /// # Returns
    /// The updated record, or `RecordNotFound` if `id` does not resolve.
    pub fn update(&self, id: &PersonId, patch: &FieldPatch) -> Result<Person, StoreError> {
        let person = {
            let index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
            let position = *index.get(id).ok_or_else(|| StoreError::RecordNotFound {
                table: self.name.clone(),
                id: id.to_string(),
            })?;

            let mut records = Vec::clone(&self.records.load());
            let person = records
                .get_mut(position)
                .ok_or_else(|| StoreError::DataCorruption(format!("index points past {id}")))?;
            person.apply(patch);
            let person = person.clone();
            self.records.store(Arc::new(records));
            self.revision.fetch_add(1, Ordering::AcqRel);
            person
        };

        tracing::debug!(
            "Updated {} {} field {}",
            self.name,
            person.id,
            patch.field()
        );
        self.feed
            .publish(ChangeKind::Update, &self.name, person.id.clone())?;
        Ok(person)
    }

    /// Replaces the whole table with previously persisted records.
    ///
    /// Publishes no change events and leaves the revision untouched.
    pub fn restore(&self, records: Vec<Person>) -> Result<(), StoreError> {
        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut rebuilt = HashMap::with_capacity(records.len());
        for (position, person) in records.iter().enumerate() {
            if rebuilt.insert(person.id.clone(), position).is_some() {
                return Err(StoreError::DataCorruption(format!(
                    "duplicate id {} in {}",
                    person.id, self.name
                )));
            }
        }
        *index = rebuilt;
        self.records.store(Arc::new(records));
        Ok(())
    }
}
