use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use recordkit_core::{FieldValue, Record, RecordId};
use recordkit_storage::{Criteria, StorageError, Store};

/// One call made against a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Insert { type_tags: Vec<String>, rejected: bool },
    Update { id: RecordId, changes: BTreeMap<String, FieldValue>, rejected: bool },
    Query(Criteria),
}

/// Store decorator that logs every call and can be told to fail writes.
pub struct RecordingStore<S> {
    inner: S,
    // `query` takes `&self`.
    calls: RefCell<Vec<StoreCall>>,
    failing_updates: HashSet<RecordId>,
    failing_inserts: HashSet<String>,
}

impl<S: Store> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
            failing_updates: HashSet::new(),
            failing_inserts: HashSet::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Every call so far, in the order they were made.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    fn count(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| pred(call)).count()
    }

    /// Partial updates passed through to the inner store, in order.
    pub fn updates(&self) -> Vec<(RecordId, BTreeMap<String, FieldValue>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                StoreCall::Update { id, changes, rejected: false } => Some((*id, changes.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn update_attempts(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::Update { .. }))
    }

    pub fn insert_attempts(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::Insert { .. }))
    }

    pub fn query_count(&self) -> usize {
        self.count(|call| matches!(call, StoreCall::Query(_)))
    }

    pub fn clear_calls(&mut self) {
        self.calls.get_mut().clear();
    }

    pub fn fail_updates_of(&mut self, id: RecordId) {
        self.failing_updates.insert(id);
    }

    pub fn fail_inserts_of(&mut self, type_tag: &str) {
        self.failing_inserts.insert(type_tag.to_string());
    }

    /// Stop injecting failures.
    pub fn heal(&mut self) {
        self.failing_updates.clear();
        self.failing_inserts.clear();
    }
}

impl<S: Store> Store for RecordingStore<S> {
    fn insert(&mut self, records: &[Record]) -> Result<Vec<RecordId>, StorageError> {
        let type_tags: Vec<String> = records.iter().map(|r| r.type_tag().to_string()).collect();
        let rejected = type_tags.iter().any(|t| self.failing_inserts.contains(t));
        self.calls.get_mut().push(StoreCall::Insert { type_tags, rejected });
        if rejected {
            debug!(count = records.len(), "injected insert failure");
            return Err(StorageError::ConstraintViolation("injected insert failure".into()));
        }
        self.inner.insert(records)
    }

    fn update(
        &mut self,
        id: RecordId,
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        let rejected = self.failing_updates.contains(&id);
        self.calls.get_mut().push(StoreCall::Update {
            id,
            changes: changes.clone(),
            rejected,
        });
        if rejected {
            debug!(record_id = %id, "injected update failure");
            return Err(StorageError::ConstraintViolation(format!(
                "injected update failure for {id}"
            )));
        }
        self.inner.update(id, changes)
    }

    fn query(&self, criteria: &Criteria) -> Result<Vec<Record>, StorageError> {
        self.calls.borrow_mut().push(StoreCall::Query(criteria.clone()));
        self.inner.query(criteria)
    }
}
