//! Dirty-entity registry and the per-identity merge engine.
//!
//! Entities register here the first time they are mutated since their last
//! clear. Registration order is a total order and drives the merge: for
//! each identity, field by field, the entity registered later wins.
//!
//! A `UnitOfWork` is a handle onto shared, single-threaded state. Clones
//! refer to the same unit of work.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, info, info_span, warn};

use recordkit_core::{ConfigurationError, FieldValue, InstanceId, RecordId};
use recordkit_storage::{StorageError, Store};

use crate::error::{CommitTarget, PersistenceError, PersistenceFailure};
use crate::tracker::{Change, SharedState};

struct DirtyPair {
    instance: InstanceId,
    state: SharedState,
}

impl DirtyPair {
    fn identity(&self) -> Option<RecordId> {
        self.state.borrow().record.id()
    }
}

#[derive(Default)]
struct Inner {
    pairs: Vec<DirtyPair>,
    registered: HashSet<InstanceId>,
}

/// One identity's merged changes, as sent to `Store::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedChangeSet {
    pub id: RecordId,
    pub changes: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Default)]
pub struct CommitReport {
    pub inserted: Vec<RecordId>,
    pub updated: Vec<MergedChangeSet>,
    pub failures: Vec<PersistenceError>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct UnitOfWork {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Group persisted pairs by identity, in order of first registration.
fn group_by_identity(pairs: &[DirtyPair], skip: &HashSet<usize>) -> Vec<(RecordId, Vec<usize>)> {
    let mut groups: Vec<(RecordId, Vec<usize>)> = Vec::new();
    let mut slot: HashMap<RecordId, usize> = HashMap::new();
    for (index, pair) in pairs.iter().enumerate() {
        if skip.contains(&index) {
            continue;
        }
        let Some(id) = pair.identity() else { continue };
        match slot.get(&id) {
            Some(&g) => groups[g].1.push(index),
            None => {
                slot.insert(id, groups.len());
                groups.push((id, vec![index]));
            }
        }
    }
    groups
}

/// Merge the change sets of `members` in registration order. Returns the
/// first field whose deferred reference cannot be resolved yet.
fn merge_members(
    pairs: &[DirtyPair],
    members: &[usize],
) -> Result<BTreeMap<String, FieldValue>, String> {
    let mut merged = BTreeMap::new();
    for &index in members {
        let state = pairs[index].state.borrow();
        for (field, change) in state.changes.iter() {
            let value = match change {
                Change::Value(value) => value.clone(),
                Change::Deferred(pending) => match pending.resolve() {
                    Some(id) => FieldValue::Reference(id),
                    None => return Err(field.to_string()),
                },
            };
            merged.insert(field.to_string(), value);
        }
    }
    Ok(merged)
}

/// Turn every deferred reference whose target now has an identity into a
/// plain value, in both the record and the change log. A pinned entry no
/// longer depends on the target entity staying alive.
fn pin_resolved(state: &SharedState) -> Result<(), ConfigurationError> {
    let resolved: Vec<(String, RecordId)> = state
        .borrow()
        .changes
        .deferred()
        .filter_map(|(field, pending)| pending.resolve().map(|id| (field.to_string(), id)))
        .collect();
    let mut state = state.borrow_mut();
    for (field, id) in resolved {
        state.record.put(&field, FieldValue::Reference(id))?;
        state
            .changes
            .record(&field, Change::Value(FieldValue::Reference(id)));
    }
    Ok(())
}

/// First deferred field of a new record whose target has no identity yet.
fn unresolved_field(state: &SharedState) -> Option<String> {
    state
        .borrow()
        .changes
        .deferred()
        .find(|(_, pending)| pending.resolve().is_none())
        .map(|(field, _)| field.to_string())
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, state: &SharedState) {
        let instance = state.borrow().instance;
        let mut inner = self.inner.borrow_mut();
        if inner.registered.insert(instance) {
            let position = inner.pairs.len();
            inner.pairs.push(DirtyPair {
                instance,
                state: Rc::clone(state),
            });
            debug!(?instance, position, "entity registered as dirty");
        }
    }

    /// Number of registered dirty entities.
    pub fn pending(&self) -> usize {
        self.inner.borrow().pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Registered entities in registration order, with their identity
    /// (`None` for records not inserted yet).
    pub fn dirty(&self) -> Vec<(InstanceId, Option<RecordId>)> {
        self.inner
            .borrow()
            .pairs
            .iter()
            .map(|pair| (pair.instance, pair.identity()))
            .collect()
    }

    pub fn is_registered(&self, instance: InstanceId) -> bool {
        self.inner.borrow().registered.contains(&instance)
    }

    /// The partial updates a commit would issue for persisted identities
    /// right now. Fields whose deferred target is not inserted yet are left
    /// out.
    pub fn merge_preview(&self) -> Vec<MergedChangeSet> {
        let inner = self.inner.borrow();
        group_by_identity(&inner.pairs, &HashSet::new())
            .into_iter()
            .filter_map(|(id, members)| {
                let mut changes = BTreeMap::new();
                for &index in &members {
                    let state = inner.pairs[index].state.borrow();
                    for (field, change) in state.changes.iter() {
                        let value = match change {
                            Change::Value(value) => Some(value.clone()),
                            Change::Deferred(pending) => pending.resolve().map(FieldValue::Reference),
                        };
                        if let Some(value) = value {
                            changes.insert(field.to_string(), value);
                        }
                    }
                }
                (!changes.is_empty()).then_some(MergedChangeSet { id, changes })
            })
            .collect()
    }

    /// Drop every registration and clear every change log. Record values
    /// are left as they are.
    pub fn discard(&self) {
        let mut inner = self.inner.borrow_mut();
        for pair in inner.pairs.drain(..) {
            pair.state.borrow_mut().changes.clear();
        }
        inner.registered.clear();
    }

    /// Insert new records, then issue one merged partial update per dirty
    /// identity. Failures are per identity: the entities involved stay
    /// registered and the rest of the batch proceeds.
    pub fn commit<S: Store + ?Sized>(&self, store: &mut S) -> CommitReport {
        let pairs = {
            let mut inner = self.inner.borrow_mut();
            inner.registered.clear();
            std::mem::take(&mut inner.pairs)
        };
        let span = info_span!("commit", pending = pairs.len());
        let _enter = span.enter();

        let mut report = CommitReport::default();
        let mut done: HashSet<usize> = HashSet::new();
        let mut failed: HashSet<usize> = HashSet::new();

        self.insert_new(store, &pairs, &mut report, &mut done, &mut failed);

        let handled: HashSet<usize> = done.union(&failed).copied().collect();
        for (id, members) in group_by_identity(&pairs, &handled) {
            let pinned = members
                .iter()
                .try_for_each(|&index| pin_resolved(&pairs[index].state));
            if let Err(err) = pinned {
                report.failures.push(PersistenceError {
                    target: CommitTarget::Identity(id),
                    failure: err.into(),
                });
                failed.extend(members);
                continue;
            }

            let merged = match merge_members(&pairs, &members) {
                Ok(merged) => merged,
                Err(field) => {
                    warn!(record_id = %id, field = %field, "deferred reference unresolved");
                    report.failures.push(PersistenceError {
                        target: CommitTarget::Identity(id),
                        failure: PersistenceFailure::UnresolvedReference { field },
                    });
                    failed.extend(members);
                    continue;
                }
            };

            if merged.is_empty() {
                done.extend(members);
                continue;
            }

            match store.update(id, &merged) {
                Ok(()) => {
                    for &index in &members {
                        pairs[index].state.borrow_mut().changes.clear();
                    }
                    debug!(record_id = %id, fields = merged.len(), participants = members.len(), "identity committed");
                    done.extend(members);
                    report.updated.push(MergedChangeSet { id, changes: merged });
                }
                Err(err) => {
                    warn!(record_id = %id, error = %err, "partial update failed");
                    report.failures.push(PersistenceError {
                        target: CommitTarget::Identity(id),
                        failure: err.into(),
                    });
                    failed.extend(members);
                }
            }
        }

        // Failed pairs go back in their original order, ahead of anything
        // registered after this commit.
        {
            let mut inner = self.inner.borrow_mut();
            let later = std::mem::take(&mut inner.pairs);
            inner.registered.clear();
            for (index, pair) in pairs.into_iter().enumerate() {
                if !done.contains(&index) {
                    inner.registered.insert(pair.instance);
                    inner.pairs.push(pair);
                }
            }
            for pair in later {
                if inner.registered.insert(pair.instance) {
                    inner.pairs.push(pair);
                }
            }
        }

        info!(
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            failed = report.failures.len(),
            "commit finished"
        );
        report
    }

    /// Insert new records in waves. A record is ready once every deferred
    /// reference it holds points at a record that has an identity.
    fn insert_new<S: Store + ?Sized>(
        &self,
        store: &mut S,
        pairs: &[DirtyPair],
        report: &mut CommitReport,
        done: &mut HashSet<usize>,
        failed: &mut HashSet<usize>,
    ) {
        let mut waiting: Vec<usize> = pairs
            .iter()
            .enumerate()
            .filter(|(_, pair)| pair.identity().is_none())
            .map(|(index, _)| index)
            .collect();

        loop {
            let mut progressed = false;
            let mut still_waiting = Vec::new();
            for index in waiting {
                let pair = &pairs[index];
                if unresolved_field(&pair.state).is_some() {
                    still_waiting.push(index);
                    continue;
                }
                progressed = true;

                if let Err(err) = pin_resolved(&pair.state) {
                    report.failures.push(PersistenceError {
                        target: CommitTarget::NewRecord(pair.instance),
                        failure: err.into(),
                    });
                    failed.insert(index);
                    continue;
                }

                let record = pair.state.borrow().record.clone();
                let inserted = store.insert(std::slice::from_ref(&record)).and_then(|ids| {
                    ids.first().copied().ok_or_else(|| {
                        StorageError::NotFound("store returned no identity".to_string())
                    })
                });
                match inserted {
                    Ok(id) => {
                        let mut state = pair.state.borrow_mut();
                        state.record.assign_id(id);
                        state.changes.clear();
                        debug!(instance = ?pair.instance, record_id = %id, "record inserted");
                        report.inserted.push(id);
                        done.insert(index);
                    }
                    Err(err) => {
                        warn!(instance = ?pair.instance, error = %err, "insert failed");
                        report.failures.push(PersistenceError {
                            target: CommitTarget::NewRecord(pair.instance),
                            failure: err.into(),
                        });
                        failed.insert(index);
                    }
                }
            }
            waiting = still_waiting;
            if !progressed || waiting.is_empty() {
                break;
            }
        }

        for index in waiting {
            let pair = &pairs[index];
            let field = unresolved_field(&pair.state).unwrap_or_default();
            warn!(instance = ?pair.instance, field = %field, "new record depends on a record that was not inserted");
            report.failures.push(PersistenceError {
                target: CommitTarget::NewRecord(pair.instance),
                failure: PersistenceFailure::UnresolvedReference { field },
            });
            failed.insert(index);
        }
    }
}
