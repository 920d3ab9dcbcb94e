use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use recordkit_core::{FieldValue, InstanceId, Record, RecordId};

/// State behind one entity instance: the wrapped record and its diff log.
/// Shared between the entity and the unit of work it is registered with.
pub(crate) struct EntityState {
    pub(crate) instance: InstanceId,
    pub(crate) record: Record,
    pub(crate) changes: FieldChangeSet,
}

pub(crate) type SharedState = Rc<RefCell<EntityState>>;

/// A reference to an entity whose record has not been inserted yet.
#[derive(Clone)]
pub struct PendingReference {
    target: Weak<RefCell<EntityState>>,
    target_instance: InstanceId,
}

impl PendingReference {
    pub(crate) fn to(state: &SharedState) -> Self {
        Self {
            target: Rc::downgrade(state),
            target_instance: state.borrow().instance,
        }
    }

    pub fn target_instance(&self) -> InstanceId {
        self.target_instance
    }

    /// The target's identity, once it has been inserted.
    pub fn resolve(&self) -> Option<RecordId> {
        self.target.upgrade().and_then(|state| state.borrow().record.id())
    }
}

impl fmt::Debug for PendingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingReference({:?})", self.target_instance)
    }
}

#[derive(Debug, Clone)]
pub enum Change {
    Value(FieldValue),
    /// Resolved to `FieldValue::Reference` right before the owning record
    /// is written.
    Deferred(PendingReference),
}

/// Fields mutated on one entity since its last clear. Last value wins.
#[derive(Debug, Clone, Default)]
pub struct FieldChangeSet {
    entries: BTreeMap<String, Change>,
}

impl FieldChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: &str, change: Change) {
        self.entries.insert(field.to_string(), change);
    }

    pub fn get(&self, field: &str) -> Option<&Change> {
        self.entries.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn deferred(&self) -> impl Iterator<Item = (&str, &PendingReference)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            Change::Deferred(pending) => Some((k.as_str(), pending)),
            Change::Value(_) => None,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_wins() {
        let mut changes = FieldChangeSet::new();
        changes.record("status", Change::Value(FieldValue::Text("Draft".into())));
        changes.record("status", Change::Value(FieldValue::Text("Approved".into())));
        assert_eq!(changes.len(), 1);
        match changes.get("status") {
            Some(Change::Value(v)) => assert_eq!(v, &FieldValue::Text("Approved".into())),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn clear_empties_the_log() {
        let mut changes = FieldChangeSet::new();
        changes.record("a", Change::Value(FieldValue::Integer(1)));
        changes.record("b", Change::Value(FieldValue::Integer(2)));
        assert_eq!(changes.fields().collect::<Vec<_>>(), vec!["a", "b"]);
        changes.clear();
        assert!(changes.is_empty());
        assert!(!changes.contains("a"));
    }
}
