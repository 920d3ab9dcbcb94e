use std::collections::HashMap;

use tracing::debug;

use recordkit_core::{Record, RecordId};
use recordkit_storage::{Criteria, Store};

use crate::entity::Entity;
use crate::error::EngineError;
use crate::registry::EntityRegistry;
use crate::unit_of_work::UnitOfWork;

/// Read-through cache of related records, keyed by identity.
///
/// Records are fetched from the store at most once until invalidated. Every
/// lookup wraps a fresh entity bound to the cache's unit of work, so edits
/// made through a returned entity are tracked like any other.
///
/// The cache borrows the store, so it must be dropped before the unit of work
/// can commit. Build a new cache afterwards to read committed values; a cache
/// never outlives the commit it would make stale.
pub struct RelationCache<'s, S: Store + ?Sized> {
    store: &'s S,
    registry: &'s EntityRegistry,
    uow: UnitOfWork,
    records: HashMap<RecordId, Record>,
}

impl<'s, S: Store + ?Sized> RelationCache<'s, S> {
    pub fn new(store: &'s S, registry: &'s EntityRegistry, uow: &UnitOfWork) -> Self {
        Self {
            store,
            registry,
            uow: uow.clone(),
            records: HashMap::new(),
        }
    }

    pub fn get_by_id(&mut self, id: RecordId) -> Result<Box<dyn Entity>, EngineError> {
        let record = match self.records.get(&id) {
            Some(record) => record.clone(),
            None => {
                let record = self.store.get(id)?.ok_or(EngineError::RecordNotFound(id))?;
                debug!(record_id = %id, "relation cache miss");
                self.records.insert(id, record.clone());
                record
            }
        };
        Ok(self.registry.wrap(record, &self.uow)?)
    }

    /// Fetch every uncached id in one query. Returns how many were loaded.
    pub fn warm(&mut self, ids: impl IntoIterator<Item = RecordId>) -> Result<usize, EngineError> {
        let mut missing: Vec<RecordId> = ids
            .into_iter()
            .filter(|id| !self.records.contains_key(id))
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return Ok(0);
        }

        let mut loaded = 0;
        for record in self.store.query(&Criteria::by_ids(missing))? {
            if let Some(id) = record.id() {
                self.records.insert(id, record);
                loaded += 1;
            }
        }
        debug!(loaded, "relation cache warmed");
        Ok(loaded)
    }

    /// Drop a cached record so the next lookup reads the store again.
    pub fn invalidate(&mut self, id: RecordId) -> bool {
        self.records.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
