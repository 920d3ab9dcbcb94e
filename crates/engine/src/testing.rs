//! In-memory store and a small task domain for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use recordkit_core::{FieldKind, FieldValue, Record, RecordId, RecordSchema};
use recordkit_storage::{Criteria, StorageError, Store};

use crate::entity::{Entity, EntityCore};
use crate::factory::RecordEntity;
use crate::resolution::DiscriminantStrategy;
use crate::registry::EntityRegistry;
use crate::validation::{Rule, ValidationError};

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub records: BTreeMap<RecordId, Record>,
    pub next_id: i64,
    pub inserts: Vec<RecordId>,
    pub updates: Vec<(RecordId, BTreeMap<String, FieldValue>)>,
    pub failing: HashSet<RecordId>,
    pub queries: usize,
}

impl MemoryStore {
    pub fn seed(&mut self, mut record: Record, id: i64) -> RecordId {
        let id = RecordId::new(id);
        record.assign_id(id);
        self.records.insert(id, record);
        self.next_id = self.next_id.max(id.get());
        id
    }
}

impl Store for MemoryStore {
    fn insert(&mut self, records: &[Record]) -> Result<Vec<RecordId>, StorageError> {
        let mut ids = Vec::new();
        for record in records {
            self.next_id += 1;
            let id = RecordId::new(self.next_id);
            let mut stored = record.clone();
            stored.assign_id(id);
            self.records.insert(id, stored);
            self.inserts.push(id);
            ids.push(id);
        }
        Ok(ids)
    }

    fn update(
        &mut self,
        id: RecordId,
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        if self.failing.contains(&id) {
            return Err(StorageError::ConstraintViolation(format!("record {id} is locked")));
        }
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        for (field, value) in changes {
            record.put(field, value.clone())?;
        }
        self.updates.push((id, changes.clone()));
        Ok(())
    }

    fn query(&self, criteria: &Criteria) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .records
            .values()
            .filter(|r| criteria.type_tag.as_deref().is_none_or(|t| r.type_tag() == t))
            .filter(|r| criteria.ids.is_empty() || r.id().is_some_and(|id| criteria.ids.contains(&id)))
            .filter(|r| criteria.equals.iter().all(|(f, v)| r.get(f) == Some(v)))
            .cloned()
            .collect())
    }
}

pub(crate) fn task_schema() -> Arc<RecordSchema> {
    RecordSchema::builder("task")
        .required("kind", FieldKind::Text)
        .required("title", FieldKind::Text)
        .field("estimate", FieldKind::Fixed { scale: 2 })
        .field("parent", FieldKind::Reference { target: "task".into() })
        .build()
        .unwrap()
}

pub(crate) fn task_record(kind: &str, title: &str) -> Record {
    let mut record = Record::new(task_schema());
    record.put("kind", FieldValue::from(kind)).unwrap();
    record.put("title", FieldValue::from(title)).unwrap();
    record
}

#[derive(Debug)]
pub(crate) struct Chore {
    core: EntityCore,
}

impl Entity for Chore {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn entity_name(&self) -> &'static str {
        Self::ENTITY_NAME
    }

    fn rules(&self) -> Vec<Rule> {
        vec![
            Rule::MaxLength { field: "title".into(), max: 16 },
            Rule::NonNegative("estimate".into()),
        ]
    }
}

impl RecordEntity for Chore {
    const TYPE_TAG: &'static str = "task";
    const ENTITY_NAME: &'static str = "Chore";

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }
}

#[derive(Debug)]
pub(crate) struct Milestone {
    core: EntityCore,
}

impl Entity for Milestone {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn entity_name(&self) -> &'static str {
        Self::ENTITY_NAME
    }

    fn validate_domain(&self, errors: &mut Vec<ValidationError>) {
        if self.get("estimate").is_ok_and(|v| !v.is_null()) {
            errors.push(ValidationError::error("estimate", "milestones are not estimated"));
        }
    }
}

impl RecordEntity for Milestone {
    const TYPE_TAG: &'static str = "task";
    const ENTITY_NAME: &'static str = "Milestone";

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }
}

pub(crate) fn task_registry() -> EntityRegistry {
    let strategy = DiscriminantStrategy::new("kind")
        .map_factory("chore", Chore::factory())
        .unwrap()
        .map_factory("milestone", Milestone::factory())
        .unwrap();
    let mut registry = EntityRegistry::new();
    registry.register("task", Arc::new(strategy)).unwrap();
    registry
}
