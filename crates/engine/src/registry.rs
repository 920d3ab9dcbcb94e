use std::collections::BTreeMap;
use std::sync::Arc;

use recordkit_core::{ConfigurationError, Record, RecordId};
use recordkit_storage::{Criteria, Store};

use crate::entity::Entity;
use crate::error::EngineError;
use crate::factory::EntityFactory;
use crate::resolution::{ResolutionStrategy, fixed};
use crate::unit_of_work::UnitOfWork;

/// Record type → resolution strategy, assembled explicitly at start-up.
#[derive(Default)]
pub struct EntityRegistry {
    strategies: BTreeMap<String, Arc<dyn ResolutionStrategy>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        strategy: Arc<dyn ResolutionStrategy>,
    ) -> Result<(), ConfigurationError> {
        let type_tag = type_tag.into();
        if self.strategies.contains_key(&type_tag) {
            return Err(ConfigurationError::DuplicateRegistration(format!(
                "strategy for `{type_tag}`"
            )));
        }
        self.strategies.insert(type_tag, strategy);
        Ok(())
    }

    /// Register a table with exactly one entity type.
    pub fn register_factory(&mut self, factory: Arc<dyn EntityFactory>) -> Result<(), ConfigurationError> {
        let type_tag = factory.type_tag().to_string();
        self.register(type_tag, fixed(factory))
    }

    pub fn strategy_for(&self, type_tag: &str) -> Result<&Arc<dyn ResolutionStrategy>, ConfigurationError> {
        self.strategies
            .get(type_tag)
            .ok_or_else(|| ConfigurationError::UnknownRecordType(type_tag.to_string()))
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn resolve(&self, record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError> {
        self.strategy_for(record.type_tag())?.resolve(record)
    }

    pub fn wrap(&self, record: Record, uow: &UnitOfWork) -> Result<Box<dyn Entity>, ConfigurationError> {
        self.resolve(&record)?.wrap(record, uow)
    }

    pub fn load<S: Store + ?Sized>(
        &self,
        store: &S,
        id: RecordId,
        uow: &UnitOfWork,
    ) -> Result<Box<dyn Entity>, EngineError> {
        let record = store.get(id)?.ok_or(EngineError::RecordNotFound(id))?;
        Ok(self.wrap(record, uow)?)
    }

    pub fn load_all<S: Store + ?Sized>(
        &self,
        store: &S,
        criteria: &Criteria,
        uow: &UnitOfWork,
    ) -> Result<Vec<Box<dyn Entity>>, EngineError> {
        store
            .query(criteria)?
            .into_iter()
            .map(|record| Ok(self.wrap(record, uow)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::RecordEntity;
    use crate::testing::{Chore, MemoryStore, Milestone, task_record, task_registry};

    #[test]
    fn wrap_picks_the_mapped_subtype() {
        let registry = task_registry();
        let uow = UnitOfWork::new();
        let entity = registry.wrap(task_record("milestone", "ship"), &uow).unwrap();
        assert!(entity.is::<Milestone>());
        assert!(entity.downcast_ref::<Chore>().is_none());
        assert_eq!(entity.entity_name(), "Milestone");
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let registry = EntityRegistry::new();
        let err = registry.resolve(&task_record("chore", "a")).err().unwrap();
        assert_eq!(err, ConfigurationError::UnknownRecordType("task".into()));
    }

    #[test]
    fn duplicate_strategy_is_rejected() {
        let mut registry = task_registry();
        let err = registry.register_factory(Chore::factory()).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateRegistration(_)));
        assert_eq!(registry.type_tags().collect::<Vec<_>>(), vec!["task"]);
    }

    #[test]
    fn load_reads_from_store() {
        let mut store = MemoryStore::default();
        let id = store.seed(task_record("chore", "dust"), 3);
        let registry = task_registry();
        let uow = UnitOfWork::new();

        let entity = registry.load(&store, id, &uow).unwrap();
        assert_eq!(entity.id(), Some(id));
        assert!(entity.is::<Chore>());
        assert!(uow.is_empty());

        let missing = registry.load(&store, RecordId::new(99), &uow);
        assert!(matches!(missing, Err(EngineError::RecordNotFound(_))));
    }

    #[test]
    fn load_all_wraps_each_match() {
        let mut store = MemoryStore::default();
        store.seed(task_record("chore", "a"), 1);
        store.seed(task_record("milestone", "b"), 2);
        store.seed(task_record("chore", "c"), 3);
        let registry = task_registry();
        let uow = UnitOfWork::new();

        let criteria = Criteria::of_type("task").with_field("kind", "chore".into());
        let chores = registry.load_all(&store, &criteria, &uow).unwrap();
        assert_eq!(chores.len(), 2);
        assert!(chores.iter().all(|e| e.is::<Chore>()));
    }
}
