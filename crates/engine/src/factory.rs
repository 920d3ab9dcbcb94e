use std::marker::PhantomData;
use std::sync::Arc;

use recordkit_core::{ConfigurationError, Record};

use crate::entity::{Entity, EntityCore};
use crate::unit_of_work::UnitOfWork;

/// Binds one record type to the constructor of one concrete entity type.
pub trait EntityFactory: Send + Sync {
    /// Type tag of the records this factory accepts.
    fn type_tag(&self) -> &str;

    fn entity_name(&self) -> &'static str;

    fn construct(&self, core: EntityCore) -> Box<dyn Entity>;

    fn wrap(&self, record: Record, uow: &UnitOfWork) -> Result<Box<dyn Entity>, ConfigurationError> {
        check_binding(self.entity_name(), self.type_tag(), &record)?;
        Ok(self.construct(EntityCore::bind(record, uow)))
    }
}

fn check_binding(entity: &'static str, expected: &str, record: &Record) -> Result<(), ConfigurationError> {
    if record.type_tag() != expected {
        return Err(ConfigurationError::TypeTagMismatch {
            entity,
            expected: expected.to_string(),
            actual: record.type_tag().to_string(),
        });
    }
    Ok(())
}

/// Contract for generated entity types: a fixed record binding and a
/// constructor from a bound core.
pub trait RecordEntity: Entity + Sized {
    const TYPE_TAG: &'static str;
    const ENTITY_NAME: &'static str;

    fn from_core(core: EntityCore) -> Self;

    fn factory() -> Arc<dyn EntityFactory> {
        Arc::new(TypedFactory::<Self>::new())
    }

    /// Wrap without going through resolution, keeping the concrete type.
    fn wrap(record: Record, uow: &UnitOfWork) -> Result<Self, ConfigurationError> {
        check_binding(Self::ENTITY_NAME, Self::TYPE_TAG, &record)?;
        Ok(Self::from_core(EntityCore::bind(record, uow)))
    }
}

pub struct TypedFactory<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: RecordEntity> TypedFactory<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E: RecordEntity> Default for TypedFactory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RecordEntity> EntityFactory for TypedFactory<E> {
    fn type_tag(&self) -> &str {
        E::TYPE_TAG
    }

    fn entity_name(&self) -> &'static str {
        E::ENTITY_NAME
    }

    fn construct(&self, core: EntityCore) -> Box<dyn Entity> {
        Box::new(E::from_core(core))
    }
}
