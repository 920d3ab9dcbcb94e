pub mod cache;
pub mod entity;
pub mod error;
pub mod factory;
pub mod registry;
pub mod resolution;
pub mod tracker;
pub mod unit_of_work;
pub mod validation;

#[cfg(test)]
mod testing;

pub use cache::RelationCache;
pub use entity::{AsAny, Entity, EntityCore};
pub use error::{CommitTarget, EngineError, PersistenceError, PersistenceFailure};
pub use factory::{EntityFactory, RecordEntity, TypedFactory};
pub use registry::EntityRegistry;
pub use resolution::{
    ChainStrategy, Discriminant, DiscriminantStrategy, FixedStrategy, ResolutionStrategy,
    UnmappedPolicy, fixed,
};
pub use tracker::{Change, FieldChangeSet, PendingReference};
pub use unit_of_work::{CommitReport, MergedChangeSet, UnitOfWork};
pub use validation::{Rule, Severity, ValidationError};
