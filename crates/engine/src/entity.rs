//! Entity base abstraction.
//!
//! Every concrete entity owns an [`EntityCore`], which binds it to exactly
//! one record for its whole lifetime. Generated typed setters call
//! [`EntityCore::set`], the single tracked mutation primitive: it writes the
//! record, logs the change and registers the entity with its unit of work.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use recordkit_core::{
    ConfigurationError, FieldKind, FieldValue, InstanceId, Record, RecordId, RecordSchema,
};

use crate::tracker::{Change, EntityState, FieldChangeSet, PendingReference, SharedState};
use crate::unit_of_work::UnitOfWork;
use crate::validation::{self, Rule, ValidationError};

pub struct EntityCore {
    schema: Arc<RecordSchema>,
    state: SharedState,
    uow: UnitOfWork,
}

impl EntityCore {
    /// Bind a record. New records register with the unit of work right away
    /// because they need an insert even if no field is ever set.
    pub(crate) fn bind(record: Record, uow: &UnitOfWork) -> Self {
        let schema = record.schema().clone();
        let is_new = record.is_new();
        let state = Rc::new(RefCell::new(EntityState {
            instance: InstanceId::new(),
            record,
            changes: FieldChangeSet::new(),
        }));
        let core = Self {
            schema,
            state,
            uow: uow.clone(),
        };
        if is_new {
            core.uow.register(&core.state);
        }
        core
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn instance_id(&self) -> InstanceId {
        self.state.borrow().instance
    }

    pub fn id(&self) -> Option<RecordId> {
        self.state.borrow().record.id()
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn type_tag(&self) -> &str {
        self.schema.type_tag()
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// Current value of `field` in the wrapped record.
    pub fn get(&self, field: &str) -> Result<FieldValue, ConfigurationError> {
        self.schema.require_field(field)?;
        Ok(self
            .state
            .borrow()
            .record
            .get(field)
            .cloned()
            .unwrap_or(FieldValue::Null))
    }

    pub fn set(&mut self, field: &str, value: FieldValue) -> Result<(), ConfigurationError> {
        {
            let mut state = self.state.borrow_mut();
            state.record.put(field, value.clone())?;
            state.changes.record(field, Change::Value(value));
        }
        trace!(instance = ?self.instance_id(), field, "field set");
        self.uow.register(&self.state);
        Ok(())
    }

    /// Point a reference field at another entity. If the target has not been
    /// inserted yet the field reads as `Null` until commit resolves it.
    pub fn set_reference(
        &mut self,
        field: &str,
        target: &EntityCore,
    ) -> Result<(), ConfigurationError> {
        let def = self.schema.require_field(field)?;
        let FieldKind::Reference { target: expected } = &def.kind else {
            return Err(ConfigurationError::TypeMismatch {
                field: field.to_string(),
                expected: def.kind.to_string(),
                actual: "Reference",
            });
        };
        if expected != target.type_tag() {
            return Err(ConfigurationError::ReferenceTargetMismatch {
                field: field.to_string(),
                expected: expected.clone(),
                actual: target.type_tag().to_string(),
            });
        }

        match target.id() {
            Some(id) => self.set(field, FieldValue::Reference(id)),
            None => {
                {
                    let mut state = self.state.borrow_mut();
                    state.record.put(field, FieldValue::Null)?;
                    state
                        .changes
                        .record(field, Change::Deferred(PendingReference::to(&target.state)));
                }
                trace!(instance = ?self.instance_id(), field, "deferred reference set");
                self.uow.register(&self.state);
                Ok(())
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        let state = self.state.borrow();
        state.record.is_new() || !state.changes.is_empty()
    }

    pub fn changes(&self) -> FieldChangeSet {
        self.state.borrow().changes.clone()
    }

    pub fn changed_fields(&self) -> Vec<String> {
        self.state
            .borrow()
            .changes
            .fields()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        f(&self.state.borrow().record)
    }
}

impl std::fmt::Debug for EntityCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCore")
            .field("type_tag", &self.type_tag())
            .field("instance", &self.instance_id())
            .field("id", &self.id())
            .finish()
    }
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A typed domain wrapper around exactly one record.
pub trait Entity: AsAny {
    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    fn entity_name(&self) -> &'static str;

    /// Declarative field rules checked by [`Entity::validate`].
    fn rules(&self) -> Vec<Rule> {
        Vec::new()
    }

    /// Subtype-specific checks, run after the structural ones.
    fn validate_domain(&self, _errors: &mut Vec<ValidationError>) {}

    fn id(&self) -> Option<RecordId> {
        self.core().id()
    }

    fn type_tag(&self) -> &str {
        self.core().type_tag()
    }

    fn instance_id(&self) -> InstanceId {
        self.core().instance_id()
    }

    fn get(&self, field: &str) -> Result<FieldValue, ConfigurationError> {
        self.core().get(field)
    }

    fn set(&mut self, field: &str, value: FieldValue) -> Result<(), ConfigurationError> {
        self.core_mut().set(field, value)
    }

    /// Point a reference field at another entity, deferring until commit when
    /// the target has no identity yet.
    fn set_reference(&mut self, field: &str, target: &dyn Entity) -> Result<(), ConfigurationError> {
        self.core_mut().set_reference(field, target.core())
    }

    fn is_dirty(&self) -> bool {
        self.core().is_dirty()
    }

    fn changed_fields(&self) -> Vec<String> {
        self.core().changed_fields()
    }

    fn validate(&self) -> Result<Vec<ValidationError>, ConfigurationError> {
        let mut errors = self
            .core()
            .with_record(|record| validation::check_record(record, &self.rules()))?;
        self.validate_domain(&mut errors);
        Ok(errors)
    }
}

impl dyn Entity {
    pub fn is<T: Entity>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::RecordEntity;
    use crate::testing::{Chore, task_record};
    use recordkit_core::RecordSchema;

    #[test]
    fn set_writes_record_and_logs_change() {
        let uow = UnitOfWork::new();
        let mut chore = Chore::wrap(task_record("chore", "a"), &uow).unwrap();
        chore.set("title", "b".into()).unwrap();
        assert_eq!(chore.get("title").unwrap(), FieldValue::from("b"));
        assert_eq!(chore.changed_fields(), vec!["title".to_string()]);
    }

    #[test]
    fn set_rejects_unknown_field_and_wrong_kind() {
        let uow = UnitOfWork::new();
        let mut chore = Chore::wrap(task_record("chore", "a"), &uow).unwrap();
        assert!(matches!(
            chore.set("colour", "red".into()),
            Err(ConfigurationError::UnknownField { .. })
        ));
        assert!(matches!(
            chore.set("title", FieldValue::Integer(3)),
            Err(ConfigurationError::TypeMismatch { .. })
        ));
        assert!(chore.changed_fields().is_empty());
    }

    #[test]
    fn reference_target_type_is_checked() {
        let other = RecordSchema::builder("label").field("name", FieldKind::Text).build().unwrap();
        let uow = UnitOfWork::new();
        let label = EntityCore::bind(Record::new(other), &uow);
        let mut chore = Chore::wrap(task_record("chore", "a"), &uow).unwrap();

        let err = chore.core_mut().set_reference("parent", &label).unwrap_err();
        assert!(matches!(err, ConfigurationError::ReferenceTargetMismatch { .. }));
        let err = chore.core_mut().set_reference("title", &label).unwrap_err();
        assert!(matches!(err, ConfigurationError::TypeMismatch { .. }));
    }

    #[test]
    fn reference_to_persisted_target_is_immediate() {
        let uow = UnitOfWork::new();
        let mut parent_record = task_record("chore", "parent");
        parent_record.assign_id(RecordId::new(5));
        let parent = Chore::wrap(parent_record, &uow).unwrap();
        let mut child = Chore::wrap(task_record("chore", "child"), &uow).unwrap();

        child.core_mut().set_reference("parent", parent.core()).unwrap();
        assert_eq!(child.get("parent").unwrap(), FieldValue::Reference(RecordId::new(5)));
        assert!(matches!(child.core().changes().get("parent"), Some(Change::Value(_))));
    }

    #[test]
    fn entity_set_reference_defers_to_an_unsaved_target() {
        let uow = UnitOfWork::new();
        let parent = Chore::wrap(task_record("chore", "parent"), &uow).unwrap();
        let mut child = Chore::wrap(task_record("chore", "child"), &uow).unwrap();

        Entity::set_reference(&mut child, "parent", &parent).unwrap();
        assert!(child.get("parent").unwrap().is_null());
        assert!(matches!(child.core().changes().get("parent"), Some(Change::Deferred(_))));
        assert_eq!(child.changed_fields(), vec!["parent".to_string()]);
    }

    #[test]
    fn wrapping_the_wrong_type_tag_fails() {
        let other = RecordSchema::builder("label").build().unwrap();
        let uow = UnitOfWork::new();
        let err = Chore::wrap(Record::new(other), &uow).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::TypeTagMismatch {
                entity: "Chore",
                expected: "task".into(),
                actual: "label".into(),
            }
        );
        assert!(uow.is_empty());
    }
}
