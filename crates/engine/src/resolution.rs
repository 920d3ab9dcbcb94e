//! Choosing the factory that wraps a record.
//!
//! Strategies are assembled once at start-up and are immutable afterwards,
//! so a given record always resolves to the same factory instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use recordkit_core::{ConfigurationError, FieldValue, Record};

use crate::factory::EntityFactory;

pub trait ResolutionStrategy: Send + Sync {
    fn resolve(&self, record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError>;

    fn describe(&self) -> String;
}

/// A factory is the trivial strategy: it resolves to itself.
impl ResolutionStrategy for Arc<dyn EntityFactory> {
    fn resolve(&self, _record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError> {
        Ok(Arc::clone(self))
    }

    fn describe(&self) -> String {
        format!("factory {}", self.entity_name())
    }
}

/// Always resolves to one factory. The default for single-type tables.
pub struct FixedStrategy {
    factory: Arc<dyn EntityFactory>,
}

impl FixedStrategy {
    pub fn new(factory: Arc<dyn EntityFactory>) -> Self {
        Self { factory }
    }
}

impl ResolutionStrategy for FixedStrategy {
    fn resolve(&self, record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError> {
        self.factory.resolve(record)
    }

    fn describe(&self) -> String {
        self.factory.describe()
    }
}

pub fn fixed(factory: Arc<dyn EntityFactory>) -> Arc<dyn ResolutionStrategy> {
    Arc::new(FixedStrategy::new(factory))
}

/// Hashable projection of the field values that may act as discriminants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminant {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Discriminant {
    pub fn from_value(field: &str, value: &FieldValue) -> Result<Self, ConfigurationError> {
        match value {
            FieldValue::Null => Ok(Self::Null),
            FieldValue::Text(s) => Ok(Self::Text(s.clone())),
            FieldValue::Integer(n) => Ok(Self::Integer(*n)),
            FieldValue::Boolean(b) => Ok(Self::Boolean(*b)),
            other => Err(ConfigurationError::InvalidDiscriminant {
                field: field.to_string(),
                actual: other.kind_name(),
            }),
        }
    }
}

impl fmt::Display for Discriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Discriminant {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Discriminant {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Discriminant {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// What happens when a discriminant value has no mapping.
#[derive(Clone)]
pub enum UnmappedPolicy {
    /// Fail with `UnmappedDiscriminant`.
    Strict,
    Fallback(Arc<dyn ResolutionStrategy>),
}

/// Resolves by the value of one field of the record.
pub struct DiscriminantStrategy {
    field: String,
    mapping: HashMap<Discriminant, Arc<dyn ResolutionStrategy>>,
    policy: UnmappedPolicy,
}

impl DiscriminantStrategy {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            mapping: HashMap::new(),
            policy: UnmappedPolicy::Strict,
        }
    }

    pub fn map(
        mut self,
        value: impl Into<Discriminant>,
        strategy: Arc<dyn ResolutionStrategy>,
    ) -> Result<Self, ConfigurationError> {
        let value = value.into();
        if self.mapping.contains_key(&value) {
            return Err(ConfigurationError::DuplicateRegistration(format!(
                "discriminant `{}` = {value}",
                self.field
            )));
        }
        self.mapping.insert(value, strategy);
        Ok(self)
    }

    pub fn map_factory(
        self,
        value: impl Into<Discriminant>,
        factory: Arc<dyn EntityFactory>,
    ) -> Result<Self, ConfigurationError> {
        self.map(value, fixed(factory))
    }

    pub fn fallback(mut self, strategy: Arc<dyn ResolutionStrategy>) -> Self {
        self.policy = UnmappedPolicy::Fallback(strategy);
        self
    }

    pub fn strict(mut self) -> Self {
        self.policy = UnmappedPolicy::Strict;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn policy(&self) -> &UnmappedPolicy {
        &self.policy
    }
}

impl ResolutionStrategy for DiscriminantStrategy {
    fn resolve(&self, record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError> {
        let value = record
            .get(&self.field)
            .ok_or_else(|| ConfigurationError::UnknownField {
                type_tag: record.type_tag().to_string(),
                field: self.field.clone(),
            })?;
        let key = Discriminant::from_value(&self.field, value)?;

        if let Some(strategy) = self.mapping.get(&key) {
            debug!(field = %self.field, value = %key, strategy = %strategy.describe(), "discriminant mapped");
            return strategy.resolve(record);
        }
        match &self.policy {
            UnmappedPolicy::Fallback(strategy) => {
                debug!(field = %self.field, value = %key, "discriminant unmapped, using fallback");
                strategy.resolve(record)
            }
            UnmappedPolicy::Strict => Err(ConfigurationError::UnmappedDiscriminant {
                field: self.field.clone(),
                value: key.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("discriminant on `{}` ({} mapped)", self.field, self.mapping.len())
    }
}

/// Tries each child in order; the first success wins.
#[derive(Default)]
pub struct ChainStrategy {
    children: Vec<Arc<dyn ResolutionStrategy>>,
}

impl ChainStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, strategy: Arc<dyn ResolutionStrategy>) -> Self {
        self.children.push(strategy);
        self
    }
}

impl ResolutionStrategy for ChainStrategy {
    fn resolve(&self, record: &Record) -> Result<Arc<dyn EntityFactory>, ConfigurationError> {
        let mut reasons = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match child.resolve(record) {
                Ok(factory) => return Ok(factory),
                Err(err) => reasons.push(format!("{}: {err}", child.describe())),
            }
        }
        Err(ConfigurationError::NoMatchingStrategy {
            type_tag: record.type_tag().to_string(),
            reasons,
        })
    }

    fn describe(&self) -> String {
        format!("chain of {}", self.children.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::RecordEntity;
    use crate::testing::{Chore, Milestone, task_record};

    fn strategy() -> DiscriminantStrategy {
        DiscriminantStrategy::new("kind")
            .map_factory("chore", Chore::factory())
            .unwrap()
            .map_factory("milestone", Milestone::factory())
            .unwrap()
    }

    #[test]
    fn same_discriminant_resolves_to_same_factory() {
        let strategy = strategy();
        let a = strategy.resolve(&task_record("chore", "a")).unwrap();
        let b = strategy.resolve(&task_record("chore", "b")).unwrap();
        let c = strategy.resolve(&task_record("milestone", "c")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.entity_name(), "Milestone");
    }

    #[test]
    fn unmapped_value_is_rejected_when_strict() {
        let err = strategy().resolve(&task_record("epic", "a")).err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::UnmappedDiscriminant {
                field: "kind".into(),
                value: "\"epic\"".into(),
            }
        );
    }

    #[test]
    fn unmapped_value_uses_fallback() {
        let strategy = strategy().fallback(fixed(Chore::factory()));
        let factory = strategy.resolve(&task_record("epic", "a")).unwrap();
        assert_eq!(factory.entity_name(), "Chore");
    }

    #[test]
    fn duplicate_mapping_is_rejected() {
        let result = strategy().map_factory("chore", Milestone::factory());
        assert!(matches!(result, Err(ConfigurationError::DuplicateRegistration(_))));
    }

    #[test]
    fn missing_discriminant_field_is_a_configuration_error() {
        let strategy = DiscriminantStrategy::new("flavour");
        let err = strategy.resolve(&task_record("chore", "a")).err().unwrap();
        assert!(matches!(err, ConfigurationError::UnknownField { .. }));
    }

    #[test]
    fn fixed_point_discriminant_is_invalid() {
        let strategy = DiscriminantStrategy::new("estimate");
        let mut record = task_record("chore", "a");
        record
            .put("estimate", recordkit_core::FixedPoint::new(1, 2).unwrap().into())
            .unwrap();
        let err = strategy.resolve(&record).err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::InvalidDiscriminant { field: "estimate".into(), actual: "Fixed" }
        );
    }

    #[test]
    fn null_discriminant_can_be_mapped() {
        let strategy = DiscriminantStrategy::new("estimate")
            .map_factory(Discriminant::Null, Milestone::factory())
            .unwrap();
        let factory = strategy.resolve(&task_record("chore", "a")).unwrap();
        assert_eq!(factory.entity_name(), "Milestone");
    }

    #[test]
    fn chain_collects_reasons() {
        let chain = ChainStrategy::new()
            .then(Arc::new(DiscriminantStrategy::new("kind")))
            .then(Arc::new(strategy()));
        assert_eq!(chain.resolve(&task_record("chore", "a")).unwrap().entity_name(), "Chore");

        match chain.resolve(&task_record("epic", "a")) {
            Err(ConfigurationError::NoMatchingStrategy { type_tag, reasons }) => {
                assert_eq!(type_tag, "task");
                assert_eq!(reasons.len(), 2);
            }
            other => panic!("unexpected resolution {:?}", other.map(|f| f.entity_name())),
        }
    }
}
