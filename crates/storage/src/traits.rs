use std::collections::BTreeMap;

use recordkit_core::{field_value::FieldValue, ids::RecordId, record::Record};

use crate::error::StorageError;

/// Filter for [`Store::query`]. Empty criteria match every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub type_tag: Option<String>,
    /// Restrict to these identities. Empty means no restriction.
    pub ids: Vec<RecordId>,
    /// Every `(field, value)` pair must match exactly.
    pub equals: Vec<(String, FieldValue)>,
}

impl Criteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: Some(type_tag.into()),
            ..Self::default()
        }
    }

    pub fn by_ids(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.equals.push((field.into(), value));
        self
    }
}

/// Backing-store gateway.
///
/// `update` must apply the whole partial map for one identity atomically.
/// Batching across identities is up to the implementation.
pub trait Store {
    /// Insert records and return their identities, in input order. A record
    /// that already carries an id is inserted under that id.
    fn insert(&mut self, records: &[Record]) -> Result<Vec<RecordId>, StorageError>;

    /// Apply a partial field map to one persisted record.
    fn update(
        &mut self,
        id: RecordId,
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError>;

    fn query(&self, criteria: &Criteria) -> Result<Vec<Record>, StorageError>;

    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        Ok(self.query(&Criteria::by_ids([id]))?.into_iter().next())
    }
}

impl<S: Store + ?Sized> Store for &mut S {
    fn insert(&mut self, records: &[Record]) -> Result<Vec<RecordId>, StorageError> {
        (**self).insert(records)
    }

    fn update(
        &mut self,
        id: RecordId,
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        (**self).update(id, changes)
    }

    fn query(&self, criteria: &Criteria) -> Result<Vec<Record>, StorageError> {
        (**self).query(criteria)
    }

    fn get(&self, id: RecordId) -> Result<Option<Record>, StorageError> {
        (**self).get(id)
    }
}
