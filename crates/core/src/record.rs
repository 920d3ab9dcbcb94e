use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ConfigurationError, CoreError};
use crate::field_value::FieldValue;
use crate::ids::RecordId;
use crate::schema::RecordSchema;

/// A schema-typed bag of field values as the store sees it.
///
/// Every schema field is present in `values`; an unset field holds
/// `FieldValue::Null`. Several in-memory copies of the same identity may
/// exist at once, each unaware of the others.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: Option<RecordId>,
    schema: Arc<RecordSchema>,
    values: BTreeMap<String, FieldValue>,
}

impl Record {
    /// A blank, not yet inserted record.
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), FieldValue::Null))
            .collect();
        Self {
            id: None,
            schema,
            values,
        }
    }

    /// Rebuild a record from stored values, checking each one against the
    /// schema (including declared fixed-point scales).
    pub fn from_stored(
        schema: Arc<RecordSchema>,
        id: Option<RecordId>,
        stored: impl IntoIterator<Item = (String, FieldValue)>,
    ) -> Result<Self, CoreError> {
        let mut record = Self::new(schema);
        record.id = id;
        for (field, value) in stored {
            record.put(&field, value)?;
        }
        Ok(record)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub fn type_tag(&self) -> &str {
        self.schema.type_tag()
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn put(&mut self, field: &str, value: FieldValue) -> Result<(), ConfigurationError> {
        self.schema.require_field(field)?.check(&value)?;
        self.values.insert(field.to_string(), value);
        Ok(())
    }
}
