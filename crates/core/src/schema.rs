use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::field_value::FieldValue;
use crate::fixed::MAX_SCALE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Fixed { scale: u32 },
    /// Identity of a record of type `target`.
    Reference { target: String },
    Bytes,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::Integer => write!(f, "Integer"),
            Self::Float => write!(f, "Float"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Timestamp => write!(f, "Timestamp"),
            Self::Fixed { scale } => write!(f, "Fixed(scale {scale})"),
            Self::Reference { target } => write!(f, "Reference({target})"),
            Self::Bytes => write!(f, "Bytes"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDef {
    /// Check that `value` may be stored in this field. `Null` always fits;
    /// required-ness is a validation concern.
    pub fn check(&self, value: &FieldValue) -> Result<(), ConfigurationError> {
        let fits = match (&self.kind, value) {
            (_, FieldValue::Null) => true,
            (FieldKind::Text, FieldValue::Text(_))
            | (FieldKind::Integer, FieldValue::Integer(_))
            | (FieldKind::Float, FieldValue::Float(_))
            | (FieldKind::Boolean, FieldValue::Boolean(_))
            | (FieldKind::Timestamp, FieldValue::Timestamp(_))
            | (FieldKind::Reference { .. }, FieldValue::Reference(_))
            | (FieldKind::Bytes, FieldValue::Bytes(_)) => true,
            (FieldKind::Fixed { scale }, FieldValue::Fixed(v)) => {
                v.check_declared(&self.name, *scale)?;
                true
            }
            _ => false,
        };
        if !fits {
            return Err(ConfigurationError::TypeMismatch {
                field: self.name.clone(),
                expected: self.kind.to_string(),
                actual: value.kind_name(),
            });
        }
        Ok(())
    }
}

/// Field layout of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    type_tag: String,
    fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn builder(type_tag: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            type_tag: type_tag.into(),
            fields: Vec::new(),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldDef, ConfigurationError> {
        self.field(name).ok_or_else(|| ConfigurationError::UnknownField {
            type_tag: self.type_tag.clone(),
            field: name.to_string(),
        })
    }
}

pub struct SchemaBuilder {
    type_tag: String,
    fields: Vec<FieldDef>,
}

impl SchemaBuilder {
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn build(self) -> Result<Arc<RecordSchema>, ConfigurationError> {
        for (i, def) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == def.name) {
                return Err(ConfigurationError::DuplicateRegistration(format!(
                    "field `{}` on `{}`",
                    def.name, self.type_tag
                )));
            }
            if let FieldKind::Fixed { scale } = def.kind {
                if scale > MAX_SCALE {
                    return Err(ConfigurationError::ScaleOutOfRange {
                        scale,
                        max: MAX_SCALE,
                    });
                }
            }
        }
        Ok(Arc::new(RecordSchema {
            type_tag: self.type_tag,
            fields: self.fields,
        }))
    }
}

/// All record types known to a store, keyed by type tag.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Arc<RecordSchema>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Arc<RecordSchema>) -> Result<(), ConfigurationError> {
        let tag = schema.type_tag().to_string();
        if self.schemas.contains_key(&tag) {
            return Err(ConfigurationError::DuplicateRegistration(format!(
                "schema `{tag}`"
            )));
        }
        self.schemas.insert(tag, schema);
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Option<&Arc<RecordSchema>> {
        self.schemas.get(type_tag)
    }

    pub fn require(&self, type_tag: &str) -> Result<&Arc<RecordSchema>, ConfigurationError> {
        self.get(type_tag)
            .ok_or_else(|| ConfigurationError::UnknownRecordType(type_tag.to_string()))
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
