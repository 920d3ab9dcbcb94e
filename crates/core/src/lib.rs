pub mod error;
pub mod field_value;
pub mod fixed;
pub mod ids;
pub mod record;
pub mod schema;

pub use error::{ConfigurationError, CoreError};
pub use field_value::FieldValue;
pub use fixed::{FixedPoint, MathContext, RoundingMode};
pub use ids::*;
pub use record::Record;
pub use schema::{FieldDef, FieldKind, RecordSchema, SchemaCatalog};
