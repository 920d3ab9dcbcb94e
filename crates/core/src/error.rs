use thiserror::Error;

/// Setup and programming defects. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("field `{field}` is not part of the `{type_tag}` schema")]
    UnknownField { type_tag: String, field: String },

    #[error("field `{field}` expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: &'static str,
    },

    #[error("field `{field}` has scale {scale}, declared scale is {declared}")]
    ScaleExceeded {
        field: String,
        scale: u32,
        declared: u32,
    },

    #[error("scale {scale} exceeds the maximum of {max}")]
    ScaleOutOfRange { scale: u32, max: u32 },

    #[error("no factory mapped for discriminant `{field}` = {value}")]
    UnmappedDiscriminant { field: String, value: String },

    #[error("field `{field}` cannot be used as a discriminant: {actual}")]
    InvalidDiscriminant { field: String, actual: &'static str },

    #[error("factory `{entity}` binds `{expected}`, record is `{actual}`")]
    TypeTagMismatch {
        entity: &'static str,
        expected: String,
        actual: String,
    },

    #[error("no strategy registered for record type `{0}`")]
    UnknownRecordType(String),

    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("no strategy matched `{type_tag}`: {}", reasons.join("; "))]
    NoMatchingStrategy {
        type_tag: String,
        reasons: Vec<String>,
    },

    #[error("validation rule targets unknown field `{field}` on `{type_tag}`")]
    RuleTargetsUnknownField { type_tag: String, field: String },

    #[error("reference field `{field}` targets `{expected}`, entity is `{actual}`")]
    ReferenceTargetMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("rounding mode must be specified")]
    MissingRoundingMode,

    #[error("target scale must be specified")]
    MissingScale,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("rounding required but mode is Unnecessary")]
    RoundingRequired,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
