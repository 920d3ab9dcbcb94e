use recordkit_core::{ConfigurationError, FieldKind, FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// An expected, data-level rule violation. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    /// A violation that is not tied to a single field.
    pub fn record(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            field: None,
            message: message.into(),
            severity,
        }
    }
}

/// Built-in field rules. `Null` values pass every rule except `Required`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Required(String),
    MaxLength { field: String, max: usize },
    NonNegative(String),
    OneOf { field: String, allowed: Vec<String> },
}

impl Rule {
    pub fn field(&self) -> &str {
        match self {
            Self::Required(field) | Self::NonNegative(field) => field,
            Self::MaxLength { field, .. } | Self::OneOf { field, .. } => field,
        }
    }

    fn kind_mismatch(&self, kind: &FieldKind, expected: &str) -> ConfigurationError {
        ConfigurationError::TypeMismatch {
            field: self.field().to_string(),
            expected: expected.to_string(),
            actual: match kind {
                FieldKind::Text => "Text",
                FieldKind::Integer => "Integer",
                FieldKind::Float => "Float",
                FieldKind::Boolean => "Boolean",
                FieldKind::Timestamp => "Timestamp",
                FieldKind::Fixed { .. } => "Fixed",
                FieldKind::Reference { .. } => "Reference",
                FieldKind::Bytes => "Bytes",
            },
        }
    }

    fn check(
        &self,
        kind: &FieldKind,
        value: &FieldValue,
    ) -> Result<Option<ValidationError>, ConfigurationError> {
        let field = self.field();
        match self {
            Self::Required(_) => Ok(value
                .is_null()
                .then(|| ValidationError::error(field, format!("{field} is required")))),
            Self::MaxLength { max, .. } => {
                if *kind != FieldKind::Text {
                    return Err(self.kind_mismatch(kind, "Text"));
                }
                Ok(value
                    .as_text()
                    .filter(|s| s.chars().count() > *max)
                    .map(|_| ValidationError::error(field, format!("{field} exceeds {max} characters"))))
            }
            Self::NonNegative(_) => {
                let negative = match (kind, value) {
                    (_, FieldValue::Null) => false,
                    (FieldKind::Integer, FieldValue::Integer(n)) => *n < 0,
                    (FieldKind::Fixed { .. }, FieldValue::Fixed(v)) => v.is_negative(),
                    (FieldKind::Integer | FieldKind::Fixed { .. }, _) => false,
                    _ => return Err(self.kind_mismatch(kind, "Integer or Fixed")),
                };
                Ok(negative.then(|| ValidationError::error(field, format!("{field} must not be negative"))))
            }
            Self::OneOf { allowed, .. } => {
                if *kind != FieldKind::Text {
                    return Err(self.kind_mismatch(kind, "Text"));
                }
                Ok(value
                    .as_text()
                    .filter(|s| !allowed.iter().any(|a| a == s))
                    .map(|s| {
                        ValidationError::error(
                            field,
                            format!("{field} `{s}` is not one of {}", allowed.join(", ")),
                        )
                    }))
            }
        }
    }
}

/// Schema-required fields first, then `rules` in order.
pub(crate) fn check_record(
    record: &Record,
    rules: &[Rule],
) -> Result<Vec<ValidationError>, ConfigurationError> {
    let schema = record.schema();
    let mut errors = Vec::new();

    for def in schema.fields().iter().filter(|def| def.required) {
        if record.get(&def.name).is_none_or(FieldValue::is_null) {
            errors.push(ValidationError::error(
                def.name.as_str(),
                format!("{} is required", def.name),
            ));
        }
    }

    for rule in rules {
        let def = schema
            .field(rule.field())
            .ok_or_else(|| ConfigurationError::RuleTargetsUnknownField {
                type_tag: schema.type_tag().to_string(),
                field: rule.field().to_string(),
            })?;
        let value = record.get(&def.name).unwrap_or(&FieldValue::Null);
        if let Some(error) = rule.check(&def.kind, value)? {
            errors.push(error);
        }
    }

    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::factory::RecordEntity;
    use crate::testing::{Chore, Milestone, task_record, task_schema};
    use crate::unit_of_work::UnitOfWork;
    use recordkit_core::FixedPoint;

    #[test]
    fn required_fields_are_reported_first() {
        let record = Record::new(task_schema());
        let errors = check_record(&record, &[Rule::NonNegative("estimate".into())]).unwrap();
        let fields: Vec<_> = errors.iter().filter_map(|e| e.field.as_deref()).collect();
        assert_eq!(fields, vec!["kind", "title"]);
    }

    #[test]
    fn rules_report_violations() {
        let uow = UnitOfWork::new();
        let mut chore = Chore::wrap(task_record("chore", "a title well over sixteen"), &uow).unwrap();
        chore.set("estimate", FixedPoint::new(-5, 2).unwrap().into()).unwrap();
        let errors = chore.validate().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.severity == Severity::Error));
    }

    #[test]
    fn domain_hook_runs_after_rules() {
        let uow = UnitOfWork::new();
        let mut milestone = Milestone::wrap(task_record("milestone", "ship"), &uow).unwrap();
        assert!(milestone.validate().unwrap().is_empty());
        milestone.set("estimate", FixedPoint::new(100, 2).unwrap().into()).unwrap();
        let errors = milestone.validate().unwrap();
        assert_eq!(errors, vec![ValidationError::error("estimate", "milestones are not estimated")]);
    }

    #[test]
    fn misconfigured_rules_are_errors() {
        let record = task_record("chore", "a");
        let unknown = check_record(&record, &[Rule::Required("owner".into())]);
        assert!(matches!(unknown, Err(ConfigurationError::RuleTargetsUnknownField { .. })));
        let kind = check_record(&record, &[Rule::MaxLength { field: "estimate".into(), max: 3 }]);
        assert!(matches!(kind, Err(ConfigurationError::TypeMismatch { .. })));
    }

    #[test]
    fn one_of_accepts_listed_values() {
        let record = task_record("chore", "a");
        let rule = Rule::OneOf { field: "kind".into(), allowed: vec!["chore".into(), "milestone".into()] };
        assert!(check_record(&record, &[rule]).unwrap().is_empty());
        let strict = Rule::OneOf { field: "kind".into(), allowed: vec!["milestone".into()] };
        assert_eq!(check_record(&record, &[strict]).unwrap().len(), 1);
    }
}
