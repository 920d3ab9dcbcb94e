//! Billing domain used by the integration tests: one `invoice` table
//! holding two entity types told apart by `kind`, and a `customer` table.
//!
//! The typed accessors here are what a code generator would emit.

use std::sync::Arc;

use recordkit_core::{
    ConfigurationError, FieldKind, FieldValue, FixedPoint, Record, RecordSchema, SchemaCatalog,
};
use recordkit_engine::{
    DiscriminantStrategy, Entity, EntityCore, EntityRegistry, RecordEntity, Rule, UnitOfWork,
    ValidationError,
};

pub const INVOICE: &str = "invoice";
pub const CUSTOMER: &str = "customer";

pub const STATUSES: [&str; 4] = ["Draft", "Approved", "Paid", "Void"];

pub fn invoice_schema() -> Result<Arc<RecordSchema>, ConfigurationError> {
    RecordSchema::builder(INVOICE)
        .required("kind", FieldKind::Text)
        .required("status", FieldKind::Text)
        .field("amount", FieldKind::Fixed { scale: 2 })
        .field("customer", FieldKind::Reference { target: CUSTOMER.into() })
        .field("original", FieldKind::Reference { target: INVOICE.into() })
        .field("note", FieldKind::Text)
        .build()
}

pub fn customer_schema() -> Result<Arc<RecordSchema>, ConfigurationError> {
    RecordSchema::builder(CUSTOMER)
        .required("name", FieldKind::Text)
        .field("email", FieldKind::Text)
        .field("credit_limit", FieldKind::Fixed { scale: 2 })
        .build()
}

pub fn catalog() -> Result<SchemaCatalog, ConfigurationError> {
    let mut catalog = SchemaCatalog::new();
    catalog.register(invoice_schema()?)?;
    catalog.register(customer_schema()?)?;
    Ok(catalog)
}

/// Invoices resolve strictly on `kind`; customers have a single type.
pub fn registry() -> Result<EntityRegistry, ConfigurationError> {
    let invoices = DiscriminantStrategy::new("kind")
        .map_factory(StandardInvoice::KIND, StandardInvoice::factory())?
        .map_factory(CreditNote::KIND, CreditNote::factory())?
        .strict();
    let mut registry = EntityRegistry::new();
    registry.register(INVOICE, Arc::new(invoices))?;
    registry.register_factory(Customer::factory())?;
    Ok(registry)
}

/// A fresh, unpersisted invoice record of the given kind, in `Draft`.
pub fn invoice_record(kind: &str) -> Result<Record, ConfigurationError> {
    let mut record = Record::new(invoice_schema()?);
    record.put("kind", FieldValue::from(kind))?;
    record.put("status", FieldValue::from("Draft"))?;
    Ok(record)
}

fn text(entity: &dyn Entity, field: &str) -> Result<Option<String>, ConfigurationError> {
    Ok(entity.get(field)?.as_text().map(str::to_string))
}

fn fixed(entity: &dyn Entity, field: &str) -> Result<Option<FixedPoint>, ConfigurationError> {
    Ok(entity.get(field)?.as_fixed())
}

fn invoice_rules() -> Vec<Rule> {
    vec![
        Rule::OneOf {
            field: "status".into(),
            allowed: STATUSES.iter().map(|s| s.to_string()).collect(),
        },
        Rule::NonNegative("amount".into()),
        Rule::MaxLength { field: "note".into(), max: 280 },
    ]
}

/// Accessors shared by every entity stored in the `invoice` table.
pub trait Invoice: Entity {
    fn status(&self) -> Result<Option<String>, ConfigurationError> {
        text(self.as_entity(), "status")
    }

    fn set_status(&mut self, status: &str) -> Result<(), ConfigurationError> {
        self.set("status", status.into())
    }

    fn amount(&self) -> Result<Option<FixedPoint>, ConfigurationError> {
        fixed(self.as_entity(), "amount")
    }

    fn set_amount(&mut self, amount: FixedPoint) -> Result<(), ConfigurationError> {
        self.set("amount", amount.into())
    }

    fn set_customer(&mut self, customer: &Customer) -> Result<(), ConfigurationError> {
        self.set_reference("customer", customer)
    }

    fn note(&self) -> Result<Option<String>, ConfigurationError> {
        text(self.as_entity(), "note")
    }

    fn set_note(&mut self, note: &str) -> Result<(), ConfigurationError> {
        self.set("note", note.into())
    }

    fn as_entity(&self) -> &dyn Entity;
}

#[derive(Debug)]
pub struct StandardInvoice {
    core: EntityCore,
}

impl StandardInvoice {
    pub const KIND: &'static str = "standard";

    pub fn draft(uow: &UnitOfWork) -> Result<Self, ConfigurationError> {
        Self::wrap(invoice_record(Self::KIND)?, uow)
    }
}

impl Entity for StandardInvoice {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn entity_name(&self) -> &'static str {
        Self::ENTITY_NAME
    }

    fn rules(&self) -> Vec<Rule> {
        invoice_rules()
    }
}

impl RecordEntity for StandardInvoice {
    const TYPE_TAG: &'static str = INVOICE;
    const ENTITY_NAME: &'static str = "StandardInvoice";

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }
}

impl Invoice for StandardInvoice {
    fn as_entity(&self) -> &dyn Entity {
        self
    }
}

/// Credits a previously issued invoice.
#[derive(Debug)]
pub struct CreditNote {
    core: EntityCore,
}

impl CreditNote {
    pub const KIND: &'static str = "credit";

    pub fn draft(uow: &UnitOfWork) -> Result<Self, ConfigurationError> {
        Self::wrap(invoice_record(Self::KIND)?, uow)
    }

    pub fn set_original(&mut self, invoice: &dyn Invoice) -> Result<(), ConfigurationError> {
        self.set_reference("original", invoice.as_entity())
    }
}

impl Entity for CreditNote {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn entity_name(&self) -> &'static str {
        Self::ENTITY_NAME
    }

    fn rules(&self) -> Vec<Rule> {
        invoice_rules()
    }

    fn validate_domain(&self, errors: &mut Vec<ValidationError>) {
        let linked = self.get("original").is_ok_and(|v| !v.is_null())
            || self.core.changes().contains("original");
        if !linked {
            errors.push(ValidationError::error(
                "original",
                "a credit note must reference the invoice it credits",
            ));
        }
    }
}

impl RecordEntity for CreditNote {
    const TYPE_TAG: &'static str = INVOICE;
    const ENTITY_NAME: &'static str = "CreditNote";

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }
}

impl Invoice for CreditNote {
    fn as_entity(&self) -> &dyn Entity {
        self
    }
}

#[derive(Debug)]
pub struct Customer {
    core: EntityCore,
}

impl Customer {
    pub fn create(name: &str, uow: &UnitOfWork) -> Result<Self, ConfigurationError> {
        let mut record = Record::new(customer_schema()?);
        record.put("name", name.into())?;
        Self::wrap(record, uow)
    }

    pub fn name(&self) -> Result<Option<String>, ConfigurationError> {
        text(self, "name")
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), ConfigurationError> {
        self.set("name", name.into())
    }

    pub fn email(&self) -> Result<Option<String>, ConfigurationError> {
        text(self, "email")
    }

    pub fn set_email(&mut self, email: &str) -> Result<(), ConfigurationError> {
        self.set("email", email.into())
    }

    pub fn credit_limit(&self) -> Result<Option<FixedPoint>, ConfigurationError> {
        fixed(self, "credit_limit")
    }

    pub fn set_credit_limit(&mut self, limit: FixedPoint) -> Result<(), ConfigurationError> {
        self.set("credit_limit", limit.into())
    }
}

impl Entity for Customer {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn entity_name(&self) -> &'static str {
        Self::ENTITY_NAME
    }

    fn rules(&self) -> Vec<Rule> {
        vec![
            Rule::MaxLength { field: "name".into(), max: 64 },
            Rule::NonNegative("credit_limit".into()),
        ]
    }
}

impl RecordEntity for Customer {
    const TYPE_TAG: &'static str = CUSTOMER;
    const ENTITY_NAME: &'static str = "Customer";

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }
}
