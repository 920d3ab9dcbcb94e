use recordkit_core::{FieldValue, FixedPoint, Record, RecordId};
use recordkit_engine::{CommitReport, Entity, EntityRegistry, RecordEntity, UnitOfWork};
use recordkit_storage::{SqliteStore, StorageError, Store};
use tempfile::TempDir;

use crate::domain;
use crate::recording::RecordingStore;

/// A billing registry, a recording SQLite store and one unit of work.
pub struct TestContext {
    pub store: RecordingStore<SqliteStore>,
    pub registry: EntityRegistry,
    pub uow: UnitOfWork,
    dir: Option<TempDir>,
}

impl TestContext {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        crate::logging::init();
        let store = SqliteStore::open_in_memory(domain::catalog()?)?;
        Ok(Self {
            store: RecordingStore::new(store),
            registry: domain::registry()?,
            uow: UnitOfWork::new(),
            dir: None,
        })
    }

    /// Same as [`TestContext::new`] but backed by a database file in a
    /// temporary directory, so [`TestContext::reopen`] can check what
    /// actually reached disk.
    pub fn on_disk() -> Result<Self, Box<dyn std::error::Error>> {
        crate::logging::init();
        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&db_path(&dir)?, domain::catalog()?)?;
        Ok(Self {
            store: RecordingStore::new(store),
            registry: domain::registry()?,
            uow: UnitOfWork::new(),
            dir: Some(dir),
        })
    }

    /// Open a second connection to the database file.
    pub fn reopen(&self) -> Result<SqliteStore, Box<dyn std::error::Error>> {
        let dir = self.dir.as_ref().ok_or("context is not file-backed")?;
        Ok(SqliteStore::open(&db_path(dir)?, domain::catalog()?)?)
    }

    /// Write an invoice row under a fixed identity, bypassing the unit of
    /// work. The call is not recorded.
    pub fn seed_invoice(
        &mut self,
        id: i64,
        kind: &str,
        status: &str,
        amount: Option<FixedPoint>,
    ) -> Result<RecordId, Box<dyn std::error::Error>> {
        let mut record = domain::invoice_record(kind)?;
        record.put("status", FieldValue::from(status))?;
        if let Some(amount) = amount {
            record.put("amount", amount.into())?;
        }
        self.seed(record, id)
    }

    pub fn seed_customer(&mut self, id: i64, name: &str) -> Result<RecordId, Box<dyn std::error::Error>> {
        let mut record = Record::new(domain::customer_schema()?);
        record.put("name", FieldValue::from(name))?;
        self.seed(record, id)
    }

    fn seed(&mut self, mut record: Record, id: i64) -> Result<RecordId, Box<dyn std::error::Error>> {
        record.assign_id(RecordId::new(id));
        let ids = self.store.inner_mut().insert(&[record])?;
        ids.first()
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("seeded record {id}")).into())
    }

    /// Load through the registry, resolving the entity type.
    pub fn load(&self, id: RecordId) -> Result<Box<dyn Entity>, Box<dyn std::error::Error>> {
        Ok(self.registry.load(&self.store, id, &self.uow)?)
    }

    /// Load and wrap as a known entity type without resolution.
    pub fn load_as<E: RecordEntity>(&self, id: RecordId) -> Result<E, Box<dyn std::error::Error>> {
        let record = self
            .store
            .inner()
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(E::wrap(record, &self.uow)?)
    }

    /// Current stored value of one field.
    pub fn stored(&self, id: RecordId, field: &str) -> Result<FieldValue, Box<dyn std::error::Error>> {
        let record = self
            .store
            .inner()
            .get(id)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(record.get(field).cloned().unwrap_or(FieldValue::Null))
    }

    pub fn commit(&mut self) -> CommitReport {
        self.uow.commit(&mut self.store)
    }
}

fn db_path(dir: &TempDir) -> Result<String, Box<dyn std::error::Error>> {
    let path = dir.path().join("records.db");
    Ok(path.to_str().ok_or("temporary path is not UTF-8")?.to_string())
}
