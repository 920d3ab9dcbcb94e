use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use recordkit_core::{
    field_value::FieldValue, ids::RecordId, record::Record, schema::SchemaCatalog,
};

use crate::error::StorageError;
use crate::traits::{Criteria, Store};

pub struct SqliteStore {
    conn: Connection,
    catalog: SchemaCatalog,
}

impl SqliteStore {
    pub fn open(path: &str, catalog: SchemaCatalog) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn, catalog })
    }

    pub fn open_in_memory(catalog: SchemaCatalog) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn, catalog })
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn record_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn read_fields(&self, record_id: i64) -> Result<Vec<(String, FieldValue)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_key, value FROM fields WHERE record_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![record_id], |row| {
            let key: String = row.get(0)?;
            let val_bytes: Vec<u8> = row.get(1)?;
            Ok((key, val_bytes))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (key, val_bytes) = row?;
            let value = FieldValue::from_msgpack(&val_bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            result.push((key, value));
        }
        Ok(result)
    }
}

fn encode(value: &FieldValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn upsert_field(
    tx: &rusqlite::Transaction,
    record_id: i64,
    field_key: &str,
    value: &FieldValue,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO fields (record_id, field_key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(record_id, field_key) DO UPDATE SET value = excluded.value",
        rusqlite::params![record_id, field_key, encode(value)?],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn insert(&mut self, records: &[Record]) -> Result<Vec<RecordId>, StorageError> {
        for record in records {
            self.catalog.require(record.type_tag())?;
        }

        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let raw_id = match record.id() {
                Some(id) => {
                    let result = tx.execute(
                        "INSERT INTO records (record_id, type_tag) VALUES (?1, ?2)",
                        rusqlite::params![id.get(), record.type_tag()],
                    );
                    match result {
                        Ok(_) => {}
                        Err(rusqlite::Error::SqliteFailure(err, _))
                            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                        {
                            return Err(StorageError::RecordCollision {
                                record_id: id.to_string(),
                            });
                        }
                        Err(e) => return Err(StorageError::Sqlite(e)),
                    }
                    id.get()
                }
                None => {
                    tx.execute(
                        "INSERT INTO records (type_tag) VALUES (?1)",
                        rusqlite::params![record.type_tag()],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            for (key, value) in record.values() {
                upsert_field(&tx, raw_id, key, value)?;
            }
            ids.push(RecordId::new(raw_id));
        }
        tx.commit()?;

        debug!(count = ids.len(), "inserted records");
        Ok(ids)
    }

    fn update(
        &mut self,
        id: RecordId,
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let type_tag: Option<String> = tx
            .query_row(
                "SELECT type_tag FROM records WHERE record_id = ?1",
                rusqlite::params![id.get()],
                |row| row.get(0),
            )
            .optional()?;
        let type_tag = type_tag.ok_or_else(|| StorageError::NotFound(format!("record {id}")))?;

        let schema = self.catalog.require(&type_tag)?;
        for (key, value) in changes {
            schema.require_field(key)?.check(value)?;
            upsert_field(&tx, id.get(), key, value)?;
        }
        tx.execute(
            "UPDATE records SET updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER) WHERE record_id = ?1",
            rusqlite::params![id.get()],
        )?;
        tx.commit()?;

        debug!(record_id = %id, fields = changes.len(), "applied partial update");
        Ok(())
    }

    fn query(&self, criteria: &Criteria) -> Result<Vec<Record>, StorageError> {
        let mut sql = String::from("SELECT record_id, type_tag FROM records WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();

        if let Some(type_tag) = &criteria.type_tag {
            sql.push_str(" AND type_tag = ?");
            params.push(Value::Text(type_tag.clone()));
        }
        if !criteria.ids.is_empty() {
            let placeholders = vec!["?"; criteria.ids.len()].join(", ");
            sql.push_str(&format!(" AND record_id IN ({placeholders})"));
            params.extend(criteria.ids.iter().map(|id| Value::Integer(id.get())));
        }
        for (field, value) in &criteria.equals {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM fields f WHERE f.record_id = records.record_id AND f.field_key = ? AND f.value = ?)",
            );
            params.push(Value::Text(field.clone()));
            params.push(Value::Blob(encode(value)?));
        }
        sql.push_str(" ORDER BY record_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let record_id: i64 = row.get(0)?;
                let type_tag: String = row.get(1)?;
                Ok((record_id, type_tag))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (record_id, type_tag) in rows {
            let schema = self.catalog.require(&type_tag)?.clone();
            let fields = self.read_fields(record_id)?;
            records.push(Record::from_stored(
                schema,
                Some(RecordId::new(record_id)),
                fields,
            )?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordkit_core::{FieldKind, FixedPoint, RecordSchema};

    fn catalog() -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        catalog
            .register(
                RecordSchema::builder("invoice")
                    .required("status", FieldKind::Text)
                    .field("amount", FieldKind::Fixed { scale: 2 })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
    }

    fn draft(store: &SqliteStore) -> Record {
        let mut record = Record::new(store.catalog().require("invoice").unwrap().clone());
        record.put("status", "Draft".into()).unwrap();
        record
    }

    #[test]
    fn insert_assigns_ids_and_get_reads_back() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let records = [draft(&store), draft(&store)];
        let ids = store.insert(&records).unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let loaded = store.get(ids[0]).unwrap().unwrap();
        assert_eq!(loaded.id(), Some(ids[0]));
        assert_eq!(loaded.get("status"), Some(&FieldValue::Text("Draft".into())));
        assert_eq!(loaded.get("amount"), Some(&FieldValue::Null));
    }

    #[test]
    fn insert_honors_explicit_id_and_detects_collision() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let mut record = draft(&store);
        record.assign_id(RecordId::new(42));
        let ids = store.insert(&[record.clone()]).unwrap();
        assert_eq!(ids, vec![RecordId::new(42)]);

        let err = store.insert(&[record]).unwrap_err();
        assert!(matches!(err, StorageError::RecordCollision { .. }));
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn update_touches_only_given_fields() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let record = draft(&store);
        let id = store.insert(&[record]).unwrap()[0];

        let mut changes = BTreeMap::new();
        changes.insert(
            "amount".to_string(),
            FieldValue::Fixed(FixedPoint::new(15000, 2).unwrap()),
        );
        store.update(id, &changes).unwrap();

        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.get("status"), Some(&FieldValue::Text("Draft".into())));
        assert_eq!(
            loaded.get("amount"),
            Some(&FieldValue::Fixed(FixedPoint::new(15000, 2).unwrap()))
        );
    }

    #[test]
    fn update_unknown_record_is_not_found() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let mut changes = BTreeMap::new();
        changes.insert("status".to_string(), FieldValue::Text("Approved".into()));
        let err = store.update(RecordId::new(999), &changes).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn update_rejects_excess_scale() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let record = draft(&store);
        let id = store.insert(&[record]).unwrap()[0];
        let mut changes = BTreeMap::new();
        changes.insert(
            "amount".to_string(),
            FieldValue::Fixed(FixedPoint::new(150_000, 3).unwrap()),
        );
        assert!(matches!(store.update(id, &changes), Err(StorageError::Core(_))));
    }

    #[test]
    fn query_filters_by_field_value() {
        let mut store = SqliteStore::open_in_memory(catalog()).unwrap();
        let mut approved = draft(&store);
        approved.put("status", "Approved".into()).unwrap();
        let records = [draft(&store), approved];
        let ids = store.insert(&records).unwrap();

        let found = store
            .query(&Criteria::of_type("invoice").with_field("status", "Approved".into()))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), Some(ids[1]));

        let by_ids = store.query(&Criteria::by_ids(ids.clone())).unwrap();
        assert_eq!(by_ids.len(), 2);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let path = path.to_str().unwrap();

        let id = {
            let mut store = SqliteStore::open(path, catalog()).unwrap();
            let record = draft(&store);
            store.insert(&[record]).unwrap()[0]
        };

        let store = SqliteStore::open(path, catalog()).unwrap();
        let loaded = store.get(id).unwrap().unwrap();
        assert_eq!(loaded.get("status"), Some(&FieldValue::Text("Draft".into())));
    }
}
