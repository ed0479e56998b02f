use std::cell::RefCell;
use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

use crate::model::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Teachers,
    Subjects,
    Semesters,
    AttendanceRecords,
}

impl Collection {
    pub fn key(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Teachers => "teachers",
            Self::Subjects => "subjects",
            Self::Semesters => "semesters",
            Self::AttendanceRecords => "attendanceRecords",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("stored {collection} collection is malformed: {source}")]
    Corrupt {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {collection} collection: {source}")]
    Encode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(_) => "db_query_failed",
            Self::Corrupt { .. } => "store_corrupt",
            Self::Encode { .. } => "db_update_failed",
        }
    }
}

/// Whole-collection persistence. There is no partial update: callers read a
/// collection, change it in memory and write all of it back.
pub trait RecordStore {
    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError>;
    fn save(&self, collection: Collection, payload: &str) -> Result<(), StoreError>;
}

pub fn read<T: Entity>(store: &dyn RecordStore) -> Result<Vec<T>, StoreError> {
    let Some(raw) = store.load(T::COLLECTION)? else {
        return Ok(Vec::new());
    };
    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        collection: T::COLLECTION.key(),
        source,
    })
}

pub fn write<T: Entity>(store: &dyn RecordStore, items: &[T]) -> Result<(), StoreError> {
    let payload = serde_json::to_string(items).map_err(|source| StoreError::Encode {
        collection: T::COLLECTION.key(),
        source,
    })?;
    store.save(T::COLLECTION, &payload)
}

/// Inserts or replaces by id, keeping the position of replaced items.
/// Returns how many of `incoming` replaced an existing item.
pub fn merge_by_id<T: Entity>(existing: &mut Vec<T>, incoming: Vec<T>) -> usize {
    let mut index: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id().to_string(), i))
        .collect();
    let mut replaced = 0;
    for item in incoming {
        match index.get(item.id()) {
            Some(&i) => {
                existing[i] = item;
                replaced += 1;
            }
            None => {
                index.insert(item.id().to_string(), existing.len());
                existing.push(item);
            }
        }
    }
    replaced
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore for SqliteStore<'_> {
    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM collections WHERE name = ?",
                [collection.key()],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save(&self, collection: Collection, payload: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO collections(name, payload, updated_at)
             VALUES(?, ?, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            (collection.key(), payload),
        )?;
        tracing::debug!(collection = collection.key(), bytes = payload.len(), "collection written");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RefCell<HashMap<Collection, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, collection: Collection) -> Result<Option<String>, StoreError> {
        Ok(self.collections.borrow().get(&collection).cloned())
    }

    fn save(&self, collection: Collection, payload: &str) -> Result<(), StoreError> {
        self.collections
            .borrow_mut()
            .insert(collection, payload.to_string());
        Ok(())
    }
}
