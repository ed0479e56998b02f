//! List/create/update/delete for the four directory collections.

use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{Entity, Semester, Student, Subject, Teacher};
use crate::store::{self, RecordStore, SqliteStore};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy)]
enum Action {
    List,
    Create,
    Update,
    Delete,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "list" => Some(Self::List),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Required keys that are absent, null or blank strings.
fn absent_required<T: Entity>(fields: &Map<String, Value>) -> Vec<&'static str> {
    T::REQUIRED
        .iter()
        .copied()
        .filter(|key| match fields.get(*key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect()
}

/// Builds an entity from request params with `id` forced to the given
/// value, then applies form validation.
fn entity_from_params<T: Entity>(params: &Value, id: &str) -> Result<T, HandlerErr> {
    let mut fields: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
    let absent = absent_required::<T>(&fields);
    if !absent.is_empty() {
        return Err(HandlerErr::missing_fields(&absent));
    }
    fields.insert("id".to_string(), Value::String(id.to_string()));
    let entity: T = serde_json::from_value(Value::Object(fields))
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let missing = entity.missing_fields();
    if !missing.is_empty() {
        return Err(HandlerErr::missing_fields(&missing));
    }
    let warnings = entity.integrity_warnings();
    if !warnings.is_empty() {
        tracing::warn!(
            collection = T::COLLECTION.key(),
            id,
            warnings = ?warnings,
            "saved with integrity warnings"
        );
    }
    Ok(entity)
}

fn list<T: Entity>(store: &dyn RecordStore) -> Result<Value, HandlerErr> {
    let items: Vec<T> = store::read(store)?;
    let encoded = serde_json::to_value(&items)
        .map_err(|e| HandlerErr::new("internal_error", e.to_string()))?;
    let mut result = Map::new();
    result.insert(T::COLLECTION.key().to_string(), encoded);
    Ok(Value::Object(result))
}

fn create<T: Entity>(store: &dyn RecordStore, params: &Value) -> Result<Value, HandlerErr> {
    let id = Uuid::new_v4().to_string();
    let entity: T = entity_from_params(params, &id)?;
    let warnings = entity.integrity_warnings();
    let mut items: Vec<T> = store::read(store)?;
    items.push(entity);
    store::write(store, &items)?;
    tracing::info!(collection = T::COLLECTION.key(), %id, "created");
    Ok(json!({ "id": id, "warnings": warnings }))
}

fn update<T: Entity>(store: &dyn RecordStore, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let entity: T = entity_from_params(params, &id)?;
    let warnings = entity.integrity_warnings();
    let mut items: Vec<T> = store::read(store)?;
    let Some(slot) = items.iter_mut().find(|item| item.id() == id) else {
        return Err(HandlerErr::new(
            "not_found",
            format!("{} entry not found", T::COLLECTION.key()),
        ));
    };
    *slot = entity;
    store::write(store, &items)?;
    tracing::info!(collection = T::COLLECTION.key(), %id, "updated");
    Ok(json!({ "ok": true, "warnings": warnings }))
}

/// Dependent attendance records are left alone; they resolve to fallback
/// labels from then on.
fn delete<T: Entity>(store: &dyn RecordStore, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let mut items: Vec<T> = store::read(store)?;
    let before = items.len();
    items.retain(|item| item.id() != id);
    if items.len() == before {
        return Err(HandlerErr::new(
            "not_found",
            format!("{} entry not found", T::COLLECTION.key()),
        ));
    }
    store::write(store, &items)?;
    tracing::info!(collection = T::COLLECTION.key(), %id, "deleted");
    Ok(json!({ "ok": true }))
}

fn dispatch<T: Entity>(conn: &Connection, action: Action, params: &Value) -> Result<Value, HandlerErr> {
    let store = SqliteStore::new(conn);
    match action {
        Action::List => list::<T>(&store),
        Action::Create => create::<T>(&store, params),
        Action::Update => update::<T>(&store, params),
        Action::Delete => delete::<T>(&store, params),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (family, action) = req.method.split_once('.')?;
    let action = Action::parse(action)?;
    let run: fn(&Connection, Action, &Value) -> Result<Value, HandlerErr> = match family {
        "students" => dispatch::<Student>,
        "teachers" => dispatch::<Teacher>,
        "subjects" => dispatch::<Subject>,
        "semesters" => dispatch::<Semester>,
        _ => return None,
    };
    Some(with_conn(state, req, |conn, params| run(conn, action, params)))
}
