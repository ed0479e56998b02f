use crate::enrollment;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{optional_str, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::EnrollmentForm;
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn enrollment_extract(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(params, "path")?);
    let bytes = std::fs::read(&path).map_err(|e| {
        HandlerErr::bad_params(format!("failed to read image {}: {}", path.to_string_lossy(), e))
    })?;
    let form = enrollment::extract(&bytes)?;
    Ok(json!({ "form": form }))
}

fn enrollment_apply(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let raw = params
        .get("form")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing form"))?;
    let form: EnrollmentForm =
        serde_json::from_value(raw).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let email = optional_str(params, "email").unwrap_or_default();
    let summary = enrollment::apply(&SqliteStore::new(conn), &form, &email)?;
    Ok(json!(summary))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.extract" => Some(match enrollment_extract(&req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        "enrollment.apply" => Some(with_conn(state, req, enrollment_apply)),
        _ => None,
    }
}
