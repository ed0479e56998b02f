use serde_json::json;

use crate::enrollment::EnrollmentError;
use crate::relay::RelayError;
use crate::store::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn missing_fields(fields: &[&'static str]) -> Self {
        Self {
            code: "bad_params",
            message: format!("missing required fields: {}", fields.join(", ")),
            details: Some(json!({ "missing": fields })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        tracing::warn!(error = %e, "record store failure");
        Self::new(e.code(), e.to_string())
    }
}

impl From<RelayError> for HandlerErr {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::MissingParams(fields) => Self::missing_fields(&fields),
            other => Self::new(other.code(), other.to_string()),
        }
    }
}

impl From<EnrollmentError> for HandlerErr {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::Store(inner) => inner.into(),
            other => Self::new(other.code(), other.to_string()),
        }
    }
}
