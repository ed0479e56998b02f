use crate::analytics::{self, IdFilter};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceRecord;
use crate::relay::{
    format_daily_summary, MockEmailRelay, SmtpConfig, TelegramRelay, TELEGRAM_TEST_MESSAGE,
};
use crate::store::{self, SqliteStore};
use chrono::{NaiveDate, Utc};
use serde_json::json;

/// Explicit `botToken`/`chatId` params win; otherwise the saved telegram
/// settings are used, and only if they are enabled.
fn telegram_credentials(state: &AppState, params: &serde_json::Value) -> Result<(String, String), HandlerErr> {
    if let (Some(token), Some(chat)) = (optional_str(params, "botToken"), optional_str(params, "chatId")) {
        return Ok((token, chat));
    }
    let conn = db_conn(state)?;
    let saved = setup::telegram_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if !saved.is_configured() {
        return Err(HandlerErr::new(
            "not_configured",
            "telegram notifications are not configured",
        ));
    }
    Ok((saved.bot_token, saved.chat_id))
}

fn send_telegram(state: &AppState, params: &serde_json::Value, message: &str) -> Result<serde_json::Value, HandlerErr> {
    let (token, chat) = telegram_credentials(state, params)?;
    let relay = TelegramRelay::new(&state.relay.telegram_api_base, state.relay.timeout)?;
    relay.send(&token, &chat, message)?;
    Ok(json!({ "success": true }))
}

fn telegram_test(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    send_telegram(state, params, TELEGRAM_TEST_MESSAGE)
}

fn telegram_notify(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let message = required_str(params, "message")?;
    send_telegram(state, params, &message)
}

/// Tallies one local calendar day (today when `date` is absent) and posts
/// the summary to the telegram chat.
fn telegram_daily_summary(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = setup::analytics_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let offset = analytics::local_offset(settings.utc_offset_minutes);
    let day = match optional_str(params, "date") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?,
        None => Utc::now().with_timezone(&offset).date_naive(),
    };
    let semester = IdFilter::parse(params.get("semesterId").and_then(|v| v.as_str()));
    let subject = IdFilter::parse(params.get("subjectId").and_then(|v| v.as_str()));

    let records: Vec<AttendanceRecord> = store::read(&SqliteStore::new(conn))?;
    let scoped = analytics::filter_records(&records, &semester, &subject);
    let summary = analytics::summary(&analytics::records_on(&scoped, day, offset));
    let label = day.format("%Y-%m-%d").to_string();

    send_telegram(state, params, &format_daily_summary(&summary, &label))?;
    Ok(json!({ "success": true, "date": label, "summary": summary }))
}

fn smtp_text(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string", key))),
    }
}

/// SMTP fields from request params. `None` when none of them was sent.
fn smtp_from_params(params: &serde_json::Value) -> Result<Option<SmtpConfig>, HandlerErr> {
    let port = match params.get("smtpPort") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => String::new(),
        Some(v) => setup::parse_smtp_port(v).map_err(HandlerErr::bad_params)?,
    };
    let smtp = SmtpConfig {
        smtp_host: smtp_text(params, "smtpHost")?,
        smtp_port: port,
        smtp_user: smtp_text(params, "smtpUser")?,
        smtp_password: smtp_text(params, "smtpPassword")?,
    };
    if smtp == SmtpConfig::default() {
        return Ok(None);
    }
    Ok(Some(smtp))
}

fn email_test(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let smtp = match smtp_from_params(params)? {
        Some(smtp) => smtp,
        None if state.db.is_some() => {
            let conn = db_conn(state)?;
            setup::email_settings(conn)
                .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
                .smtp
        }
        None => SmtpConfig::default(),
    };
    let receipt = MockEmailRelay.test_connection(&smtp)?;
    Ok(json!({ "success": true, "message": receipt.message }))
}

fn email_send(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = setup::email_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    if !settings.enabled {
        return Err(HandlerErr::new(
            "not_configured",
            "email notifications are not configured",
        ));
    }
    let to = optional_str(params, "to").unwrap_or_default();
    let subject = optional_str(params, "subject").unwrap_or_default();
    let body = optional_str(params, "body").unwrap_or_default();
    let receipt = MockEmailRelay.send(&to, &subject, &body, &settings.smtp)?;
    Ok(json!({
        "success": true,
        "delivered": receipt.delivered,
        "message": receipt.message
    }))
}

fn respond(
    req: &Request,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code, message = %e.message, "integration call failed");
            e.response(&req.id)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "integrations.telegram.test" => telegram_test(state, &req.params),
        "integrations.telegram.notify" => telegram_notify(state, &req.params),
        "integrations.telegram.dailySummary" => telegram_daily_summary(state, &req.params),
        "integrations.email.test" => email_test(state, &req.params),
        "integrations.email.send" => email_send(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
