use crate::analytics::DEFAULT_RANKING_LIMIT;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::relay::SmtpConfig;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Telegram,
    Email,
    Analytics,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "telegram" => Some(Self::Telegram),
            "email" => Some(Self::Email),
            "analytics" => Some(Self::Analytics),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Telegram => "setup.telegram",
            Self::Email => "setup.email",
            Self::Analytics => "setup.analytics",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Telegram => json!({
            "enabled": false,
            "botToken": "",
            "chatId": ""
        }),
        SetupSection::Email => json!({
            "enabled": false,
            "smtpHost": "",
            "smtpPort": "587",
            "smtpUser": "",
            "smtpPassword": ""
        }),
        SetupSection::Analytics => json!({
            "utcOffsetMinutes": 0,
            "rankingLimit": DEFAULT_RANKING_LIMIT
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Accepts either 587 or "587"; the port is kept as text like the form field.
pub fn parse_smtp_port(v: &Value) -> Result<String, String> {
    let key = "smtpPort";
    match v {
        Value::Number(_) => Ok(parse_i64_range(v, key, 1, 65535)?.to_string()),
        _ => {
            let s = parse_string_max(v, key, 5)?;
            let n = s
                .parse::<i64>()
                .map_err(|_| format!("{} must be numeric", key))?;
            Ok(parse_i64_range(&Value::from(n), key, 1, 65535)?.to_string())
        }
    }
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Telegram => match k.as_str() {
                "enabled" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "botToken" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 128)?));
                }
                "chatId" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 64)?));
                }
                _ => return Err(format!("unknown telegram field: {}", k)),
            },
            SetupSection::Email => match k.as_str() {
                "enabled" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "smtpHost" | "smtpUser" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                "smtpPort" => {
                    obj.insert(k.clone(), Value::String(parse_smtp_port(v)?));
                }
                "smtpPassword" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 200)?));
                }
                _ => return Err(format!("unknown email field: {}", k)),
            },
            SetupSection::Analytics => match k.as_str() {
                "utcOffsetMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, -720, 840)?));
                }
                "rankingLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50)?));
                }
                _ => return Err(format!("unknown analytics field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values fall back to defaults as a whole.
            let mut merged = current.clone();
            match merge_section_patch(section, &mut merged, saved_obj) {
                Ok(()) => current = merged,
                Err(reason) => tracing::warn!(
                    section = section.key(),
                    %reason,
                    "stored settings are invalid, using defaults"
                ),
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    pub enabled: bool,
    #[serde(flatten)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSettings {
    pub utc_offset_minutes: i32,
    pub ranking_limit: usize,
}

pub fn telegram_settings(conn: &rusqlite::Connection) -> anyhow::Result<TelegramSettings> {
    Ok(serde_json::from_value(load_section(conn, SetupSection::Telegram)?)?)
}

pub fn email_settings(conn: &rusqlite::Connection) -> anyhow::Result<EmailSettings> {
    Ok(serde_json::from_value(load_section(conn, SetupSection::Email)?)?)
}

pub fn analytics_settings(conn: &rusqlite::Connection) -> anyhow::Result<AnalyticsSettings> {
    Ok(serde_json::from_value(load_section(conn, SetupSection::Analytics)?)?)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let telegram = match load_section(conn, SetupSection::Telegram) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let email = match load_section(conn, SetupSection::Email) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let analytics = match load_section(conn, SetupSection::Analytics) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "telegram": telegram,
            "email": email,
            "analytics": analytics
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section_raw, "settings updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
