use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Relay endpoints fixed at startup from the command line.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub telegram_api_base: String,
    pub timeout: Duration,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub relay: RelayConfig,
}
