//! Outbound notification relay.
//!
//! Telegram messages are a single Bot API call with no retry. Email is a
//! mock: parameters are validated and a receipt is returned, but nothing is
//! delivered.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::analytics::AttendanceSummary;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

pub const TELEGRAM_TEST_MESSAGE: &str = "✅ Connection test succeeded!\n\nAttendance notifications are working.";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParams(Vec<&'static str>),

    #[error("{0}")]
    Remote(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParams(_) => "bad_params",
            Self::Remote(_) | Self::Network(_) => "relay_failed",
        }
    }
}

fn require(fields: &[(&'static str, &str)]) -> Result<(), RelayError> {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RelayError::MissingParams(missing))
    }
}

#[derive(Debug, Deserialize)]
struct TelegramFailure {
    description: Option<String>,
}

pub struct TelegramRelay {
    api_base: String,
    client: Client,
}

impl TelegramRelay {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Sends `message` with Markdown parse mode. A non-2xx reply surfaces
    /// the Bot API's `description` when it has one.
    pub fn send(&self, bot_token: &str, chat_id: &str, message: &str) -> Result<(), RelayError> {
        require(&[("botToken", bot_token), ("chatId", chat_id), ("message", message)])?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": message,
                "parse_mode": "Markdown",
            }))
            .send()?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(chat_id, "telegram message sent");
            return Ok(());
        }
        let description = response
            .json::<TelegramFailure>()
            .ok()
            .and_then(|f| f.description)
            .unwrap_or_else(|| "Failed to send message".to_string());
        tracing::warn!(chat_id, %status, %description, "telegram relay rejected message");
        Err(RelayError::Remote(description))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: String,
    pub smtp_user: String,
    pub smtp_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReceipt {
    pub delivered: bool,
    pub message: String,
}

pub struct MockEmailRelay;

impl MockEmailRelay {
    pub fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        smtp: &SmtpConfig,
    ) -> Result<EmailReceipt, RelayError> {
        require(&[("to", to), ("subject", subject), ("body", body)])?;
        tracing::info!(to, subject, smtp_host = %smtp.smtp_host, "email send mocked");
        Ok(EmailReceipt {
            delivered: false,
            message: "Email accepted (mock relay, nothing was delivered)".to_string(),
        })
    }

    pub fn test_connection(&self, smtp: &SmtpConfig) -> Result<EmailReceipt, RelayError> {
        require(&[
            ("smtpHost", smtp.smtp_host.as_str()),
            ("smtpPort", smtp.smtp_port.as_str()),
            ("smtpUser", smtp.smtp_user.as_str()),
            ("smtpPassword", smtp.smtp_password.as_str()),
        ])?;
        Ok(EmailReceipt {
            delivered: false,
            message: "SMTP configuration validated (mock relay)".to_string(),
        })
    }
}

pub fn format_absence_notification(student_name: &str, subject: &str, date: &str) -> String {
    format!(
        "🚨 *Absence Notice*\n\n👤 Student: {}\n📚 Subject: {}\n📅 Date: {}\n\nThe student was marked absent.",
        student_name, subject, date
    )
}

/// Daily tallies in the same Markdown register as the absence notice.
pub fn format_daily_summary(summary: &AttendanceSummary, date: &str) -> String {
    format!(
        "📊 *Daily Attendance Summary*\n\n📅 Date: {}\n\n✅ Present: {}\n❌ Absent: {}\n⏰ Late: {}\n📝 Excused: {}\n\n📈 Attendance rate: {:.1}%",
        date,
        summary.present,
        summary.absent,
        summary.late,
        summary.excused,
        summary.attendance_rate
    )
}

pub struct AbsenceEmail {
    pub subject: String,
    pub body: String,
}

pub fn format_absence_email(student_name: &str, subject_name: &str, date: &str) -> AbsenceEmail {
    AbsenceEmail {
        subject: format!("Absence Alert - {}", student_name),
        body: format!(
            "<html><body><h2>Absence Notice</h2>\
             <p>The student <strong>{}</strong> was marked absent in <strong>{}</strong> on <strong>{}</strong>.</p>\
             <p>If the absence was excused, please contact the administration.</p></body></html>",
            student_name, subject_name, date
        ),
    }
}
