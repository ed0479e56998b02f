//! Analytics report export: the summary and top of the ranking, written
//! as a JSON document for the presentation layer to render or print.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::analytics::{self, AttendanceSummary, RankingEntry};
use crate::model::{AttendanceRecord, Student};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub semester_id: String,
    pub subject_id: String,
    pub summary: AttendanceSummary,
    pub ranking: Vec<RankingEntry>,
}

/// `records` must already be filtered to `semester_id`/`subject_id`; the
/// ids are only echoed into the report.
pub fn build_report(
    records: &[AttendanceRecord],
    students: &[Student],
    ranking_limit: usize,
    semester_id: &str,
    subject_id: &str,
    generated_at: DateTime<Utc>,
) -> AnalyticsReport {
    AnalyticsReport {
        generated_at,
        semester_id: semester_id.to_string(),
        subject_id: subject_id.to_string(),
        summary: analytics::summary(records),
        ranking: analytics::student_ranking(records, students, ranking_limit),
    }
}

pub fn write_report(out_path: &Path, report: &AnalyticsReport) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let text = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write report {}", out_path.to_string_lossy()))?;
    tracing::info!(
        out = %out_path.display(),
        ranked = report.ranking.len(),
        "analytics report exported"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActiveStatus, AttendanceStatus};
    use chrono::TimeZone;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn student(id: &str) -> Student {
        Student {
            id: id.into(),
            first_name: "Ana".into(),
            last_name: id.into(),
            email: format!("{}@uni.edu", id),
            registration_number: format!("219{}", id),
            career: "Sistemas".into(),
            semester: "2".into(),
            status: ActiveStatus::Active,
        }
    }

    #[test]
    fn report_is_written_as_camel_case_json() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let records = vec![
            AttendanceRecord::new("a", "m", "sem", at, AttendanceStatus::Present, ""),
            AttendanceRecord::new("b", "m", "sem", at, AttendanceStatus::Absent, ""),
        ];
        let students = vec![student("a"), student("b")];
        let report = build_report(&records, &students, 1, "sem", "all", at);
        assert_eq!(report.ranking.len(), 1);
        assert_eq!(report.summary.attendance_rate, 50.0);

        let dir = std::env::temp_dir().join(format!(
            "attendance-report-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let out = dir.join("nested").join("report.json");
        write_report(&out, &report).expect("write report");

        let text = std::fs::read_to_string(&out).expect("read report");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse report");
        assert_eq!(value["semesterId"], "sem");
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["ranking"][0]["studentId"], "a");
        assert_eq!(value["generatedAt"], "2024-03-04T09:00:00Z");

        let _ = std::fs::remove_dir_all(dir);
    }
}
