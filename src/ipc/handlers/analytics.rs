use crate::analytics::{self, IdFilter};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup::{self, AnalyticsSettings};
use crate::ipc::helpers::{optional_str, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::{ActiveStatus, AttendanceRecord, Student, Subject};
use crate::report;
use crate::store::{self, SqliteStore};
use chrono::{FixedOffset, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Summary,
    Trend,
    Subjects,
    Ranking,
    Heatmap,
    Dashboard,
    ExportReport,
}

impl View {
    fn parse(method: &str) -> Option<Self> {
        match method {
            "analytics.summary" => Some(Self::Summary),
            "analytics.trend" => Some(Self::Trend),
            "analytics.subjects" => Some(Self::Subjects),
            "analytics.ranking" => Some(Self::Ranking),
            "analytics.heatmap" => Some(Self::Heatmap),
            "analytics.dashboard" => Some(Self::Dashboard),
            "analytics.exportReport" => Some(Self::ExportReport),
            _ => None,
        }
    }
}

struct AnalyticsInput {
    records: Vec<AttendanceRecord>,
    students: Vec<Student>,
    subjects: Vec<Subject>,
    offset: FixedOffset,
    ranking_limit: usize,
}

fn load_input(conn: &Connection, params: &serde_json::Value) -> Result<AnalyticsInput, HandlerErr> {
    let semester = IdFilter::parse(params.get("semesterId").and_then(|v| v.as_str()));
    let subject = IdFilter::parse(params.get("subjectId").and_then(|v| v.as_str()));
    let settings: AnalyticsSettings = setup::analytics_settings(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let store = SqliteStore::new(conn);
    let all: Vec<AttendanceRecord> = store::read(&store)?;
    Ok(AnalyticsInput {
        records: analytics::filter_records(&all, &semester, &subject),
        students: store::read(&store)?,
        subjects: store::read(&store)?,
        offset: analytics::local_offset(settings.utc_offset_minutes),
        ranking_limit: settings.ranking_limit,
    })
}

fn analytics_view(
    conn: &Connection,
    view: View,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let input = load_input(conn, params)?;
    let records = &input.records;
    let result = match view {
        View::Summary => json!({ "summary": analytics::summary(records) }),
        View::Trend => json!({ "trend": analytics::daily_trend(records, input.offset) }),
        View::Subjects => json!({
            "subjects": analytics::subject_distribution(records, &input.subjects)
        }),
        View::Ranking => json!({
            "ranking": analytics::student_ranking(records, &input.students, input.ranking_limit)
        }),
        View::Heatmap => json!({ "heatmap": analytics::heatmap(records, input.offset) }),
        View::Dashboard => {
            let active_students = input
                .students
                .iter()
                .filter(|s| s.status == ActiveStatus::Active)
                .count();
            json!({
                "summary": analytics::summary(records),
                "trend": analytics::daily_trend(records, input.offset),
                "subjects": analytics::subject_distribution(records, &input.subjects),
                "ranking": analytics::student_ranking(records, &input.students, input.ranking_limit),
                "heatmap": analytics::heatmap(records, input.offset),
                "activeStudents": active_students,
                "subjectCount": input.subjects.len()
            })
        }
        View::ExportReport => export_report(&input, params)?,
    };
    Ok(result)
}

fn export_report(input: &AnalyticsInput, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(required_str(params, "outPath")?);
    let semester_id = optional_str(params, "semesterId").unwrap_or_else(|| "all".to_string());
    let subject_id = optional_str(params, "subjectId").unwrap_or_else(|| "all".to_string());
    let built = report::build_report(
        &input.records,
        &input.students,
        input.ranking_limit,
        &semester_id,
        &subject_id,
        Utc::now(),
    );
    report::write_report(&out_path, &built)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:?}")))?;
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "summary": built.summary,
        "rankingCount": built.ranking.len()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let view = View::parse(&req.method)?;
    Some(with_conn(state, req, |conn, params| analytics_view(conn, view, params)))
}
