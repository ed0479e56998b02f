use crate::analytics::{self, IdFilter};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{optional_bool, optional_str, required_str, with_conn};
use crate::ipc::types::{AppState, RelayConfig, Request};
use crate::model::{ActiveStatus, AttendanceRecord, AttendanceStatus, Semester, Student, Subject};
use crate::relay::{format_absence_email, format_absence_notification, MockEmailRelay, TelegramRelay};
use crate::store::{self, SqliteStore};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, HandlerErr> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| HandlerErr::bad_params("date must be an RFC 3339 timestamp"))
}

fn parse_marks(params: &serde_json::Value) -> Result<HashMap<String, AttendanceStatus>, HandlerErr> {
    let Some(raw) = params.get("marks") else {
        return Ok(HashMap::new());
    };
    if raw.is_null() {
        return Ok(HashMap::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err(HandlerErr::bad_params("marks must be an object of studentId -> status"));
    };
    let mut out = HashMap::new();
    for (student_id, v) in obj {
        let status = v
            .as_str()
            .and_then(AttendanceStatus::parse)
            .ok_or_else(|| {
                HandlerErr::bad_params(format!(
                    "marks.{} must be one of: present, absent, late, excused",
                    student_id
                ))
            })?;
        out.insert(student_id.clone(), status);
    }
    Ok(out)
}

/// Subject code, or the raw id when the subject no longer exists.
pub fn subject_label(subjects: &[Subject], subject_id: &str) -> String {
    subjects
        .iter()
        .find(|s| s.id == subject_id)
        .map(|s| s.code.clone())
        .unwrap_or_else(|| subject_id.to_string())
}

fn student_label(students: &[Student], student_id: &str) -> String {
    students
        .iter()
        .find(|s| s.id == student_id)
        .map(Student::display_name)
        .unwrap_or_else(|| student_id.to_string())
}

fn semester_label(semesters: &[Semester], semester_id: &str) -> String {
    semesters
        .iter()
        .find(|s| s.id == semester_id)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| semester_id.to_string())
}

fn active_students(students: Vec<Student>) -> Vec<Student> {
    students
        .into_iter()
        .filter(|s| s.status == ActiveStatus::Active)
        .collect()
}

fn attendance_sheet_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let semester_id = required_str(params, "semesterId")?;
    let store = SqliteStore::new(conn);
    let students = active_students(store::read(&store)?);
    let subjects: Vec<Subject> = store::read(&store)?;
    let semesters: Vec<Semester> = store::read(&store)?;

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "displayName": s.display_name(),
                "registrationNumber": s.registration_number,
                "career": s.career,
                "status": AttendanceStatus::Absent.as_str()
            })
        })
        .collect();

    Ok(json!({
        "subjectId": subject_id,
        "subjectLabel": subject_label(&subjects, &subject_id),
        "semesterId": semester_id,
        "semesterLabel": semester_label(&semesters, &semester_id),
        "rows": rows,
        "stats": { "present": 0, "absent": rows.len(), "late": 0, "excused": 0 }
    }))
}

fn notify_telegram(
    conn: &Connection,
    relay_cfg: &RelayConfig,
    absent: &[&Student],
    subject: &str,
    date: &str,
) -> serde_json::Value {
    let settings = match setup::telegram_settings(conn) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "could not load telegram settings");
            return json!({ "attempted": false, "reason": "telegram settings unavailable" });
        }
    };
    if !settings.is_configured() {
        return json!({ "attempted": false, "reason": "telegram not configured" });
    }
    let relay = match TelegramRelay::new(&relay_cfg.telegram_api_base, relay_cfg.timeout) {
        Ok(r) => r,
        Err(e) => return json!({ "attempted": false, "reason": e.to_string() }),
    };

    let mut sent = 0usize;
    let mut failures: Vec<serde_json::Value> = Vec::new();
    for student in absent {
        let message = format_absence_notification(&student.display_name(), subject, date);
        match relay.send(&settings.bot_token, &settings.chat_id, &message) {
            Ok(()) => sent += 1,
            Err(e) => failures.push(json!({ "studentId": student.id, "error": e.to_string() })),
        }
    }
    json!({ "attempted": true, "sent": sent, "failed": failures })
}

/// One mock email per absent student, addressed to the student's own email.
fn notify_email(conn: &Connection, absent: &[&Student], subject: &str, date: &str) -> serde_json::Value {
    let settings = match setup::email_settings(conn) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "could not load email settings");
            return json!({ "attempted": false, "reason": "email settings unavailable" });
        }
    };
    if !settings.enabled {
        return json!({ "attempted": false, "reason": "email not configured" });
    }

    let mut sent = 0usize;
    let mut failures: Vec<serde_json::Value> = Vec::new();
    for student in absent {
        let mail = format_absence_email(&student.display_name(), subject, date);
        match MockEmailRelay.send(&student.email, &mail.subject, &mail.body, &settings.smtp) {
            Ok(_) => sent += 1,
            Err(e) => failures.push(json!({ "studentId": student.id, "error": e.to_string() })),
        }
    }
    json!({ "attempted": true, "sent": sent, "failed": failures })
}

/// One record per active student, absent unless marked otherwise. Records
/// are merged by id, so saving the same sheet twice changes nothing.
fn attendance_save(
    conn: &Connection,
    relay_cfg: &RelayConfig,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let semester_id = required_str(params, "semesterId")?;
    let date = parse_timestamp(&required_str(params, "date")?)?;
    let marks = parse_marks(params)?;
    let notes = optional_str(params, "notes").unwrap_or_default();
    let notify = optional_bool(params, "notifyAbsences")?;

    let store = SqliteStore::new(conn);
    let students = active_students(store::read(&store)?);
    let batch: Vec<AttendanceRecord> = students
        .iter()
        .map(|s| {
            let status = marks.get(&s.id).copied().unwrap_or(AttendanceStatus::Absent);
            AttendanceRecord::new(&s.id, &subject_id, &semester_id, date, status, &notes)
        })
        .collect();
    let ignored: Vec<&String> = marks
        .keys()
        .filter(|id| !students.iter().any(|s| &s.id == *id))
        .collect();
    if !ignored.is_empty() {
        tracing::warn!(count = ignored.len(), "marks for unknown or inactive students ignored");
    }

    let stats = analytics::summary(&batch);
    let saved = batch.len();
    let mut records: Vec<AttendanceRecord> = store::read(&store)?;
    let replaced = store::merge_by_id(&mut records, batch);
    store::write(&store, &records)?;
    tracing::info!(
        subject = %subject_id,
        semester = %semester_id,
        saved,
        replaced,
        "attendance sheet saved"
    );

    let notifications = if notify {
        let subjects: Vec<Subject> = store::read(&store)?;
        let absent: Vec<&Student> = students
            .iter()
            .filter(|s| marks.get(&s.id).copied().unwrap_or(AttendanceStatus::Absent) == AttendanceStatus::Absent)
            .collect();
        let subject = subject_label(&subjects, &subject_id);
        let day = date.format("%Y-%m-%d").to_string();
        json!({
            "telegram": notify_telegram(conn, relay_cfg, &absent, &subject, &day),
            "email": notify_email(conn, &absent, &subject, &day)
        })
    } else {
        serde_json::Value::Null
    };

    Ok(json!({
        "saved": saved,
        "replaced": replaced,
        "total": records.len(),
        "ignoredMarks": ignored,
        "stats": {
            "present": stats.present,
            "absent": stats.absent,
            "late": stats.late,
            "excused": stats.excused
        },
        "notifications": notifications
    }))
}

fn attendance_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let search = optional_str(params, "search").map(|s| s.to_lowercase());
    let subject = IdFilter::parse(params.get("subjectId").and_then(|v| v.as_str()));
    let status = match optional_str(params, "status").as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(AttendanceStatus::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("status must be one of: all, present, absent, late, excused")
        })?),
    };

    let store = SqliteStore::new(conn);
    let records: Vec<AttendanceRecord> = store::read(&store)?;
    let students: Vec<Student> = store::read(&store)?;
    let subjects: Vec<Subject> = store::read(&store)?;

    let mut matched: Vec<AttendanceRecord> = analytics::filter_records(&records, &IdFilter::All, &subject)
        .into_iter()
        .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
        .filter(|r| {
            let Some(q) = search.as_deref() else {
                return true;
            };
            r.student_id.to_lowercase().contains(q)
                || student_label(&students, &r.student_id).to_lowercase().contains(q)
        })
        .collect();
    matched.sort_by(|a, b| b.date.cmp(&a.date));

    let rows: Vec<serde_json::Value> = matched
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "studentId": r.student_id,
                "studentLabel": student_label(&students, &r.student_id),
                "subjectId": r.subject_id,
                "subjectLabel": subject_label(&subjects, &r.subject_id),
                "semesterId": r.semester_id,
                "date": r.date,
                "status": r.status,
                "notes": r.notes
            })
        })
        .collect();
    Ok(json!({ "records": rows }))
}

fn handle_attendance_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let relay_cfg = state.relay.clone();
    with_conn(state, req, |conn, params| attendance_save(conn, &relay_cfg, params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sheetOpen" => Some(with_conn(state, req, attendance_sheet_open)),
        "attendance.save" => Some(handle_attendance_save(state, req)),
        "attendance.history" => Some(with_conn(state, req, attendance_history)),
        _ => None,
    }
}
