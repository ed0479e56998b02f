//! Enrollment-form ingestion. Extraction is a stub that returns a fixed
//! form; `apply` turns a reviewed form into student and subject entries.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{ActiveStatus, EnrolledSubject, EnrollmentForm, ScheduleSlot, Student, Subject};
use crate::store::{self, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("no image data provided")]
    EmptyImage,

    #[error("form is missing {0}")]
    IncompleteForm(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollmentError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyImage | Self::IncompleteForm(_) => "bad_params",
            Self::Store(e) => e.code(),
        }
    }
}

fn subject(code: &str, name: &str, classroom: &str) -> EnrolledSubject {
    EnrolledSubject {
        code: code.to_string(),
        name: name.to_string(),
        classroom: classroom.to_string(),
    }
}

fn slot(time: &str, subject: &str, classroom: &str) -> ScheduleSlot {
    ScheduleSlot {
        day: "Monday".to_string(),
        time: time.to_string(),
        subject: subject.to_string(),
        classroom: classroom.to_string(),
    }
}

/// Stands in for OCR: any non-empty image yields the same sample form.
pub fn extract(image: &[u8]) -> Result<EnrollmentForm, EnrollmentError> {
    if image.is_empty() {
        return Err(EnrollmentError::EmptyImage);
    }
    tracing::info!(bytes = image.len(), "enrollment extraction stubbed with sample form");
    Ok(EnrollmentForm {
        registration_number: "219125041".to_string(),
        student_name: "VALDEZ PAYLLO MAILY CELINA".to_string(),
        career: "187-4 INGENIERIA EN SISTEMAS".to_string(),
        semester: "2/2021".to_string(),
        location: "SANTA CRUZ".to_string(),
        subjects: vec![
            subject("MAT202", "Matematicas II", "SB"),
            subject("ECO300", "Economia", "SA"),
            subject("INF310", "Informatica 310", "SX"),
            subject("INF312", "Informatica 312", "SA"),
            subject("MAT302", "Matematicas 302", "SA"),
            subject("ADM320", "Administracion", "SC"),
            subject("INF322", "Informatica 322", "SD"),
        ],
        schedule: vec![
            slot("08:30-09:15", "INF312", "SA"),
            slot("09:15-10:00", "INF312", "SA"),
            slot("10:00-10:45", "MAT302", "SA"),
            slot("10:45-11:30", "MAT302", "SA"),
            slot("11:30-12:15", "INF310", "SX"),
            slot("12:15-13:00", "INF310", "SX"),
            slot("16:45-17:30", "ECO300", "SA"),
            slot("17:30-18:15", "ECO300", "SA"),
        ],
    })
}

/// Forms list surnames first: two surnames, then given names. With fewer
/// than three words only the first is taken as the surname.
pub fn split_student_name(full: &str) -> (String, String) {
    let words: Vec<&str> = full.split_whitespace().collect();
    let surname_words = if words.len() >= 3 { 2 } else { words.len().min(1) };
    let last = words[..surname_words].join(" ");
    let first = words[surname_words..].join(" ");
    (first, last)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    pub student_id: Option<String>,
    pub student_created: bool,
    pub subjects_created: Vec<String>,
    pub subjects_existing: Vec<String>,
}

pub fn apply(
    store: &dyn RecordStore,
    form: &EnrollmentForm,
    email: &str,
) -> Result<ApplySummary, EnrollmentError> {
    if form.registration_number.trim().is_empty() {
        return Err(EnrollmentError::IncompleteForm("registrationNumber"));
    }
    if form.student_name.trim().is_empty() {
        return Err(EnrollmentError::IncompleteForm("studentName"));
    }

    let mut out = ApplySummary::default();

    let mut subjects: Vec<Subject> = store::read(store)?;
    for enrolled in &form.subjects {
        let code = enrolled.code.trim();
        if code.is_empty() {
            continue;
        }
        if subjects.iter().any(|s| s.code.eq_ignore_ascii_case(code)) {
            out.subjects_existing.push(code.to_string());
            continue;
        }
        subjects.push(Subject {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: enrolled.name.trim().to_string(),
            department: String::new(),
            credits: 0,
            hours_per_week: 0,
            description: format!("Classroom {}", enrolled.classroom.trim()),
        });
        out.subjects_created.push(code.to_string());
    }
    if !out.subjects_created.is_empty() {
        store::write(store, &subjects)?;
    }

    let mut students: Vec<Student> = store::read(store)?;
    let registration = form.registration_number.trim();
    match students
        .iter()
        .find(|s| s.registration_number == registration)
    {
        Some(existing) => {
            out.student_id = Some(existing.id.clone());
        }
        None => {
            let (first_name, last_name) = split_student_name(&form.student_name);
            let student = Student {
                id: Uuid::new_v4().to_string(),
                first_name,
                last_name,
                email: email.trim().to_string(),
                registration_number: registration.to_string(),
                career: form.career.trim().to_string(),
                semester: form.semester.trim().to_string(),
                status: ActiveStatus::Active,
            };
            out.student_id = Some(student.id.clone());
            out.student_created = true;
            students.push(student);
            store::write(store, &students)?;
        }
    }

    tracing::info!(
        registration,
        student_created = out.student_created,
        subjects_created = out.subjects_created.len(),
        "enrollment form applied"
    );
    Ok(out)
}
