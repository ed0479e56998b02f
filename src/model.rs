use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::Collection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }

    /// Present and late both count as attended.
    pub fn is_attended(self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

/// A typed collection member. `missing_fields` lists the form fields that
/// are blank and must be filled before a create or update is accepted.
pub trait Entity: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    /// Keys a create or update must carry with a non-blank value.
    const REQUIRED: &'static [&'static str] = &[];

    fn id(&self) -> &str;

    fn missing_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Expected-but-unenforced invariants that a save should warn about.
    fn integrity_warnings(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

fn blank(fields: &[(&'static str, &str)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub registration_number: String,
    pub career: String,
    pub semester: String,
    #[serde(default)]
    pub status: ActiveStatus,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for Student {
    const COLLECTION: Collection = Collection::Students;
    const REQUIRED: &'static [&'static str] = &[
        "firstName",
        "lastName",
        "email",
        "registrationNumber",
        "career",
        "semester",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        blank(&[
            ("firstName", self.first_name.as_str()),
            ("lastName", self.last_name.as_str()),
            ("email", self.email.as_str()),
            ("registrationNumber", self.registration_number.as_str()),
            ("career", self.career.as_str()),
            ("semester", self.semester.as_str()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Teacher {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub employee_id: String,
    pub department: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub status: ActiveStatus,
}

impl Entity for Teacher {
    const COLLECTION: Collection = Collection::Teachers;
    const REQUIRED: &'static [&'static str] =
        &["firstName", "lastName", "email", "employeeId", "department"];

    fn id(&self) -> &str {
        &self.id
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        blank(&[
            ("firstName", self.first_name.as_str()),
            ("lastName", self.last_name.as_str()),
            ("email", self.email.as_str()),
            ("employeeId", self.employee_id.as_str()),
            ("department", self.department.as_str()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub credits: u32,
    #[serde(default)]
    pub hours_per_week: u32,
    #[serde(default)]
    pub description: String,
}

impl Entity for Subject {
    const COLLECTION: Collection = Collection::Subjects;
    const REQUIRED: &'static [&'static str] = &["code", "name"];

    fn id(&self) -> &str {
        &self.id
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        blank(&[("code", self.code.as_str()), ("name", self.name.as_str())])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Semester {
    pub id: String,
    pub name: String,
    pub year: i32,
    /// Conventionally "1" or "2".
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: ActiveStatus,
}

impl Semester {
    pub fn has_valid_range(&self) -> bool {
        self.start_date <= self.end_date
    }
}

impl Entity for Semester {
    const COLLECTION: Collection = Collection::Semesters;
    const REQUIRED: &'static [&'static str] = &["name", "year", "period", "startDate", "endDate"];

    fn id(&self) -> &str {
        &self.id
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        blank(&[("name", self.name.as_str()), ("period", self.period.as_str())])
    }

    fn integrity_warnings(&self) -> Vec<&'static str> {
        if self.has_valid_range() {
            Vec::new()
        } else {
            vec!["startDate is after endDate"]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub semester_id: String,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: String,
}

impl AttendanceRecord {
    pub fn new(
        student_id: &str,
        subject_id: &str,
        semester_id: &str,
        date: DateTime<Utc>,
        status: AttendanceStatus,
        notes: &str,
    ) -> Self {
        Self {
            id: record_id(student_id, subject_id, date),
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            semester_id: semester_id.to_string(),
            date,
            status,
            notes: notes.to_string(),
        }
    }
}

impl Entity for AttendanceRecord {
    const COLLECTION: Collection = Collection::AttendanceRecords;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Canonical timestamp rendering used inside record ids.
pub fn render_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Same student, subject and instant always yield the same id, so a
/// re-saved sheet overwrites instead of duplicating.
pub fn record_id(student_id: &str, subject_id: &str, date: DateTime<Utc>) -> String {
    format!("{}-{}-{}", student_id, subject_id, render_timestamp(date))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledSubject {
    pub code: String,
    pub name: String,
    pub classroom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: String,
    pub time: String,
    pub subject: String,
    pub classroom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentForm {
    pub registration_number: String,
    pub student_name: String,
    pub career: String,
    pub semester: String,
    pub location: String,
    pub subjects: Vec<EnrolledSubject>,
    pub schedule: Vec<ScheduleSlot>,
}
