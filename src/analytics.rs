//! Attendance aggregation: the derived views behind the analytics screens.
//!
//! Every function here is pure and total. Empty or inconsistent input yields
//! zeros and empty collections, and a record pointing at a student or subject
//! that no longer exists falls back to its raw id instead of failing.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{AttendanceRecord, AttendanceStatus, Student, Subject};

pub const TREND_DAYS: usize = 7;
pub const DEFAULT_RANKING_LIMIT: usize = 10;
pub const HEATMAP_FIRST_HOUR: u32 = 7;
pub const HEATMAP_LAST_HOUR: u32 = 18;
pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// `Int(10*x + 0.5) / 10`, i.e. one decimal with halves rounded up.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn percent(attended: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * attended as f64 / total as f64)
}

/// Resolves the offset used for calendar dates and heatmap cells.
/// Out-of-range values fall back to UTC.
pub fn local_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn local(date: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    date.with_timezone(&offset)
}

/// Semester or subject selector; `"all"` and absent both mean no filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdFilter {
    All,
    Only(String),
}

impl IdFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Self::All,
            Some(id) => Self::Only(id.to_string()),
        }
    }

    fn matches(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(want) => want == id,
        }
    }
}

pub fn filter_records(
    records: &[AttendanceRecord],
    semester: &IdFilter,
    subject: &IdFilter,
) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|r| semester.matches(&r.semester_id) && subject.matches(&r.subject_id))
        .cloned()
        .collect()
}

/// Records whose local calendar date is `day`.
pub fn records_on(records: &[AttendanceRecord], day: NaiveDate, offset: FixedOffset) -> Vec<AttendanceRecord> {
    records
        .iter()
        .filter(|r| local(r.date, offset).date_naive() == day)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    pub attended: usize,
    /// Percentage with one decimal, 0.0 for an empty set.
    pub attendance_rate: f64,
}

pub fn summary(records: &[AttendanceRecord]) -> AttendanceSummary {
    let mut out = AttendanceSummary::default();
    for r in records {
        out.total += 1;
        match r.status {
            AttendanceStatus::Present => out.present += 1,
            AttendanceStatus::Absent => out.absent += 1,
            AttendanceStatus::Late => out.late += 1,
            AttendanceStatus::Excused => out.excused += 1,
        }
    }
    out.attended = out.present + out.late;
    out.attendance_rate = percent(out.attended, out.total);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub date: String,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
}

impl TrendBucket {
    fn new(day: NaiveDate) -> Self {
        Self {
            date: day.format("%Y-%m-%d").to_string(),
            present: 0,
            absent: 0,
            late: 0,
            excused: 0,
        }
    }

    fn tally(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
        }
    }
}

/// Per-day status tallies for the most recent `TREND_DAYS` calendar days
/// that have records, oldest first. Input order does not matter.
pub fn daily_trend(records: &[AttendanceRecord], offset: FixedOffset) -> Vec<TrendBucket> {
    let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let mut buckets: Vec<TrendBucket> = Vec::new();
    let mut by_day: HashMap<NaiveDate, usize> = HashMap::new();
    for r in sorted {
        let day = local(r.date, offset).date_naive();
        let idx = *by_day.entry(day).or_insert_with(|| {
            buckets.push(TrendBucket::new(day));
            buckets.len() - 1
        });
        buckets[idx].tally(r.status);
    }

    let keep_from = buckets.len().saturating_sub(TREND_DAYS);
    buckets.split_off(keep_from)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSlice {
    pub name: String,
    pub value: usize,
}

/// Attended counts per subject code, in first-seen order. Raw counts only.
pub fn subject_distribution(records: &[AttendanceRecord], subjects: &[Subject]) -> Vec<SubjectSlice> {
    let codes: HashMap<&str, &str> = subjects
        .iter()
        .map(|s| (s.id.as_str(), s.code.as_str()))
        .collect();

    let mut slices: Vec<SubjectSlice> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for r in records {
        let name = codes
            .get(r.subject_id.as_str())
            .copied()
            .unwrap_or(r.subject_id.as_str());
        let idx = match by_name.get(name) {
            Some(&i) => i,
            None => {
                slices.push(SubjectSlice {
                    name: name.to_string(),
                    value: 0,
                });
                by_name.insert(name.to_string(), slices.len() - 1);
                slices.len() - 1
            }
        };
        if r.status.is_attended() {
            slices[idx].value += 1;
        }
    }
    slices
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub student_id: String,
    pub display_name: String,
    pub registration_number: String,
    pub attended: usize,
    pub total: usize,
    pub rate: f64,
}

fn compare_ranking(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    // Cross-multiplied so equal ratios compare equal without float noise.
    let by_rate = (b.attended * a.total).cmp(&(a.attended * b.total));
    by_rate
        .then_with(|| b.attended.cmp(&a.attended))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Highest attendance rate first. Equal rates order by attended count
/// (more first) and then by student id. Records whose student is unknown
/// are left out.
pub fn student_ranking(
    records: &[AttendanceRecord],
    students: &[Student],
    limit: usize,
) -> Vec<RankingEntry> {
    let lookup: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut rows: Vec<RankingEntry> = Vec::new();
    let mut by_student: HashMap<&str, usize> = HashMap::new();
    for r in records {
        let Some(student) = lookup.get(r.student_id.as_str()) else {
            continue;
        };
        let idx = *by_student.entry(student.id.as_str()).or_insert_with(|| {
            rows.push(RankingEntry {
                student_id: student.id.clone(),
                display_name: student.display_name(),
                registration_number: student.registration_number.clone(),
                attended: 0,
                total: 0,
                rate: 0.0,
            });
            rows.len() - 1
        });
        rows[idx].total += 1;
        if r.status.is_attended() {
            rows[idx].attended += 1;
        }
    }

    for row in rows.iter_mut() {
        row.rate = percent(row.attended, row.total);
    }
    rows.sort_by(compare_ranking);
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatBand {
    Empty,
    Low,
    Medium,
    High,
    Peak,
}

/// Presentation bands; each upper bound is inclusive (5 is still `Low`).
pub fn heat_band(count: u32) -> HeatBand {
    match count {
        0 => HeatBand::Empty,
        1..=5 => HeatBand::Low,
        6..=10 => HeatBand::Medium,
        11..=15 => HeatBand::High,
        _ => HeatBand::Peak,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub days: Vec<&'static str>,
    pub hours: Vec<u32>,
    /// `cells[day][hour - HEATMAP_FIRST_HOUR]`, Monday first.
    pub cells: Vec<Vec<u32>>,
    pub bands: Vec<Vec<HeatBand>>,
}

impl Heatmap {
    pub fn cell(&self, weekday: chrono::Weekday, hour: u32) -> u32 {
        if !(HEATMAP_FIRST_HOUR..=HEATMAP_LAST_HOUR).contains(&hour) {
            return 0;
        }
        self.cells[weekday.num_days_from_monday() as usize][(hour - HEATMAP_FIRST_HOUR) as usize]
    }
}

/// Attended records per weekday and hour of day, 07:00 through 18:00.
/// Records outside that window are not placed in any cell.
pub fn heatmap(records: &[AttendanceRecord], offset: FixedOffset) -> Heatmap {
    let width = (HEATMAP_LAST_HOUR - HEATMAP_FIRST_HOUR + 1) as usize;
    let mut cells = vec![vec![0u32; width]; WEEKDAY_LABELS.len()];

    for r in records.iter().filter(|r| r.status.is_attended()) {
        let at = local(r.date, offset);
        let hour = at.hour();
        if !(HEATMAP_FIRST_HOUR..=HEATMAP_LAST_HOUR).contains(&hour) {
            continue;
        }
        let day = at.weekday().num_days_from_monday() as usize;
        cells[day][(hour - HEATMAP_FIRST_HOUR) as usize] += 1;
    }

    let bands = cells
        .iter()
        .map(|row| row.iter().copied().map(heat_band).collect())
        .collect();
    Heatmap {
        days: WEEKDAY_LABELS.to_vec(),
        hours: (HEATMAP_FIRST_HOUR..=HEATMAP_LAST_HOUR).collect(),
        cells,
        bands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActiveStatus;
    use chrono::{TimeZone, Weekday};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn rec(student: &str, subject: &str, date: DateTime<Utc>, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord::new(student, subject, "sem1", date, status, "")
    }

    fn student(id: &str, first: &str) -> Student {
        Student {
            id: id.into(),
            first_name: first.into(),
            last_name: "Test".into(),
            email: format!("{}@uni.edu", id),
            registration_number: format!("2191{}", id),
            career: "Sistemas".into(),
            semester: "2".into(),
            status: ActiveStatus::Active,
        }
    }

    fn utc() -> FixedOffset {
        local_offset(0)
    }

    #[test]
    fn round_off_rounds_halves_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(66.666), 66.7);
        assert_eq!(round_off_1_decimal(0.25), 0.3);
        assert_eq!(round_off_1_decimal(0.24), 0.2);
    }

    #[test]
    fn summary_rate_counts_present_and_late() {
        use AttendanceStatus::*;
        let day = at(2024, 3, 4, 9);
        let statuses = [Present, Present, Present, Late, Absent, Absent];
        let records: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| rec(&format!("s{}", i), "m", day, *s))
            .collect();
        let s = summary(&records);
        assert_eq!(s.total, 6);
        assert_eq!(s.attended, 4);
        assert_eq!(s.excused, 0);
        assert_eq!(s.attendance_rate, 66.7);
    }

    #[test]
    fn summary_rate_is_zero_for_empty_input() {
        let s = summary(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.attendance_rate, 0.0);
    }

    #[test]
    fn summary_rate_stays_within_bounds() {
        use AttendanceStatus::*;
        let day = at(2024, 3, 4, 9);
        for statuses in [vec![Present, Late], vec![Absent, Excused], vec![Late, Absent, Excused]] {
            let records: Vec<_> = statuses.iter().map(|s| rec("s", "m", day, *s)).collect();
            let rate = summary(&records).attendance_rate;
            assert!((0.0..=100.0).contains(&rate), "rate {} out of range", rate);
        }
    }

    #[test]
    fn trend_keeps_last_seven_days_in_order() {
        let records: Vec<_> = (1..=9)
            .map(|d| rec("s1", "m", at(2024, 3, d, 9), AttendanceStatus::Present))
            .collect();
        let trend = daily_trend(&records, utc());
        let dates: Vec<_> = trend.iter().map(|b| b.date.as_str()).collect();
        assert_eq!(
            dates,
            vec![
                "2024-03-03", "2024-03-04", "2024-03-05", "2024-03-06", "2024-03-07",
                "2024-03-08", "2024-03-09"
            ]
        );
    }

    #[test]
    fn trend_sorts_unordered_input_before_truncating() {
        let mut records: Vec<_> = (1..=9)
            .map(|d| rec("s1", "m", at(2024, 3, d, 9), AttendanceStatus::Present))
            .collect();
        records.reverse();
        let trend = daily_trend(&records, utc());
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[0].date, "2024-03-03");
        assert_eq!(trend[6].date, "2024-03-09");
    }

    #[test]
    fn trend_tallies_each_status_per_day() {
        use AttendanceStatus::*;
        let records = vec![
            rec("a", "m", at(2024, 3, 4, 8), Present),
            rec("b", "m", at(2024, 3, 4, 10), Late),
            rec("c", "m", at(2024, 3, 4, 11), Absent),
            rec("d", "m", at(2024, 3, 4, 12), Excused),
            rec("a", "m", at(2024, 3, 5, 8), Absent),
        ];
        let trend = daily_trend(&records, utc());
        assert_eq!(trend.len(), 2);
        assert_eq!((trend[0].present, trend[0].late, trend[0].absent, trend[0].excused), (1, 1, 1, 1));
        assert_eq!(trend[1].absent, 1);
    }

    #[test]
    fn trend_buckets_by_local_calendar_date() {
        // 02:00 UTC on the 5th is still the 4th at UTC-05:00.
        let records = vec![
            rec("a", "m", at(2024, 3, 4, 20), AttendanceStatus::Present),
            rec("b", "m", at(2024, 3, 5, 2), AttendanceStatus::Present),
        ];
        assert_eq!(daily_trend(&records, utc()).len(), 2);
        let shifted = daily_trend(&records, local_offset(-300));
        assert_eq!(shifted.len(), 1);
        assert_eq!(shifted[0].date, "2024-03-04");
        assert_eq!(shifted[0].present, 2);
    }

    #[test]
    fn distribution_counts_only_attended_records() {
        use AttendanceStatus::*;
        let subjects = vec![Subject {
            id: "m1".into(),
            code: "MAT202".into(),
            name: "Matematicas II".into(),
            department: String::new(),
            credits: 5,
            hours_per_week: 4,
            description: String::new(),
        }];
        let day = at(2024, 3, 4, 9);
        let records = vec![
            rec("a", "m1", day, Present),
            rec("b", "m1", day, Present),
            rec("c", "m1", day, Absent),
            rec("a", "gone", day, Absent),
        ];
        let dist = subject_distribution(&records, &subjects);
        assert_eq!(
            dist,
            vec![
                SubjectSlice { name: "MAT202".into(), value: 2 },
                SubjectSlice { name: "gone".into(), value: 0 },
            ]
        );
    }

    #[test]
    fn ranking_orders_by_rate_and_skips_unknown_students() {
        use AttendanceStatus::*;
        let students = vec![student("b", "Beto"), student("a", "Ana")];
        let records = vec![
            rec("b", "m", at(2024, 3, 4, 9), Present),
            rec("b", "m", at(2024, 3, 5, 9), Absent),
            rec("a", "m", at(2024, 3, 4, 9), Present),
            rec("a", "m", at(2024, 3, 5, 9), Late),
            rec("ghost", "m", at(2024, 3, 5, 9), Present),
        ];
        let ranking = student_ranking(&records, &students, DEFAULT_RANKING_LIMIT);
        let ids: Vec<_> = ranking.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(ranking[0].rate, 100.0);
        assert_eq!(ranking[1].rate, 50.0);
        assert_eq!(ranking[0].display_name, "Ana Test");
    }

    #[test]
    fn ranking_is_empty_without_records() {
        let students = vec![student("a", "Ana")];
        assert!(student_ranking(&[], &students, DEFAULT_RANKING_LIMIT).is_empty());
    }

    #[test]
    fn ranking_ties_break_on_attended_then_id() {
        use AttendanceStatus::*;
        let students = vec![student("c", "C"), student("b", "B"), student("a", "A")];
        let d1 = at(2024, 3, 4, 9);
        let d2 = at(2024, 3, 5, 9);
        let records = vec![
            rec("c", "m", d1, Present),
            rec("b", "m", d1, Present),
            rec("a", "m", d1, Present),
            rec("a", "m", d2, Present),
        ];
        let ids: Vec<_> = student_ranking(&records, &students, 10)
            .into_iter()
            .map(|r| r.student_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn ranking_truncates_to_limit() {
        let students: Vec<_> = (0..12).map(|i| student(&format!("s{:02}", i), "X")).collect();
        let records: Vec<_> = students
            .iter()
            .map(|s| rec(&s.id, "m", at(2024, 3, 4, 9), AttendanceStatus::Present))
            .collect();
        assert_eq!(student_ranking(&records, &students, DEFAULT_RANKING_LIMIT).len(), 10);
    }

    #[test]
    fn heatmap_places_attended_records_by_weekday_and_hour() {
        use AttendanceStatus::*;
        // 2024-03-04 is a Monday.
        let records = vec![
            rec("a", "m", at(2024, 3, 4, 9), Present),
            rec("b", "m", at(2024, 3, 4, 9), Late),
            rec("c", "m", at(2024, 3, 4, 9), Absent),
            rec("d", "m", at(2024, 3, 4, 19), Present),
            rec("e", "m", at(2024, 3, 10, 7), Present),
        ];
        let map = heatmap(&records, utc());
        assert_eq!(map.cell(Weekday::Mon, 9), 2);
        assert_eq!(map.cell(Weekday::Sun, 7), 1);
        let placed: u32 = map.cells.iter().flatten().sum();
        assert_eq!(placed, 3);
        assert_eq!(map.hours.first(), Some(&7));
        assert_eq!(map.hours.last(), Some(&18));
        assert_eq!(map.days[0], "Mon");

        // The 19:00 record still counts toward the overall rate.
        assert_eq!(summary(&records).attended, 4);
    }

    #[test]
    fn heat_band_upper_bounds_are_inclusive() {
        assert_eq!(heat_band(0), HeatBand::Empty);
        assert_eq!(heat_band(1), HeatBand::Low);
        assert_eq!(heat_band(5), HeatBand::Low);
        assert_eq!(heat_band(6), HeatBand::Medium);
        assert_eq!(heat_band(10), HeatBand::Medium);
        assert_eq!(heat_band(11), HeatBand::High);
        assert_eq!(heat_band(15), HeatBand::High);
        assert_eq!(heat_band(16), HeatBand::Peak);
    }

    #[test]
    fn records_on_uses_the_local_calendar_date() {
        let records = vec![
            rec("a", "m", at(2024, 3, 4, 20), AttendanceStatus::Present),
            rec("b", "m", at(2024, 3, 5, 2), AttendanceStatus::Absent),
            rec("c", "m", at(2024, 3, 5, 9), AttendanceStatus::Late),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(records_on(&records, day, utc()).len(), 1);
        let shifted = records_on(&records, day, local_offset(-300));
        let ids: Vec<_> = shifted.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn id_filter_treats_all_as_wildcard() {
        let day = at(2024, 3, 4, 9);
        let mut other = rec("a", "m2", day, AttendanceStatus::Present);
        other.semester_id = "sem2".into();
        let records = vec![rec("a", "m1", day, AttendanceStatus::Present), other];
        assert_eq!(filter_records(&records, &IdFilter::parse(Some("all")), &IdFilter::parse(None)).len(), 2);
        let only = filter_records(&records, &IdFilter::parse(Some("sem2")), &IdFilter::All);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].subject_id, "m2");
        assert!(filter_records(&records, &IdFilter::All, &IdFilter::parse(Some("m9"))).is_empty());
    }
}
