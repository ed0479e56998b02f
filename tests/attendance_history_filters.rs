use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

struct Seed {
    students: Vec<String>,
    subject_id: String,
    semester_id: String,
}

/// Two active students, one inactive, one subject and one semester.
fn seed_roster(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let mut students = Vec::new();
    for (i, (first, last, status)) in [
        ("Ana", "Rojas", "active"),
        ("Bruno", "Vaca", "active"),
        ("Carla", "Mendez", "inactive"),
    ]
    .iter()
    .enumerate()
    {
        let created = request_ok(
            stdin,
            reader,
            &format!("seed-s{}", i),
            "students.create",
            json!({
                "firstName": first,
                "lastName": last,
                "email": format!("{}@uni.test", first.to_lowercase()),
                "registrationNumber": format!("20{}", i),
                "career": "Systems Engineering",
                "semester": "3",
                "status": status
            }),
        );
        students.push(created["id"].as_str().expect("student id").to_string());
    }
    let subject = request_ok(
        stdin,
        reader,
        "seed-subject",
        "subjects.create",
        json!({ "code": "INF-110", "name": "Intro to Computing" }),
    );
    let semester = request_ok(
        stdin,
        reader,
        "seed-semester",
        "semesters.create",
        json!({
            "name": "2024-1",
            "year": 2024,
            "period": "1",
            "startDate": "2024-02-01",
            "endDate": "2024-07-01"
        }),
    );
    Seed {
        students,
        subject_id: subject["id"].as_str().expect("subject id").to_string(),
        semester_id: semester["id"].as_str().expect("semester id").to_string(),
    }
}

fn save_sheet(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    seed: &Seed,
    subject_id: &str,
    date: &str,
    marks: serde_json::Value,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "attendance.save",
        json!({
            "subjectId": subject_id,
            "semesterId": seed.semester_id,
            "date": date,
            "marks": marks
        }),
    );
}

#[test]
fn history_filters_by_status_search_and_subject() {
    let workspace = temp_dir("attendance-history-filters");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_roster(&mut stdin, &mut reader);
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "code": "MAT-101", "name": "Calculus I" }),
    );
    let other_id = other["id"].as_str().expect("subject id").to_string();

    let ana = seed.students[0].clone();
    let bruno = seed.students[1].clone();
    save_sheet(
        &mut stdin,
        &mut reader,
        "3",
        &seed,
        &seed.subject_id,
        "2024-03-04T09:00:00Z",
        json!({ (ana.clone()): "present", (bruno.clone()): "late" }),
    );
    save_sheet(
        &mut stdin,
        &mut reader,
        "4",
        &seed,
        &other_id,
        "2024-03-06T14:00:00Z",
        json!({ (ana.clone()): "excused" }),
    );

    let all = request_ok(&mut stdin, &mut reader, "5", "attendance.history", json!({ "status": "all" }));
    let rows = all["records"].as_array().expect("records");
    assert_eq!(rows.len(), 4);
    // Newest first.
    assert_eq!(rows[0]["subjectId"], other_id.as_str());
    assert_eq!(rows[3]["subjectId"], seed.subject_id.as_str());

    let late = request_ok(&mut stdin, &mut reader, "6", "attendance.history", json!({ "status": "late" }));
    let rows = late["records"].as_array().expect("records");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentId"], bruno.as_str());
    assert_eq!(rows[0]["studentLabel"], "Bruno Vaca");

    let by_name = request_ok(&mut stdin, &mut reader, "7", "attendance.history", json!({ "search": "ROJAS" }));
    let rows = by_name["records"].as_array().expect("records");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["studentId"] == ana.as_str()));

    let by_subject = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.history",
        json!({ "subjectId": other_id }),
    );
    let rows = by_subject["records"].as_array().expect("records");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["subjectLabel"] == "MAT-101"));

    let bad = request(&mut stdin, &mut reader, "9", "attendance.history", json!({ "status": "sick" }));
    assert_eq!(error_code(&bad), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn history_falls_back_to_raw_ids_after_deletes() {
    let workspace = temp_dir("attendance-history-dangling");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed_roster(&mut stdin, &mut reader);
    save_sheet(
        &mut stdin,
        &mut reader,
        "2",
        &seed,
        &seed.subject_id,
        "2024-03-04T09:00:00Z",
        json!({}),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.delete",
        json!({ "id": seed.subject_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.delete",
        json!({ "id": seed.students[0] }),
    );

    let history = request_ok(&mut stdin, &mut reader, "5", "attendance.history", json!({}));
    let rows = history["records"].as_array().expect("records");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["subjectLabel"] == seed.subject_id.as_str()));
    let orphan = rows
        .iter()
        .find(|r| r["studentId"] == seed.students[0].as_str())
        .expect("orphaned record kept");
    assert_eq!(orphan["studentLabel"], seed.students[0].as_str());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
