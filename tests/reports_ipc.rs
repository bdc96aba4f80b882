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
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .env_remove("ROLLCALLD_WORKSPACE")
        .env_remove("ROLLCALLD_SCAN_COOLDOWN_MS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    class_label: &str,
) -> (String, String) {
    let res = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "name": name, "classLabel": class_label }),
    );
    let student = res.get("student").expect("student");
    (
        student.get("id").and_then(|v| v.as_str()).expect("id").to_string(),
        student.get("code").and_then(|v| v.as_str()).expect("code").to_string(),
    )
}

fn open_workspace(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, prefix: &str) {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

#[test]
fn leaderboard_ranks_by_points_and_filters_by_class() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "rollcalld-reports-leaderboard");
    let (a, _) = create_student(&mut stdin, &mut reader, "c1", "Kiki", "7A");
    let (b, _) = create_student(&mut stdin, &mut reader, "c2", "Lala", "7A");
    let (c, _) = create_student(&mut stdin, &mut reader, "c3", "Mira", "8B");

    for (i, (id, delta)) in [(&a, 5), (&b, 12), (&c, 30)].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "points.adjust",
            json!({ "studentId": id, "delta": delta, "today": "2024-05-01" }),
        );
    }

    let all = request_ok(&mut stdin, &mut reader, "lb", "reports.leaderboard", json!({}));
    let rows = all["rows"].as_array().cloned().expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["studentId"].as_str(), Some(c.as_str()));
    assert_eq!(rows[0]["rank"].as_u64(), Some(1));

    let class_7a = request_ok(
        &mut stdin,
        &mut reader,
        "lb7a",
        "reports.leaderboard",
        json!({ "classLabel": "7a", "limit": 1 }),
    );
    let rows = class_7a["rows"].as_array().cloned().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentId"].as_str(), Some(b.as_str()));

    let classes = request_ok(&mut stdin, &mut reader, "cl", "classes.list", json!({}));
    let labels: Vec<String> = classes["classes"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c["classLabel"].as_str().map(|s| s.to_string()))
        .collect();
    assert_eq!(labels, vec!["7A".to_string(), "8B".to_string()]);
}

#[test]
fn attendance_trend_fills_every_day_in_range() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "rollcalld-reports-trend");
    let (a, code_a) = create_student(&mut stdin, &mut reader, "c1", "Nina", "7A");
    let (_b, code_b) = create_student(&mut stdin, &mut reader, "c2", "Oki", "7A");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "attendance.record",
        json!({ "code": code_a, "today": "2024-05-01" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "attendance.record",
        json!({ "code": code_b, "today": "2024-05-01" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "attendance.setStatus",
        json!({ "studentId": a, "status": "excused", "today": "2024-05-03" }),
    );

    let trend = request_ok(
        &mut stdin,
        &mut reader,
        "t",
        "reports.attendanceTrend",
        json!({ "from": "2024-05-01", "to": "2024-05-03" }),
    );
    let buckets = trend["buckets"].as_array().cloned().expect("buckets");
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0]["date"].as_str(), Some("2024-05-01"));
    assert_eq!(buckets[0]["present"].as_i64(), Some(2));
    assert_eq!(buckets[1]["present"].as_i64(), Some(0));
    assert_eq!(buckets[2]["excused"].as_i64(), Some(1));

    let backwards = request(
        &mut stdin,
        &mut reader,
        "bw",
        "reports.attendanceTrend",
        json!({ "from": "2024-05-03", "to": "2024-05-01" }),
    );
    assert_eq!(error_code(&backwards), Some("bad_params"));

    let too_long = request(
        &mut stdin,
        &mut reader,
        "long",
        "reports.attendanceTrend",
        json!({ "from": "2023-01-01", "to": "2024-12-31" }),
    );
    assert_eq!(error_code(&too_long), Some("bad_params"));
}

#[test]
fn student_history_collects_every_log() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "rollcalld-reports-history");
    let (student_id, code) = create_student(&mut stdin, &mut reader, "c1", "Putri", "9B");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "rec",
        "attendance.record",
        json!({ "code": code, "today": "2024-05-01" }),
    );
    let vt = request_ok(
        &mut stdin,
        &mut reader,
        "vt",
        "violations.types.create",
        json!({ "name": "Uniform", "points": -1 }),
    );
    let vt_id = vt["violationType"]["id"].as_str().expect("vt id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "pts",
        "points.adjust",
        json!({ "studentId": student_id, "delta": 2, "today": "2024-05-01" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "vio",
        "violations.apply",
        json!({ "studentId": student_id, "violationTypeId": vt_id, "today": "2024-05-01" }),
    );

    let history = request_ok(
        &mut stdin,
        &mut reader,
        "h",
        "reports.studentHistory",
        json!({ "studentId": student_id }),
    );
    assert_eq!(history["student"]["points"].as_i64(), Some(1));
    assert_eq!(history["student"]["attendanceCount"].as_i64(), Some(1));
    assert_eq!(history["student"]["markerDate"].as_str(), Some("2024-05-01"));
    assert_eq!(history["student"]["markerStatus"].as_str(), Some("present"));
    assert_eq!(history["student"]["lastCountedDate"].as_str(), Some("2024-05-01"));
    assert!(history["student"].get("marker").is_none());

    let same = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let mut listed = same["student"].clone();
    if let Some(obj) = listed.as_object_mut() {
        obj.remove("statusToday");
    }
    assert_eq!(history["student"], listed);
    assert_eq!(history["attendance"].as_array().map(|r| r.len()), Some(1));
    assert_eq!(history["violations"].as_array().map(|r| r.len()), Some(1));
    assert_eq!(history["points"].as_array().map(|r| r.len()), Some(1));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "sum",
        "reports.dailySummary",
        json!({ "today": "2024-05-01" }),
    );
    assert_eq!(summary["violationCount"].as_i64(), Some(1));
    assert_eq!(summary["violationPoints"].as_i64(), Some(-1));
    assert_eq!(summary["pointsAwarded"].as_i64(), Some(2));
}
