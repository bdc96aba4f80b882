use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, today_param, with_conn,
};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::json;

use super::student_json;

const DEFAULT_LEADERBOARD_LIMIT: usize = 50;

fn leaderboard(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let limit = match params.get("limit") {
        None | Some(serde_json::Value::Null) => Some(DEFAULT_LEADERBOARD_LIMIT),
        Some(v) => match v.as_u64() {
            Some(0) => None,
            Some(n) => Some(n as usize),
            None => return Err(HandlerErr::bad_params("limit must be a non-negative integer")),
        },
    };
    let rows = reports::leaderboard(conn, get_optional_str(params, "classLabel"), limit)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "rows": rows }))
}

fn daily_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let day = today_param(params)?;
    let summary = reports::daily_summary(conn, day, get_optional_str(params, "classLabel"))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!(summary))
}

fn date_range(
    params: &serde_json::Value,
) -> Result<(chrono::NaiveDate, chrono::NaiveDate), HandlerErr> {
    let from = get_required_date(params, "from")?;
    let to = get_required_date(params, "to")?;
    if from > to {
        return Err(HandlerErr::bad_params("from must not be after to"));
    }
    if (to - from).num_days() >= reports::MAX_TREND_DAYS {
        return Err(HandlerErr::bad_params(format!(
            "date range must be at most {} days",
            reports::MAX_TREND_DAYS
        )));
    }
    Ok((from, to))
}

fn attendance_trend(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (from, to) = date_range(params)?;
    let buckets = reports::attendance_trend(conn, from, to, get_optional_str(params, "classLabel"))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "buckets": buckets }))
}

fn attendance_log(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (from, to) = date_range(params)?;
    let rows = reports::attendance_log(conn, from, to, get_optional_str(params, "classLabel"))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "rows": rows }))
}

fn violation_log(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (from, to) = date_range(params)?;
    let rows = reports::violation_log(conn, from, to, get_optional_str(params, "classLabel"))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "rows": rows }))
}

fn student_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = SqliteStore::new(conn)
        .get_student(&student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let history = reports::student_history(conn, student)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut v = json!(history);
    v["student"] = student_json(&history.student, None);
    Ok(v)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.leaderboard" => Some(with_conn(state, req, leaderboard)),
        "reports.dailySummary" => Some(with_conn(state, req, daily_summary)),
        "reports.attendanceTrend" => Some(with_conn(state, req, attendance_trend)),
        "reports.attendanceLog" => Some(with_conn(state, req, attendance_log)),
        "reports.violationLog" => Some(with_conn(state, req, violation_log)),
        "reports.studentHistory" => Some(with_conn(state, req, student_history)),
        _ => None,
    }
}
