use crate::attendance::{apply_status, record_scan, RecordError, Recorded, RosterProvider};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, get_required_text, get_status, today_param};
use crate::ipc::types::{AppState, Request};
use crate::model::{format_date, Student};
use crate::store::SqliteStore;
use serde_json::json;

use super::student_json;

pub(crate) fn recorded_json(rec: &Recorded) -> serde_json::Value {
    json!({
        "outcome": "recorded",
        "message": rec.message(),
        "date": format_date(rec.date),
        "previousStatus": rec.previous.as_str(),
        "status": rec.status.as_str(),
        "correction": rec.is_correction(),
        "counted": rec.counted,
        "logWritten": rec.log_written,
        "student": student_json(&rec.student, Some(rec.date)),
    })
}

pub(crate) fn rejection_json(code: Option<&str>, error: &RecordError) -> serde_json::Value {
    let mut v = json!({
        "outcome": error.outcome(),
        "message": error.to_string(),
    });
    if let Some(c) = code {
        v["code"] = json!(c);
    }
    if let RecordError::AlreadyRecordedToday { student_id, .. } = error {
        v["studentId"] = json!(student_id);
    }
    v
}

fn outcome_json(code: Option<&str>, res: &Result<Recorded, RecordError>) -> serde_json::Value {
    match res {
        Ok(rec) => recorded_json(rec),
        Err(error) => rejection_json(code, error),
    }
}

/// Manual code entry. Uses the open scan session's roster when there is one,
/// otherwise a fresh roster from the workspace.
fn handle_attendance_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match get_required_text(&req.params, "code") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let today = match today_param(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let store = SqliteStore::new(conn);

    let res = match state.scan.as_mut() {
        Some(open) => open.session.record_manual(&store, &code, today),
        None => {
            let mut roster = match store.fetch_roster() {
                Ok(r) => r,
                Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
            };
            record_scan(&mut roster, &store, &code, today)
        }
    };
    ok(&req.id, outcome_json(Some(&code), &res))
}

fn handle_attendance_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let parsed = (|| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let status = get_status(&req.params)?;
        let today = today_param(&req.params)?;
        Ok::<_, HandlerErr>((student_id, status, today))
    })();
    let (student_id, status, today) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = SqliteStore::new(conn);
    let student = match store.get_student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    let res = apply_status(&store, &student, status, today);
    if let (Ok(rec), Some(open)) = (&res, state.scan.as_mut()) {
        open.session.upsert_roster_entry(&rec.student);
    }
    ok(&req.id, outcome_json(None, &res))
}

fn handle_attendance_bulk_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let parsed = (|| {
        let status = get_status(&req.params)?;
        let today = today_param(&req.params)?;
        let ids = req
            .params
            .get("studentIds")
            .and_then(|v| v.as_array())
            .ok_or_else(|| HandlerErr::bad_params("missing studentIds"))?
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect::<Vec<_>>();
        Ok::<_, HandlerErr>((status, today, ids))
    })();
    let (status, today, student_ids) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let store = SqliteStore::new(&tx);
    let mut results = Vec::with_capacity(student_ids.len());
    let mut changed: Vec<Student> = Vec::new();
    for student_id in &student_ids {
        let student = match store.get_student(student_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                results.push(json!({ "studentId": student_id, "outcome": "not_found" }));
                continue;
            }
            Err(e) => {
                let _ = tx.rollback();
                return HandlerErr::db("db_query_failed", e).response(&req.id);
            }
        };
        match apply_status(&store, &student, status, today) {
            Ok(rec) => {
                results.push(recorded_json(&rec));
                changed.push(rec.student);
            }
            Err(RecordError::PersistenceFailure(message)) => {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_update_failed",
                    message,
                    Some(json!({ "studentId": student_id })),
                );
            }
            Err(other) => results.push(rejection_json(None, &other)),
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    if let Some(open) = state.scan.as_mut() {
        for s in &changed {
            open.session.upsert_roster_entry(s);
        }
    }
    tracing::info!(
        status = status.as_str(),
        date = %format_date(today),
        requested = student_ids.len(),
        changed = changed.len(),
        "bulk attendance status applied"
    );
    ok(&req.id, json!({ "results": results, "changed": changed.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_attendance_record(state, req)),
        "attendance.setStatus" => Some(handle_attendance_set_status(state, req)),
        "attendance.bulkSetStatus" => Some(handle_attendance_bulk_set_status(state, req)),
        _ => None,
    }
}
