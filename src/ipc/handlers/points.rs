use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_i64, get_required_str, today_param};
use crate::ipc::types::{AppState, Request};
use crate::model::format_date;
use crate::points;
use crate::store::SqliteStore;
use serde_json::json;

use super::student_json;

fn handle_points_adjust(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let parsed = (|| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let delta = get_required_i64(&req.params, "delta")?;
        if delta == 0 {
            return Err(HandlerErr::bad_params("delta must not be zero"));
        }
        let reason = get_optional_str(&req.params, "reason").unwrap_or("").to_string();
        let today = today_param(&req.params)?;
        Ok::<_, HandlerErr>((student_id, delta, reason, today))
    })();
    let (student_id, delta, reason, today) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = SqliteStore::new(conn);
    let student = match store.get_student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };
    let (updated, entry) = match store.adjust_points(&student, delta, &reason, today) {
        Ok(v) => v,
        Err(e) => {
            return HandlerErr::db("db_update_failed", e)
                .with_details(json!({ "table": "students" }))
                .response(&req.id)
        }
    };
    tracing::info!(
        student_id = %updated.id,
        delta,
        balance = updated.points,
        "points adjusted"
    );
    if let Some(open) = state.scan.as_mut() {
        open.session.upsert_roster_entry(&updated);
    }
    ok(
        &req.id,
        json!({
            "student": student_json(&updated, None),
            "entry": {
                "id": entry.id,
                "delta": entry.delta,
                "reason": entry.reason,
                "date": format_date(entry.date),
            },
            "clamped": points::is_clamped(student.points, delta),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "points.adjust" => Some(handle_points_adjust(state, req)),
        _ => None,
    }
}
