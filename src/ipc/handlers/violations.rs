use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    get_required_i64, get_required_str, get_required_text, today_param, with_conn,
};
use crate::ipc::types::{AppState, Request};
use crate::model::format_date;
use crate::store::SqliteStore;
use crate::violations;
use rusqlite::Connection;
use serde_json::json;

use super::student_json;

fn types_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let types = violations::list_types(conn).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "violationTypes": types }))
}

fn types_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_text(params, "name")?;
    let points = get_required_i64(params, "points")?;
    if points >= 0 {
        return Err(HandlerErr::bad_params("points must be negative")
            .with_details(json!({ "points": points })));
    }
    let vt = violations::create_type(conn, &name, points)
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", e)
                .with_details(json!({ "table": "violation_types" }))
        })?;
    Ok(json!({ "violationType": vt }))
}

fn types_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "violationTypeId")?;
    let name = match params.get("name") {
        Some(_) => Some(get_required_text(params, "name")?),
        None => None,
    };
    let points = match params.get("points") {
        Some(_) => {
            let p = get_required_i64(params, "points")?;
            if p >= 0 {
                return Err(HandlerErr::bad_params("points must be negative")
                    .with_details(json!({ "points": p })));
            }
            Some(p)
        }
        None => None,
    };
    let vt = violations::update_type(conn, &id, name.as_deref(), points)
        .map_err(|e| {
            HandlerErr::db("db_update_failed", e)
                .with_details(json!({ "table": "violation_types" }))
        })?
        .ok_or_else(|| HandlerErr::not_found("violation type not found"))?;
    Ok(json!({ "violationType": vt }))
}

fn types_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_str(params, "violationTypeId")?;
    let deleted = violations::delete_type(conn, &id)
        .map_err(|e| {
            HandlerErr::db("db_delete_failed", e)
                .with_details(json!({ "table": "violation_types" }))
        })?;
    if !deleted {
        return Err(HandlerErr::not_found("violation type not found"));
    }
    Ok(json!({ "violationTypeId": id }))
}

fn handle_violations_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let parsed = (|| {
        let student_id = get_required_str(&req.params, "studentId")?;
        let type_id = get_required_str(&req.params, "violationTypeId")?;
        let today = today_param(&req.params)?;
        Ok::<_, HandlerErr>((student_id, type_id, today))
    })();
    let (student_id, type_id, today) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let student = match SqliteStore::new(conn).get_student(&student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };
    let vt = match violations::get_type(conn, &type_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "violation type not found", None),
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    match violations::apply(conn, &student, &vt, today) {
        Ok((updated, entry)) => {
            if let Some(open) = state.scan.as_mut() {
                open.session.upsert_roster_entry(&updated);
            }
            ok(
                &req.id,
                json!({
                    "student": student_json(&updated, None),
                    "entry": {
                        "id": entry.id,
                        "violationName": entry.violation_name,
                        "points": entry.points,
                        "date": format_date(entry.date),
                    },
                }),
            )
        }
        Err(e) => HandlerErr::db("db_update_failed", e)
            .with_details(json!({ "table": "violation_logs" }))
            .response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "violations.types.list" => Some(with_conn(state, req, types_list)),
        "violations.types.create" => Some(with_conn(state, req, types_create)),
        "violations.types.update" => Some(with_conn(state, req, types_update)),
        "violations.types.delete" => Some(with_conn(state, req, types_delete)),
        "violations.apply" => Some(handle_violations_apply(state, req)),
        _ => None,
    }
}
