use crate::attendance::PersistenceSink;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_required_text, today_param, with_conn,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{normalize_class_label, Student, StudentPatch};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::json;

use super::student_json;

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let today = today_param(params)?;
    let students = SqliteStore::new(conn)
        .list_students(get_optional_str(params, "classLabel"))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| student_json(s, Some(today)))
        .collect();
    Ok(json!({ "students": rows }))
}

fn students_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let today = today_param(params)?;
    let student = SqliteStore::new(conn)
        .get_student(&student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student_json(&student, Some(today)) }))
}

fn students_by_code(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_text(params, "code")?;
    let today = today_param(params)?;
    let student = SqliteStore::new(conn)
        .get_student_by_code(&code)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::not_found("no student with this code").with_details(json!({ "code": code }))
        })?;
    Ok(json!({ "student": student_json(&student, Some(today)) }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<Student, HandlerErr> {
    let name = get_required_text(params, "name")?;
    let class_label = get_required_text(params, "classLabel")?;
    let student = SqliteStore::new(conn)
        .create_student(&name, &class_label)
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" }))
        })?;
    tracing::info!(student_id = %student.id, class_label = %student.class_label, "student created");
    Ok(student)
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<Student, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let mut patch = StudentPatch::default();
    if params.get("name").is_some() {
        patch.name = Some(get_required_text(params, "name")?);
    }
    if params.get("classLabel").is_some() {
        patch.class_label = Some(normalize_class_label(&get_required_text(params, "classLabel")?));
    }
    if params.get("code").is_some() {
        return Err(HandlerErr::bad_params("code cannot be changed"));
    }

    let store = SqliteStore::new(conn);
    let mut student = store
        .get_student(&student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    if patch.is_empty() {
        return Ok(student);
    }
    store
        .update_student(&student_id, &patch)
        .map_err(|e| {
            HandlerErr::db("db_update_failed", e).with_details(json!({ "table": "students" }))
        })?;
    patch.apply_to(&mut student);
    Ok(student)
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let deleted = SqliteStore::new(conn)
        .delete_student(&student_id)
        .map_err(|e| {
            HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "students" }))
        })?;
    if !deleted {
        return Err(HandlerErr::not_found("student not found"));
    }
    tracing::info!(student_id = %student_id, "student deleted");
    Ok(student_id)
}

fn classes_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let labels = SqliteStore::new(conn)
        .class_labels()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows: Vec<serde_json::Value> = labels
        .into_iter()
        .map(|(label, count)| json!({ "classLabel": label, "studentCount": count }))
        .collect();
    Ok(json!({ "classes": rows }))
}

fn handle_student_write(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<Student, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(student) => {
            if let Some(open) = state.scan.as_mut() {
                open.session.upsert_roster_entry(&student);
            }
            ok(&req.id, json!({ "student": student_json(&student, None) }))
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_delete(conn, &req.params) {
        Ok(student_id) => {
            if let Some(open) = state.scan.as_mut() {
                open.session.remove_roster_entry(&student_id);
            }
            ok(&req.id, json!({ "studentId": student_id }))
        }
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.get" => Some(with_conn(state, req, students_get)),
        "students.byCode" => Some(with_conn(state, req, students_by_code)),
        "students.create" => Some(handle_student_write(state, req, students_create)),
        "students.update" => Some(handle_student_write(state, req, students_update)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        _ => None,
    }
}
