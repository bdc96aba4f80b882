use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::attendance::{PersistenceSink, RosterProvider};
use crate::codes::generate_student_code;
use crate::model::{
    format_date, normalize_class_label, now_timestamp, parse_date, AttendanceLogEntry,
    AttendanceMarker, AttendanceStatus, PointsLogEntry, Student, StudentPatch,
};
use crate::points;

const STUDENT_COLUMNS: &str = "id, name, class_label, points, attendance_count, code, marker_date, marker_status, last_counted_date, created_at";

/// SQLite-backed roster and persistence collaborator. Works on a plain
/// connection or inside a transaction.
#[derive(Clone, Copy)]
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn list_students(&self, class_label: Option<&str>) -> anyhow::Result<Vec<Student>> {
        let mut sql = format!("SELECT {} FROM students", STUDENT_COLUMNS);
        let mut args: Vec<Value> = Vec::new();
        if let Some(label) = class_label {
            sql.push_str(" WHERE class_label = ?");
            args.push(Value::Text(normalize_class_label(label)));
        }
        sql.push_str(" ORDER BY class_label, name COLLATE NOCASE, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_student(&self, id: &str) -> anyhow::Result<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [id], student_from_row)
            .optional()?)
    }

    pub fn get_student_by_code(&self, code: &str) -> anyhow::Result<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE code = ?", STUDENT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [code.trim()], student_from_row)
            .optional()?)
    }

    pub fn create_student(&self, name: &str, class_label: &str) -> anyhow::Result<Student> {
        let student = Student {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            class_label: normalize_class_label(class_label),
            points: 0,
            attendance_count: 0,
            code: generate_student_code(),
            marker: None,
            last_counted: None,
            created_at: now_timestamp(),
        };
        self.conn
            .execute(
                "INSERT INTO students(id, name, class_label, points, attendance_count, code, created_at)
                 VALUES(?, ?, ?, 0, 0, ?, ?)",
                (
                    &student.id,
                    &student.name,
                    &student.class_label,
                    &student.code,
                    &student.created_at,
                ),
            )
            .context("failed to insert student")?;
        Ok(student)
    }

    /// Removes the student row only; log history is kept.
    pub fn delete_student(&self, id: &str) -> anyhow::Result<bool> {
        let n = self.conn.execute("DELETE FROM students WHERE id = ?", [id])?;
        Ok(n > 0)
    }

    pub fn class_labels(&self) -> anyhow::Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT class_label, COUNT(*) FROM students GROUP BY class_label ORDER BY class_label",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a signed point change, clamped at zero, and record it in the points log.
    pub fn adjust_points(
        &self,
        student: &Student,
        delta: i64,
        reason: &str,
        day: NaiveDate,
    ) -> anyhow::Result<(Student, PointsLogEntry)> {
        let new_balance = points::apply_delta(student.points, delta);
        let tx = self.conn.unchecked_transaction()?;
        let n = tx.execute(
            "UPDATE students SET points = ? WHERE id = ?",
            (new_balance, &student.id),
        )?;
        if n == 0 {
            bail!("student not found: {}", student.id);
        }
        let entry = PointsLogEntry {
            id: Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            class_label: student.class_label.clone(),
            delta,
            reason: reason.trim().to_string(),
            date: day,
            created_at: now_timestamp(),
        };
        tx.execute(
            "INSERT INTO points_logs(id, student_id, student_name, class_label, delta, reason, date, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &entry.id,
                &entry.student_id,
                &entry.student_name,
                &entry.class_label,
                entry.delta,
                &entry.reason,
                format_date(entry.date),
                &entry.created_at,
            ),
        )?;
        tx.commit().context("failed to commit points adjustment")?;

        let mut updated = student.clone();
        updated.points = new_balance;
        Ok((updated, entry))
    }

    pub fn attendance_log_for(
        &self,
        student_id: &str,
        day: NaiveDate,
    ) -> anyhow::Result<Option<AttendanceLogEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, student_id, student_name, class_label, code, date, status, created_at
                 FROM attendance_logs
                 WHERE student_id = ? AND date = ?",
                (student_id, format_date(day)),
                attendance_log_from_row,
            )
            .optional()?)
    }
}

impl RosterProvider for SqliteStore<'_> {
    fn fetch_roster(&self) -> anyhow::Result<Vec<Student>> {
        self.list_students(None)
    }
}

impl PersistenceSink for SqliteStore<'_> {
    fn update_student(&self, student_id: &str, patch: &StudentPatch) -> anyhow::Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            args.push(Value::Text(name.trim().to_string()));
        }
        if let Some(label) = &patch.class_label {
            sets.push("class_label = ?");
            args.push(Value::Text(normalize_class_label(label)));
        }
        if let Some(points) = patch.points {
            sets.push("points = ?");
            args.push(Value::Integer(points));
        }
        if let Some(count) = patch.attendance_count {
            sets.push("attendance_count = ?");
            args.push(Value::Integer(count.max(0)));
        }
        if let Some(marker) = patch.marker {
            sets.push("marker_date = ?");
            sets.push("marker_status = ?");
            match marker {
                Some(m) => {
                    args.push(Value::Text(format_date(m.date)));
                    args.push(Value::Text(m.status.as_str().to_string()));
                }
                None => {
                    args.push(Value::Null);
                    args.push(Value::Null);
                }
            }
        }
        if let Some(day) = patch.last_counted {
            sets.push("last_counted_date = ?");
            args.push(Value::Text(format_date(day)));
        }
        args.push(Value::Text(student_id.to_string()));

        let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
        let n = self
            .conn
            .execute(&sql, params_from_iter(args))
            .context("failed to update student")?;
        if n == 0 {
            return Err(anyhow!("student not found: {}", student_id));
        }
        Ok(())
    }

    fn upsert_attendance_log(&self, entry: &AttendanceLogEntry) -> anyhow::Result<()> {
        let date = format_date(entry.date);
        let n = self.conn.execute(
            "UPDATE attendance_logs
             SET student_name = ?, class_label = ?, code = ?, status = ?
             WHERE student_id = ? AND date = ?",
            (
                &entry.student_name,
                &entry.class_label,
                &entry.code,
                entry.status.as_str(),
                &entry.student_id,
                &date,
            ),
        )?;
        if n > 0 {
            return Ok(());
        }
        self.conn
            .execute(
                "INSERT INTO attendance_logs(id, student_id, student_name, class_label, code, date, status, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &entry.id,
                    &entry.student_id,
                    &entry.student_name,
                    &entry.class_label,
                    &entry.code,
                    &date,
                    entry.status.as_str(),
                    &entry.created_at,
                ),
            )
            .context("failed to insert attendance log")?;
        Ok(())
    }

    fn remove_attendance_log(&self, student_id: &str, date: NaiveDate) -> anyhow::Result<()> {
        self.conn.execute(
            "DELETE FROM attendance_logs WHERE student_id = ? AND date = ?",
            (student_id, format_date(date)),
        )?;
        Ok(())
    }
}

pub(crate) fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    let marker_date: Option<String> = r.get(6)?;
    let marker_status: Option<String> = r.get(7)?;
    let last_counted: Option<String> = r.get(8)?;
    let marker = match (marker_date.as_deref().and_then(parse_date), marker_status) {
        (Some(date), Some(status)) => Some(AttendanceMarker {
            date,
            status: AttendanceStatus::parse(&status).unwrap_or(AttendanceStatus::Unset),
        }),
        _ => None,
    };
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        class_label: r.get(2)?,
        points: r.get(3)?,
        attendance_count: r.get(4)?,
        code: r.get(5)?,
        marker,
        last_counted: last_counted.as_deref().and_then(parse_date),
        created_at: r.get(9)?,
    })
}

pub(crate) fn attendance_log_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceLogEntry> {
    let date: String = r.get(5)?;
    let status: String = r.get(6)?;
    Ok(AttendanceLogEntry {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_name: r.get(2)?,
        class_label: r.get(3)?,
        code: r.get(4)?,
        date: parse_date(&date).unwrap_or_default(),
        status: AttendanceStatus::parse(&status).unwrap_or(AttendanceStatus::Unset),
        created_at: r.get(7)?,
    })
}
