use anyhow::{bail, Context};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::{format_date, now_timestamp, Student, ViolationLogEntry, ViolationType};
use crate::points;

fn violation_type_from_row(r: &Row<'_>) -> rusqlite::Result<ViolationType> {
    Ok(ViolationType {
        id: r.get(0)?,
        name: r.get(1)?,
        points: r.get(2)?,
        created_at: r.get(3)?,
    })
}

fn check_points(points: i64) -> anyhow::Result<()> {
    if points >= 0 {
        bail!("violation points must be negative, got {}", points);
    }
    Ok(())
}

pub fn list_types(conn: &Connection) -> anyhow::Result<Vec<ViolationType>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, points, created_at FROM violation_types ORDER BY points, name COLLATE NOCASE",
    )?;
    let rows = stmt
        .query_map([], violation_type_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_type(conn: &Connection, id: &str) -> anyhow::Result<Option<ViolationType>> {
    Ok(conn
        .query_row(
            "SELECT id, name, points, created_at FROM violation_types WHERE id = ?",
            [id],
            violation_type_from_row,
        )
        .optional()?)
}

pub fn create_type(conn: &Connection, name: &str, points: i64) -> anyhow::Result<ViolationType> {
    check_points(points)?;
    let vt = ViolationType {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        points,
        created_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO violation_types(id, name, points, created_at) VALUES(?, ?, ?, ?)",
        (&vt.id, &vt.name, vt.points, &vt.created_at),
    )
    .context("failed to insert violation type")?;
    Ok(vt)
}

/// Edits never reach existing log entries, which carry their own copy of name and points.
pub fn update_type(
    conn: &Connection,
    id: &str,
    name: Option<&str>,
    points: Option<i64>,
) -> anyhow::Result<Option<ViolationType>> {
    let Some(mut vt) = get_type(conn, id)? else {
        return Ok(None);
    };
    if let Some(n) = name {
        vt.name = n.trim().to_string();
    }
    if let Some(p) = points {
        check_points(p)?;
        vt.points = p;
    }
    conn.execute(
        "UPDATE violation_types SET name = ?, points = ? WHERE id = ?",
        (&vt.name, vt.points, &vt.id),
    )?;
    Ok(Some(vt))
}

pub fn delete_type(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM violation_types WHERE id = ?", [id])?;
    Ok(n > 0)
}

/// Deduct the violation's points from the student (clamped at zero) and
/// append a log entry holding the violation by value.
pub fn apply(
    conn: &Connection,
    student: &Student,
    vt: &ViolationType,
    day: NaiveDate,
) -> anyhow::Result<(Student, ViolationLogEntry)> {
    let new_balance = points::apply_delta(student.points, vt.points);
    let entry = ViolationLogEntry {
        id: Uuid::new_v4().to_string(),
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        class_label: student.class_label.clone(),
        violation_name: vt.name.clone(),
        points: vt.points,
        date: day,
        created_at: now_timestamp(),
    };

    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "UPDATE students SET points = ? WHERE id = ?",
        (new_balance, &student.id),
    )?;
    if n == 0 {
        bail!("student not found: {}", student.id);
    }
    tx.execute(
        "INSERT INTO violation_logs(id, student_id, student_name, class_label, violation_name, points, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.id,
            &entry.student_id,
            &entry.student_name,
            &entry.class_label,
            &entry.violation_name,
            entry.points,
            format_date(entry.date),
            &entry.created_at,
        ),
    )?;
    tx.commit().context("failed to commit violation")?;

    tracing::info!(
        student_id = %student.id,
        violation = %vt.name,
        points = vt.points,
        balance = new_balance,
        "violation applied"
    );

    let mut updated = student.clone();
    updated.points = new_balance;
    Ok((updated, entry))
}
