use std::collections::BTreeMap;

use anyhow::bail;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::model::{
    format_date, normalize_class_label, parse_date, AttendanceLogEntry, AttendanceStatus,
    PointsLogEntry, Student, ViolationLogEntry,
};
use crate::store::{attendance_log_from_row, SqliteStore};

pub const MAX_TREND_DAYS: i64 = 366;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: usize,
    pub student_id: String,
    pub name: String,
    pub class_label: String,
    pub points: i64,
    pub attendance_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: i64,
    pub excused: i64,
    pub sick: i64,
    pub absent_unexcused: i64,
    pub unset: i64,
}

impl StatusCounts {
    fn bump(&mut self, status: AttendanceStatus, by: i64) {
        match status {
            AttendanceStatus::Present => self.present += by,
            AttendanceStatus::Excused => self.excused += by,
            AttendanceStatus::Sick => self.sick += by,
            AttendanceStatus::AbsentUnexcused => self.absent_unexcused += by,
            AttendanceStatus::Unset => self.unset += by,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub student_count: usize,
    pub statuses: StatusCounts,
    pub violation_count: i64,
    pub violation_points: i64,
    pub points_awarded: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHistory {
    pub student: Student,
    pub attendance: Vec<AttendanceLogEntry>,
    pub violations: Vec<ViolationLogEntry>,
    pub points: Vec<PointsLogEntry>,
}

/// Students by points, then attendance, then name. Equal points and
/// attendance share a rank.
pub fn leaderboard(
    conn: &Connection,
    class_label: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<Vec<LeaderboardRow>> {
    let mut students = SqliteStore::new(conn).list_students(class_label)?;
    students.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.attendance_count.cmp(&a.attendance_count))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    let mut rows: Vec<LeaderboardRow> = Vec::with_capacity(students.len());
    for (i, s) in students.into_iter().enumerate() {
        let rank = match rows.last() {
            Some(prev)
                if prev.points == s.points && prev.attendance_count == s.attendance_count =>
            {
                prev.rank
            }
            _ => i + 1,
        };
        rows.push(LeaderboardRow {
            rank,
            student_id: s.id,
            name: s.name,
            class_label: s.class_label,
            points: s.points,
            attendance_count: s.attendance_count,
        });
    }
    if let Some(n) = limit {
        rows.truncate(n);
    }
    Ok(rows)
}

pub fn daily_summary(
    conn: &Connection,
    day: NaiveDate,
    class_label: Option<&str>,
) -> anyhow::Result<DailySummary> {
    let students = SqliteStore::new(conn).list_students(class_label)?;
    let mut statuses = StatusCounts::default();
    for s in &students {
        statuses.bump(s.status_on(day), 1);
    }

    let (class_sql, class_arg) = class_filter(class_label);
    let mut args = vec![Value::Text(format_date(day))];
    args.extend(class_arg.clone());
    let (violation_count, violation_points): (i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(points), 0) FROM violation_logs WHERE date = ?{}",
            class_sql
        ),
        params_from_iter(args.clone()),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let points_awarded: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(delta), 0) FROM points_logs WHERE date = ? AND delta > 0{}",
            class_sql
        ),
        params_from_iter(args),
        |r| r.get(0),
    )?;

    Ok(DailySummary {
        date: day,
        student_count: students.len(),
        statuses,
        violation_count,
        violation_points,
        points_awarded,
    })
}

/// Per-day status counts from the attendance log, one bucket for every day in `[from, to]`.
pub fn attendance_trend(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    class_label: Option<&str>,
) -> anyhow::Result<Vec<TrendBucket>> {
    check_range(from, to)?;
    let mut buckets: BTreeMap<NaiveDate, StatusCounts> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|d| (d, StatusCounts::default()))
        .collect();

    let (class_sql, class_arg) = class_filter(class_label);
    let mut args = vec![Value::Text(format_date(from)), Value::Text(format_date(to))];
    args.extend(class_arg);
    let mut stmt = conn.prepare(&format!(
        "SELECT date, status, COUNT(*)
         FROM attendance_logs
         WHERE date >= ? AND date <= ?{}
         GROUP BY date, status",
        class_sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(args), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (date, status, n) in rows {
        let (Some(d), Some(st)) = (parse_date(&date), AttendanceStatus::parse(&status)) else {
            continue;
        };
        if let Some(counts) = buckets.get_mut(&d) {
            counts.bump(st, n);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(date, counts)| TrendBucket { date, counts })
        .collect())
}

pub fn attendance_log(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    class_label: Option<&str>,
) -> anyhow::Result<Vec<AttendanceLogEntry>> {
    check_range(from, to)?;
    let (class_sql, class_arg) = class_filter(class_label);
    let mut args = vec![Value::Text(format_date(from)), Value::Text(format_date(to))];
    args.extend(class_arg);
    let mut stmt = conn.prepare(&format!(
        "SELECT id, student_id, student_name, class_label, code, date, status, created_at
         FROM attendance_logs
         WHERE date >= ? AND date <= ?{}
         ORDER BY date, class_label, student_name COLLATE NOCASE",
        class_sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(args), attendance_log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn violation_log(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    class_label: Option<&str>,
) -> anyhow::Result<Vec<ViolationLogEntry>> {
    check_range(from, to)?;
    let (class_sql, class_arg) = class_filter(class_label);
    let mut args = vec![Value::Text(format_date(from)), Value::Text(format_date(to))];
    args.extend(class_arg);
    query_violation_log(
        conn,
        &format!(
            "WHERE date >= ? AND date <= ?{} ORDER BY date, created_at",
            class_sql
        ),
        args,
    )
}

pub fn student_history(conn: &Connection, student: Student) -> anyhow::Result<StudentHistory> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, student_name, class_label, code, date, status, created_at
         FROM attendance_logs
         WHERE student_id = ?
         ORDER BY date DESC",
    )?;
    let attendance = stmt
        .query_map([&student.id], attendance_log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let violations = query_violation_log(
        conn,
        "WHERE student_id = ? ORDER BY date DESC, created_at DESC",
        vec![Value::Text(student.id.clone())],
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, student_id, student_name, class_label, delta, reason, date, created_at
         FROM points_logs
         WHERE student_id = ?
         ORDER BY date DESC, created_at DESC",
    )?;
    let points = stmt
        .query_map([&student.id], |r| {
            let date: String = r.get(6)?;
            Ok(PointsLogEntry {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                class_label: r.get(3)?,
                delta: r.get(4)?,
                reason: r.get(5)?,
                date: parse_date(&date).unwrap_or_default(),
                created_at: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StudentHistory {
        student,
        attendance,
        violations,
        points,
    })
}

fn query_violation_log(
    conn: &Connection,
    tail: &str,
    args: Vec<Value>,
) -> anyhow::Result<Vec<ViolationLogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, student_id, student_name, class_label, violation_name, points, date, created_at
         FROM violation_logs {}",
        tail
    ))?;
    let rows = stmt
        .query_map(params_from_iter(args), |r| {
            let date: String = r.get(6)?;
            Ok(ViolationLogEntry {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                class_label: r.get(3)?,
                violation_name: r.get(4)?,
                points: r.get(5)?,
                date: parse_date(&date).unwrap_or_default(),
                created_at: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn class_filter(class_label: Option<&str>) -> (&'static str, Option<Value>) {
    match class_label {
        Some(label) => (
            " AND class_label = ?",
            Some(Value::Text(normalize_class_label(label))),
        ),
        None => ("", None),
    }
}

fn check_range(from: NaiveDate, to: NaiveDate) -> anyhow::Result<()> {
    if from > to {
        bail!("from must not be after to");
    }
    if (to - from).num_days() >= MAX_TREND_DAYS {
        bail!("date range must be at most {} days", MAX_TREND_DAYS);
    }
    Ok(())
}
