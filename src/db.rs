use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "rollcall.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_label TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            attendance_count INTEGER NOT NULL DEFAULT 0,
            code TEXT NOT NULL,
            marker_date TEXT,
            marker_status TEXT,
            last_counted_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before attendance markers existed lack the marker columns.
    ensure_students_marker_columns(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_code ON students(code)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_label)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS violation_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            points INTEGER NOT NULL CHECK (points < 0),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Log tables have no foreign keys: history outlives the student and violation rows.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_label TEXT NOT NULL,
            code TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_logs_student_date ON attendance_logs(student_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_logs_date ON attendance_logs(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS violation_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_label TEXT NOT NULL,
            violation_name TEXT NOT NULL,
            points INTEGER NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_violation_logs_student ON violation_logs(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_violation_logs_date ON violation_logs(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS points_logs(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_label TEXT NOT NULL,
            delta INTEGER NOT NULL,
            reason TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_points_logs_student ON points_logs(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_points_logs_date ON points_logs(date)",
        [],
    )?;

    Ok(())
}

fn ensure_students_marker_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "marker_date")? {
        conn.execute("ALTER TABLE students ADD COLUMN marker_date TEXT", [])?;
    }
    if !table_has_column(conn, "students", "marker_status")? {
        conn.execute("ALTER TABLE students ADD COLUMN marker_status TEXT", [])?;
    }
    if !table_has_column(conn, "students", "last_counted_date")? {
        conn.execute("ALTER TABLE students ADD COLUMN last_counted_date TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
