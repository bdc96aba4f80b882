use chrono::NaiveDate;
use uuid::Uuid;

use super::error::RecordError;
use crate::model::{
    format_date, now_timestamp, AttendanceLogEntry, AttendanceMarker, AttendanceStatus, Student,
    StudentPatch,
};

pub trait RosterProvider {
    fn fetch_roster(&self) -> anyhow::Result<Vec<Student>>;
}

pub trait PersistenceSink {
    fn update_student(&self, student_id: &str, patch: &StudentPatch) -> anyhow::Result<()>;

    /// Update the (student, date) entry if one exists, otherwise insert it.
    fn upsert_attendance_log(&self, entry: &AttendanceLogEntry) -> anyhow::Result<()>;

    fn remove_attendance_log(&self, student_id: &str, date: NaiveDate) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous: AttendanceStatus,
    pub next: AttendanceStatus,
    pub counted: bool,
    pub patch: StudentPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub student: Student,
    pub date: NaiveDate,
    pub previous: AttendanceStatus,
    pub status: AttendanceStatus,
    pub counted: bool,
    pub log_written: bool,
}

impl Recorded {
    /// True when an earlier determination for the same day was overwritten.
    pub fn is_correction(&self) -> bool {
        self.previous != AttendanceStatus::Unset && self.previous != self.status
    }

    pub fn message(&self) -> String {
        if self.is_correction() {
            format!(
                "{}: status changed from {} to {}",
                self.student.name,
                self.previous.label(),
                self.status.label()
            )
        } else if self.status == AttendanceStatus::Present {
            format!("{} marked present", self.student.name)
        } else {
            format!("{} marked {}", self.student.name, self.status.label())
        }
    }
}

pub fn resolve_code<'r>(roster: &'r [Student], code: &str) -> Option<&'r Student> {
    let code = code.trim();
    roster.iter().find(|s| s.code == code)
}

/// Compute the mutation that moves `student` to `status` on `day`.
///
/// The count goes up the first time a student is marked present on a given
/// day and never again that day, whatever statuses come in between. It never
/// goes down.
pub fn plan_transition(student: &Student, status: AttendanceStatus, day: NaiveDate) -> Transition {
    let previous = student.status_on(day);
    let counted = status == AttendanceStatus::Present
        && previous != AttendanceStatus::Present
        && student.last_counted != Some(day);

    let mut patch = StudentPatch::default();
    if counted {
        patch.attendance_count = Some(student.attendance_count + 1);
        patch.last_counted = Some(day);
    }
    if status == AttendanceStatus::Unset {
        // Only clear a marker that belongs to this day.
        if student.marker.map(|m| m.date == day).unwrap_or(false) {
            patch.marker = Some(None);
        }
    } else {
        patch.marker = Some(Some(AttendanceMarker { date: day, status }));
    }

    Transition {
        previous,
        next: status,
        counted,
        patch,
    }
}

/// Persist a status change for one student. The student row is written first;
/// the day's log entry follows on a best-effort basis.
pub fn apply_status<S: PersistenceSink + ?Sized>(
    sink: &S,
    student: &Student,
    status: AttendanceStatus,
    day: NaiveDate,
) -> Result<Recorded, RecordError> {
    let transition = plan_transition(student, status, day);
    if transition.previous == AttendanceStatus::Present && status == AttendanceStatus::Present {
        return Err(RecordError::AlreadyRecordedToday {
            student_id: student.id.clone(),
            name: student.name.clone(),
        });
    }

    let mut updated = student.clone();
    if !transition.patch.is_empty() {
        sink.update_student(&student.id, &transition.patch).map_err(|e| {
            tracing::error!(
                student_id = %student.id,
                status = status.as_str(),
                error = %format!("{e:#}"),
                "attendance update rejected"
            );
            RecordError::persistence(e)
        })?;
        transition.patch.apply_to(&mut updated);
    }

    let log_result = if status == AttendanceStatus::Unset {
        sink.remove_attendance_log(&student.id, day)
    } else {
        sink.upsert_attendance_log(&AttendanceLogEntry {
            id: Uuid::new_v4().to_string(),
            student_id: updated.id.clone(),
            student_name: updated.name.clone(),
            class_label: updated.class_label.clone(),
            code: updated.code.clone(),
            date: day,
            status,
            created_at: now_timestamp(),
        })
    };
    let log_written = match log_result {
        Ok(()) => true,
        Err(e) => {
            // The student row already changed; the log catches up on the next
            // write for this day.
            tracing::warn!(
                student_id = %student.id,
                date = %format_date(day),
                error = %format!("{e:#}"),
                "attendance log write failed"
            );
            false
        }
    };

    tracing::info!(
        student_id = %updated.id,
        date = %format_date(day),
        previous = transition.previous.as_str(),
        status = status.as_str(),
        counted = transition.counted,
        "attendance recorded"
    );

    Ok(Recorded {
        student: updated,
        date: day,
        previous: transition.previous,
        status,
        counted: transition.counted,
        log_written,
    })
}

/// Mark the student holding `code` present for `today`.
///
/// The roster entry is replaced only after the sink accepted the update.
pub fn record_scan<S: PersistenceSink + ?Sized>(
    roster: &mut [Student],
    sink: &S,
    code: &str,
    today: NaiveDate,
) -> Result<Recorded, RecordError> {
    let code = code.trim();
    let Some(idx) = roster.iter().position(|s| s.code == code) else {
        tracing::info!(code, "scan did not match any student");
        return Err(RecordError::UnknownCode {
            code: code.to_string(),
        });
    };

    let recorded = apply_status(sink, &roster[idx], AttendanceStatus::Present, today)?;
    roster[idx] = recorded.student.clone();
    Ok(recorded)
}
