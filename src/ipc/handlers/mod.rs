pub mod attendance;
pub mod core;
pub mod points;
pub mod reports;
pub mod scan;
pub mod students;
pub mod violations;

use serde_json::json;

use crate::model::{format_date, Student};

/// Wire shape of a student, including the effective status for `day`.
pub(crate) fn student_json(s: &Student, day: Option<chrono::NaiveDate>) -> serde_json::Value {
    let mut v = json!({
        "id": s.id,
        "name": s.name,
        "classLabel": s.class_label,
        "points": s.points,
        "attendanceCount": s.attendance_count,
        "code": s.code,
        "markerDate": s.marker.map(|m| format_date(m.date)),
        "markerStatus": s.marker.map(|m| m.status.as_str()),
        "lastCountedDate": s.last_counted.map(format_date),
        "createdAt": s.created_at,
    });
    if let Some(d) = day {
        v["statusToday"] = json!(s.status_on(d).as_str());
    }
    v
}
