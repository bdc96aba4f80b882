use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Excused,
    Sick,
    AbsentUnexcused,
    Unset,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 5] = [
        AttendanceStatus::Present,
        AttendanceStatus::Excused,
        AttendanceStatus::Sick,
        AttendanceStatus::AbsentUnexcused,
        AttendanceStatus::Unset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::AbsentUnexcused => "absent_unexcused",
            AttendanceStatus::Unset => "unset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "excused" => Some(AttendanceStatus::Excused),
            "sick" => Some(AttendanceStatus::Sick),
            "absent_unexcused" | "absent" => Some(AttendanceStatus::AbsentUnexcused),
            "unset" | "" => Some(AttendanceStatus::Unset),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::AbsentUnexcused => "absent (unexcused)",
            AttendanceStatus::Unset => "not recorded",
        }
    }
}

/// The most recent attendance determination stored on a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceMarker {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_label: String,
    pub points: i64,
    pub attendance_count: i64,
    pub code: String,
    pub marker: Option<AttendanceMarker>,
    /// Day the attendance count was last incremented.
    pub last_counted: Option<NaiveDate>,
    pub created_at: String,
}

impl Student {
    /// Status for `day`; a marker from another day reads as unset.
    pub fn status_on(&self, day: NaiveDate) -> AttendanceStatus {
        match self.marker {
            Some(m) if m.date == day => m.status,
            _ => AttendanceStatus::Unset,
        }
    }

    pub fn is_present_on(&self, day: NaiveDate) -> bool {
        self.status_on(day) == AttendanceStatus::Present
    }
}

/// Partial update keyed by student id. `None` leaves a field untouched;
/// `marker: Some(None)` clears the marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub class_label: Option<String>,
    pub points: Option<i64>,
    pub attendance_count: Option<i64>,
    pub marker: Option<Option<AttendanceMarker>>,
    pub last_counted: Option<NaiveDate>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.class_label.is_none()
            && self.points.is_none()
            && self.attendance_count.is_none()
            && self.marker.is_none()
            && self.last_counted.is_none()
    }

    pub fn apply_to(&self, student: &mut Student) {
        if let Some(name) = &self.name {
            student.name = name.clone();
        }
        if let Some(class_label) = &self.class_label {
            student.class_label = class_label.clone();
        }
        if let Some(points) = self.points {
            student.points = points;
        }
        if let Some(count) = self.attendance_count {
            student.attendance_count = count;
        }
        if let Some(marker) = self.marker {
            student.marker = marker;
        }
        if let Some(day) = self.last_counted {
            student.last_counted = Some(day);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationType {
    pub id: String,
    pub name: String,
    pub points: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLogEntry {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_label: String,
    pub code: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationLogEntry {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_label: String,
    pub violation_name: String,
    pub points: i64,
    pub date: NaiveDate,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsLogEntry {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_label: String,
    pub delta: i64,
    pub reason: String,
    pub date: NaiveDate,
    pub created_at: String,
}

pub fn normalize_class_label(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Today's date on the local wall clock, so the day boundary follows the school's time zone.
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(marker: Option<AttendanceMarker>) -> Student {
        Student {
            id: "1".into(),
            name: "Ana".into(),
            class_label: "7A".into(),
            points: 0,
            attendance_count: 0,
            code: "STD123".into(),
            marker,
            last_counted: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn marker_from_another_day_reads_as_unset() {
        let d1 = parse_date("2024-05-01").unwrap();
        let d2 = parse_date("2024-05-02").unwrap();
        let s = student(Some(AttendanceMarker {
            date: d1,
            status: AttendanceStatus::Present,
        }));
        assert!(s.is_present_on(d1));
        assert_eq!(s.status_on(d2), AttendanceStatus::Unset);
    }

    #[test]
    fn status_tags_parse_back() {
        for status in AttendanceStatus::ALL {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            AttendanceStatus::parse("ABSENT"),
            Some(AttendanceStatus::AbsentUnexcused)
        );
        assert_eq!(AttendanceStatus::parse("late"), None);
    }

    #[test]
    fn patch_clears_marker() {
        let mut s = student(Some(AttendanceMarker {
            date: parse_date("2024-05-01").unwrap(),
            status: AttendanceStatus::Sick,
        }));
        StudentPatch {
            marker: Some(None),
            ..Default::default()
        }
        .apply_to(&mut s);
        assert_eq!(s.marker, None);
    }

    #[test]
    fn class_labels_are_uppercased() {
        assert_eq!(normalize_class_label("  7a "), "7A");
    }
}
