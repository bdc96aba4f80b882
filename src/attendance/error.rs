#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown code: {code}")]
    UnknownCode { code: String },

    #[error("{name} is already present today")]
    AlreadyRecordedToday { student_id: String, name: String },

    #[error("failed to save attendance: {0}")]
    PersistenceFailure(String),

    #[error("capture device is already in use")]
    DeviceUnavailable,
}

impl RecordError {
    /// Stable tag reported to the UI alongside the notification text.
    pub fn outcome(&self) -> &'static str {
        match self {
            RecordError::UnknownCode { .. } => "unknown_code",
            RecordError::AlreadyRecordedToday { .. } => "already_present",
            RecordError::PersistenceFailure(_) => "system_failure",
            RecordError::DeviceUnavailable => "device_unavailable",
        }
    }

    pub fn persistence(e: anyhow::Error) -> Self {
        RecordError::PersistenceFailure(format!("{e:#}"))
    }
}
