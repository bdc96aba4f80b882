use chrono::Utc;
use uuid::Uuid;

pub const CODE_PREFIX: &str = "STD";

/// New scannable code: prefix, millisecond timestamp, 4 random hex chars.
/// Collisions are not checked here; the `students.code` UNIQUE index rejects them.
pub fn generate_student_code() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}{}", CODE_PREFIX, millis, suffix[..4].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_carry_prefix_and_differ() {
        let a = generate_student_code();
        let b = generate_student_code();
        assert!(a.starts_with(CODE_PREFIX));
        assert!(a.len() > CODE_PREFIX.len() + 4);
        assert_ne!(a, b);
    }
}
