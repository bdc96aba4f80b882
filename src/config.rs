//! Process configuration read from the environment (and `.env` when present).
//!
//! | Variable                     | Default | Description                                   |
//! |------------------------------|---------|-----------------------------------------------|
//! | `ROLLCALLD_WORKSPACE`        | --      | Workspace directory opened at startup         |
//! | `ROLLCALLD_SCAN_COOLDOWN_MS` | `1500`  | Window for suppressing repeated decodes       |
//! | `RUST_LOG`                   | `rollcalld=info` | Log filter; logs go to stderr        |

use std::path::PathBuf;
use std::time::Duration;

use crate::attendance::DEFAULT_SCAN_COOLDOWN;

pub const MAX_SCAN_COOLDOWN_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub scan_cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            scan_cooldown: DEFAULT_SCAN_COOLDOWN,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup("ROLLCALLD_WORKSPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let scan_cooldown = match lookup("ROLLCALLD_SCAN_COOLDOWN_MS") {
            None => DEFAULT_SCAN_COOLDOWN,
            Some(raw) => match parse_cooldown_ms(&raw) {
                Some(ms) => Duration::from_millis(ms),
                None => {
                    tracing::warn!(value = %raw, "ignoring invalid ROLLCALLD_SCAN_COOLDOWN_MS");
                    DEFAULT_SCAN_COOLDOWN
                }
            },
        };

        Self {
            workspace,
            scan_cooldown,
        }
    }
}

pub fn parse_cooldown_ms(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms <= MAX_SCAN_COOLDOWN_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = cfg(&[]);
        assert!(c.workspace.is_none());
        assert_eq!(c.scan_cooldown, DEFAULT_SCAN_COOLDOWN);
    }

    #[test]
    fn reads_workspace_and_cooldown() {
        let c = cfg(&[
            ("ROLLCALLD_WORKSPACE", "/tmp/school"),
            ("ROLLCALLD_SCAN_COOLDOWN_MS", "2000"),
        ]);
        assert_eq!(c.workspace, Some(PathBuf::from("/tmp/school")));
        assert_eq!(c.scan_cooldown, Duration::from_millis(2000));
    }

    #[test]
    fn invalid_cooldown_falls_back() {
        let c = cfg(&[("ROLLCALLD_SCAN_COOLDOWN_MS", "soon")]);
        assert_eq!(c.scan_cooldown, DEFAULT_SCAN_COOLDOWN);
        let c = cfg(&[("ROLLCALLD_SCAN_COOLDOWN_MS", "999999")]);
        assert_eq!(c.scan_cooldown, DEFAULT_SCAN_COOLDOWN);
    }
}
