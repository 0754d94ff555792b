//! Logical process roles and the sample type recorded for them.
//!
//! The role set is closed: every monitored application runs exactly one
//! background service process and one user-facing supervisor process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical identity a classified process is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Service,
    Supervisor,
}

impl Role {
    /// All roles, in reporting order.
    pub const ALL: [Role; 2] = [Role::Service, Role::Supervisor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Service => "service",
            Role::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" => Ok(Role::Service),
            "supervisor" => Ok(Role::Supervisor),
            other => Err(format!(
                "unknown role '{}', expected 'service' or 'supervisor'",
                other
            )),
        }
    }
}

/// One timestamped memory/CPU reading for a role. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub role: Role,
    pub pid: u32,
    /// Seconds since the monitor's monotonic epoch. Orders samples within a role.
    pub monotonic_secs: f64,
    /// Wall clock time of the reading.
    pub timestamp: DateTime<Utc>,
    pub memory_bytes: u64,
    /// `None` for the first reading of a process, before a CPU delta exists.
    pub cpu_percent: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("Service".parse::<Role>().unwrap(), Role::Service);
        assert_eq!(" SUPERVISOR ".parse::<Role>().unwrap(), Role::Supervisor);
        assert!("daemon".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Supervisor).unwrap();
        assert_eq!(json, "\"supervisor\"");
    }
}
