//! What isolate says about a finished run
//!
//! isolate writes `key:value` lines to the `--meta` file. Only the fields
//! that decide how a run ended are kept; the status is resolved into a
//! single [`BoxStatus`] so callers never look at raw isolate codes.

use std::collections::HashMap;

/// How the boxed process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoxStatus {
    /// Exited on its own with this code (0 or not)
    Exited(i32),
    /// CPU or wall clock limit hit
    TimedOut,
    /// Terminated by a signal (0 when isolate did not report which)
    Killed(i32),
    /// isolate itself failed; the run says nothing about the program
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxReport {
    pub status: BoxStatus,
    pub cpu_ms: u32,
    pub wall_ms: u32,
}

impl BoxReport {
    /// Report for a run the outer guard had to kill.
    pub fn guard_expired(wall_ms: u32) -> Self {
        Self {
            status: BoxStatus::TimedOut,
            cpu_ms: 0,
            wall_ms,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == BoxStatus::Exited(0)
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            BoxStatus::Exited(code) => code,
            _ => -1,
        }
    }

    /// Read a meta file. `None` when isolate wrote nothing useful.
    pub fn parse(content: &str) -> Option<Self> {
        let fields: HashMap<&str, &str> = content
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();
        if fields.is_empty() {
            return None;
        }

        let seconds_to_ms =
            |key: &str| fields.get(key).and_then(|v| v.parse::<f64>().ok()).map(|s| (s * 1000.0) as u32);
        let int = |key: &str| fields.get(key).and_then(|v| v.parse::<i32>().ok());

        let status = match fields.get("status").copied() {
            Some("XX") => BoxStatus::Internal(
                fields
                    .get("message")
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "isolate reported an internal error".to_string()),
            ),
            Some("TO") => BoxStatus::TimedOut,
            Some("SG") => BoxStatus::Killed(int("exitsig").unwrap_or(0)),
            // RE always means a failing exit, even if the code is missing
            Some("RE") => BoxStatus::Exited(int("exitcode").filter(|c| *c != 0).unwrap_or(1)),
            None => match int("exitsig") {
                Some(sig) => BoxStatus::Killed(sig),
                None => BoxStatus::Exited(int("exitcode").unwrap_or(0)),
            },
            Some(other) => BoxStatus::Internal(format!("unknown isolate status '{}'", other)),
        };

        Some(Self {
            status,
            cpu_ms: seconds_to_ms("time").unwrap_or(0),
            wall_ms: seconds_to_ms("time-wall").unwrap_or(0),
        })
    }
}
