use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debugger::StepStatus;
use crate::error::{Error, Result};

/// Pacing and evaluation limits for a debugging session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Delay before the next step after a line executed.
    pub step_delay_ms: u64,

    /// Delay before the next step after a breakpoint pause, long enough for
    /// an observer to inspect the captured state.
    pub breakpoint_delay_ms: u64,

    /// Maximum depth of nested user function calls.
    pub max_call_depth: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 100,
            breakpoint_delay_ms: 1000,
            max_call_depth: 200,
        }
    }
}

impl DriverConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        if config.max_call_depth == 0 {
            return Err(Error::Config {
                path: path.to_path_buf(),
                reason: "max_call_depth must be at least 1".to_string(),
            });
        }
        tracing::debug!(path = %path.display(), ?config, "loaded driver config");
        Ok(config)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn breakpoint_delay(&self) -> Duration {
        Duration::from_millis(self.breakpoint_delay_ms)
    }

    /// How long to wait before stepping again, or `None` once the session
    /// has reached a terminal status.
    pub fn delay_after(&self, status: StepStatus) -> Option<Duration> {
        match status {
            StepStatus::Executed => Some(self.step_delay()),
            StepStatus::BreakpointHit => Some(self.breakpoint_delay()),
            StepStatus::Errored | StepStatus::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "breakpoint_delay_ms": 250 }}"#).unwrap();

        let config = DriverConfig::load(file.path()).unwrap();
        assert_eq!(config.breakpoint_delay_ms, 250);
        assert_eq!(config.step_delay_ms, 100);
        assert_eq!(config.max_call_depth, 200);
    }

    #[test]
    fn zero_call_depth_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_call_depth": 0 }}"#).unwrap();

        let err = DriverConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn delays_follow_status() {
        let config = DriverConfig::default();
        assert_eq!(
            config.delay_after(StepStatus::Executed),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            config.delay_after(StepStatus::BreakpointHit),
            Some(Duration::from_secs(1))
        );
        assert_eq!(config.delay_after(StepStatus::Done), None);
        assert_eq!(config.delay_after(StepStatus::Errored), None);
    }
}
