use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BenchError, BenchResult};

pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8000";
pub const DEFAULT_SOLVER_URL: &str = "http://localhost:8001";
pub const DEFAULT_PARTICIPANT_ID: &str = "019c17ab-21f2-78a3-a404-24054d5c73b8";
pub const DEFAULT_PARTICIPANT_LABEL: &str = "Avayam";
pub const DEFAULT_TASK_LABEL: &str = "vulnerable.py";
pub const DEFAULT_OUTPUT_DIR: &str = "results";
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 12;
pub const DEFAULT_READINESS_DELAY: Duration = Duration::from_secs(5);

/// Everything one benchmark pass needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the challenge provider (Green).
    pub provider_url: String,
    /// Base URL of the solver under test (Purple).
    pub solver_url: String,
    /// Sent as `agent_id` on every submission and recorded in the report.
    /// May be empty; an `AGENT_ID` set to "" is passed through as is.
    pub participant_id: String,
    /// Prefix of the report file name.
    pub participant_label: String,
    /// `task` sent to the solver and the file name used in `patched_files`.
    pub task_label: String,
    pub output_dir: PathBuf,
    pub max_readiness_attempts: u32,
    pub readiness_delay: Duration,
    /// `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    /// Abort before the catalog fetch when the services never came up.
    pub require_ready: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            solver_url: DEFAULT_SOLVER_URL.to_string(),
            participant_id: DEFAULT_PARTICIPANT_ID.to_string(),
            participant_label: DEFAULT_PARTICIPANT_LABEL.to_string(),
            task_label: DEFAULT_TASK_LABEL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_readiness_attempts: DEFAULT_READINESS_ATTEMPTS,
            readiness_delay: DEFAULT_READINESS_DELAY,
            request_timeout: None,
            require_ready: false,
        }
    }
}

impl RunnerConfig {
    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = url.into();
        self
    }

    pub fn with_solver_url(mut self, url: impl Into<String>) -> Self {
        self.solver_url = url.into();
        self
    }

    pub fn with_participant_id(mut self, id: impl Into<String>) -> Self {
        self.participant_id = id.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_readiness(mut self, attempts: u32, delay: Duration) -> Self {
        self.max_readiness_attempts = attempts;
        self.readiness_delay = delay;
        self
    }

    /// Checks the config and strips trailing slashes from the base URLs.
    pub fn validate(mut self) -> BenchResult<Self> {
        self.provider_url = self.provider_url.trim().trim_end_matches('/').to_string();
        self.solver_url = self.solver_url.trim().trim_end_matches('/').to_string();

        let mut problems = Vec::new();
        if self.provider_url.is_empty() {
            problems.push("provider url is empty");
        }
        if self.solver_url.is_empty() {
            problems.push("solver url is empty");
        }
        if self.participant_label.trim().is_empty() {
            problems.push("participant label is empty");
        }
        if self.task_label.trim().is_empty() {
            problems.push("task label is empty");
        }
        if self.max_readiness_attempts == 0 {
            problems.push("readiness attempts must be at least 1");
        }
        if !problems.is_empty() {
            return Err(BenchError::Config(problems.join("; ")));
        }
        Ok(self)
    }
}
