//! Drives a patch benchmark between a challenge provider and a solver.
//!
//! One pass waits for both services, pulls the challenge catalog, asks the
//! solver to patch each challenge, submits the patch for scoring and writes
//! an aggregated JSON report.

mod client;
mod config;
mod error;
mod model;
mod report;
mod runner;

pub use client::{build_http_client, ChallengeProvider, HttpProvider, HttpSolver, Solver};
pub use config::{
    RunnerConfig, DEFAULT_OUTPUT_DIR, DEFAULT_PARTICIPANT_ID, DEFAULT_PARTICIPANT_LABEL,
    DEFAULT_PROVIDER_URL, DEFAULT_READINESS_ATTEMPTS, DEFAULT_READINESS_DELAY,
    DEFAULT_SOLVER_URL, DEFAULT_TASK_LABEL,
};
pub use error::{BenchError, BenchResult, CallError, CallResult};
pub use model::{
    Challenge, ChallengeRef, Metrics, Participants, Report, ResultBlock, Sample, SampleStatus,
    Submission, SubmissionResult, PLACEHOLDER_DURATION_MS,
};
pub use report::{read_report, report_file_name, write_report};
pub use runner::{BenchmarkRunner, ChallengeOutcome, Readiness, RunSummary};
