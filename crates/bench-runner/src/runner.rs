use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::client::{build_http_client, ChallengeProvider, HttpProvider, HttpSolver, Solver};
use crate::config::RunnerConfig;
use crate::error::{BenchError, BenchResult, CallError};
use crate::model::{ChallengeRef, Report, Sample, Submission};
use crate::report::write_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    NotReady { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            Readiness::Ready { attempts } | Readiness::NotReady { attempts } => attempts,
        }
    }
}

/// Seconds slept before `attempt` (1-based); saturates instead of overflowing.
fn waited_secs(delay: Duration, attempt: u32) -> u64 {
    delay
        .as_secs()
        .saturating_mul(u64::from(attempt.saturating_sub(1)))
}

/// What happened to one catalog entry.
#[derive(Debug)]
pub enum ChallengeOutcome {
    Scored {
        sample: Sample,
        /// The solver failed and the original code was submitted instead.
        solver_fallback: bool,
    },
    /// Detail fetch or submission failed; no sample is recorded.
    Skipped(CallError),
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,
    pub report_path: PathBuf,
    pub readiness: Readiness,
    pub skipped: usize,
    pub solver_fallbacks: usize,
}

#[derive(Debug)]
struct Collected {
    report: Report,
    readiness: Readiness,
    skipped: usize,
    solver_fallbacks: usize,
}

pub struct BenchmarkRunner<P, S> {
    config: RunnerConfig,
    provider: P,
    solver: S,
}

impl BenchmarkRunner<HttpProvider, HttpSolver> {
    /// Validates `config` and wires HTTP clients for both services.
    pub fn from_config(config: RunnerConfig) -> BenchResult<Self> {
        let config = config.validate()?;
        let client = build_http_client(config.request_timeout)?;
        let provider = HttpProvider::new(client.clone(), &config.provider_url);
        let solver = HttpSolver::new(client, &config.solver_url);
        Ok(Self::new(config, provider, solver))
    }
}

impl<P: ChallengeProvider, S: Solver> BenchmarkRunner<P, S> {
    pub fn new(config: RunnerConfig, provider: P, solver: S) -> Self {
        Self {
            config,
            provider,
            solver,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Probes provider then solver until both answer or the attempt budget
    /// runs out. Sleeps `readiness_delay` between failed attempts.
    pub fn wait_until_ready(&self) -> Readiness {
        let max = self.config.max_readiness_attempts;
        for attempt in 1..=max {
            match self.provider.health().and_then(|_| self.solver.health()) {
                Ok(()) => {
                    info!(attempt, "services are up");
                    return Readiness::Ready { attempts: attempt };
                }
                Err(err) => {
                    let waited_secs = waited_secs(self.config.readiness_delay, attempt);
                    info!(
                        attempt,
                        max,
                        waited_secs,
                        "waiting for services"
                    );
                    debug!(error = %err, "readiness probe failed");
                    if attempt < max {
                        thread::sleep(self.config.readiness_delay);
                    }
                }
            }
        }
        warn!(attempts = max, "services did not become ready");
        Readiness::NotReady { attempts: max }
    }

    pub fn fetch_catalog(&self) -> BenchResult<Vec<ChallengeRef>> {
        match self.provider.list_challenges() {
            Ok(catalog) => {
                info!(challenges = catalog.len(), "fetched challenge catalog");
                Ok(catalog)
            }
            Err(err) => {
                warn!(error = %err, "failed to reach challenge provider");
                Err(BenchError::Catalog(err))
            }
        }
    }

    /// Detail fetch, solve, submit for one challenge.
    pub fn run_challenge(&self, challenge: &ChallengeRef) -> ChallengeOutcome {
        let id = challenge.id.as_str();
        let detail = match self.provider.challenge(id) {
            Ok(detail) => detail,
            Err(err) => return ChallengeOutcome::Skipped(err),
        };
        let vulnerable = match detail.first_file(id) {
            Ok((_, content)) => content,
            Err(err) => return ChallengeOutcome::Skipped(err),
        };

        let (patched, solver_fallback) =
            match self.solver.solve(&self.config.task_label, vulnerable) {
                Ok(patched) => (patched, false),
                Err(err) => {
                    warn!(challenge = id, error = %err, "solver failed, submitting original code");
                    (vulnerable.to_string(), true)
                }
            };

        let submission = Submission::single_file(
            id,
            &self.config.participant_id,
            &self.config.task_label,
            patched,
        );
        match self.provider.submit(&submission) {
            Ok(result) => {
                let sample = Sample::from_result(id, &result);
                info!(
                    challenge = id,
                    secure = sample.is_secure,
                    score = %format!("{:.2}", sample.security_score),
                    "challenge scored"
                );
                ChallengeOutcome::Scored {
                    sample,
                    solver_fallback,
                }
            }
            Err(err) => ChallengeOutcome::Skipped(err),
        }
    }

    fn collect(&self) -> BenchResult<Collected> {
        info!(participant = %self.config.participant_id, "starting benchmark");
        let readiness = self.wait_until_ready();
        if self.config.require_ready && !readiness.is_ready() {
            return Err(BenchError::NotReady {
                attempts: readiness.attempts(),
            });
        }

        let catalog = self.fetch_catalog()?;
        let mut samples = Vec::with_capacity(catalog.len());
        let mut skipped = 0;
        let mut solver_fallbacks = 0;
        for challenge in &catalog {
            match self.run_challenge(challenge) {
                ChallengeOutcome::Scored {
                    sample,
                    solver_fallback,
                } => {
                    if solver_fallback {
                        solver_fallbacks += 1;
                    }
                    samples.push(sample);
                }
                ChallengeOutcome::Skipped(err) => {
                    warn!(challenge = %challenge.id, error = %err, "skipping challenge");
                    skipped += 1;
                }
            }
        }

        Ok(Collected {
            report: Report::new(&self.config.participant_id, catalog.len(), samples),
            readiness,
            skipped,
            solver_fallbacks,
        })
    }

    /// Runs one full pass and persists the report. Only a catalog failure
    /// (or an unmet readiness gate) ends the pass without a report.
    pub fn run(&self) -> BenchResult<RunSummary> {
        let collected = self.collect()?;
        let report_path = write_report(
            &self.config.output_dir,
            &self.config.participant_label,
            &Local::now(),
            &collected.report,
        )?;
        info!(path = %report_path.display(), "saved results");
        Ok(RunSummary {
            report: collected.report,
            report_path,
            readiness: collected.readiness,
            skipped: collected.skipped,
            solver_fallbacks: collected.solver_fallbacks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallResult;
    use crate::model::{Challenge, SampleStatus, SubmissionResult};
    use chrono::Utc;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn call_failed(endpoint: &str) -> CallError {
        // A decode error stands in for any failed call; the runner treats all
        // CallError variants the same way at a given call site.
        CallError::Decode {
            endpoint: endpoint.to_string(),
            source: serde_json::from_str::<serde_json::Value>("<html>").unwrap_err(),
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        catalog: Option<Vec<&'static str>>,
        files: BTreeMap<&'static str, serde_json::Value>,
        results: BTreeMap<&'static str, SubmissionResult>,
        health_failures: Cell<u32>,
        health_calls: Cell<u32>,
        submissions: RefCell<Vec<Submission>>,
    }

    impl FakeProvider {
        fn with_catalog(ids: &[&'static str]) -> Self {
            Self {
                catalog: Some(ids.to_vec()),
                ..Self::default()
            }
        }

        fn with_challenge(mut self, id: &'static str, code: &str, result: SubmissionResult) -> Self {
            self.files.insert(id, json!({ "vulnerable.py": code }));
            self.results.insert(id, result);
            self
        }
    }

    impl ChallengeProvider for FakeProvider {
        fn health(&self) -> CallResult<()> {
            self.health_calls.set(self.health_calls.get() + 1);
            if self.health_failures.get() > 0 {
                self.health_failures.set(self.health_failures.get() - 1);
                return Err(call_failed("/health"));
            }
            Ok(())
        }

        fn list_challenges(&self) -> CallResult<Vec<ChallengeRef>> {
            let ids = self
                .catalog
                .as_ref()
                .ok_or_else(|| call_failed("/challenges"))?;
            Ok(ids
                .iter()
                .map(|id| ChallengeRef { id: id.to_string() })
                .collect())
        }

        fn challenge(&self, id: &str) -> CallResult<Challenge> {
            let files = self
                .files
                .get(id)
                .ok_or_else(|| call_failed("/challenges/{id}"))?;
            Ok(serde_json::from_value(json!({ "files": files })).unwrap())
        }

        fn submit(&self, submission: &Submission) -> CallResult<SubmissionResult> {
            self.submissions.borrow_mut().push(submission.clone());
            self.results
                .get(submission.challenge_id.as_str())
                .cloned()
                .ok_or_else(|| call_failed("/submit"))
        }
    }

    struct FakeSolver {
        fail: bool,
        down: bool,
    }

    impl Solver for FakeSolver {
        fn health(&self) -> CallResult<()> {
            if self.down {
                return Err(call_failed("/health"));
            }
            Ok(())
        }

        fn solve(&self, _task: &str, content: &str) -> CallResult<String> {
            if self.fail {
                return Err(call_failed("/solve"));
            }
            Ok(format!("# patched\n{}", content))
        }
    }

    fn solver() -> FakeSolver {
        FakeSolver {
            fail: false,
            down: false,
        }
    }

    fn secure() -> SubmissionResult {
        SubmissionResult {
            security_score: 1.0,
            similarity_score: 0.9,
            is_secure: true,
            functional_tests_passed: true,
        }
    }

    fn temp_out(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "bench_runner_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    fn config(out: &Path) -> RunnerConfig {
        RunnerConfig::default()
            .with_participant_id("agent-under-test")
            .with_output_dir(out)
            .with_readiness(3, Duration::ZERO)
    }

    fn report_files(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn all_successful_challenges_produce_one_sample_each() {
        let out = temp_out("all_ok");
        let provider = FakeProvider::with_catalog(&["c1", "c2", "c3"])
            .with_challenge("c1", "a", secure())
            .with_challenge("c2", "b", SubmissionResult::default())
            .with_challenge("c3", "c", secure());
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        let summary = runner.run().expect("run");
        let metrics = summary.report.metrics().expect("metrics");
        assert_eq!(metrics.total_challenges, 3);
        assert_eq!(summary.report.samples().len(), 3);
        let ids: Vec<&str> = summary
            .report
            .samples()
            .iter()
            .map(|s| s.challenge_id.as_str())
            .collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(summary.report.samples()[1].status, SampleStatus::Failure);
        assert_eq!(summary.skipped, 0);
        assert!(summary.report_path.exists());
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn detail_failure_skips_challenge_but_keeps_denominator() {
        let out = temp_out("detail_fail");
        // c2 is in the catalog but has no detail.
        let provider = FakeProvider::with_catalog(&["c1", "c2"]).with_challenge("c1", "a", secure());
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        let summary = runner.run().expect("run");
        let metrics = summary.report.metrics().expect("metrics");
        assert_eq!(metrics.total_challenges, 2);
        assert_eq!(summary.report.samples().len(), 1);
        let only = &summary.report.samples()[0];
        assert_eq!(only.challenge_id, "c1");
        assert_eq!(only.status, SampleStatus::Success);
        assert_eq!(metrics.security_score_avg, 0.5);
        assert_eq!(summary.skipped, 1);

        let on_disk = crate::report::read_report(&summary.report_path).expect("read back");
        assert_eq!(on_disk, summary.report);
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn solver_failure_submits_original_code() {
        let out = temp_out("solver_fail");
        let provider = FakeProvider::with_catalog(&["c1"]).with_challenge("c1", "eval(x)", secure());
        let failing = FakeSolver {
            fail: true,
            down: false,
        };
        let runner = BenchmarkRunner::new(config(&out), provider, failing);

        let summary = runner.run().expect("run");
        assert_eq!(summary.report.samples().len(), 1);
        assert_eq!(summary.solver_fallbacks, 1);
        let submissions = runner.provider.submissions.borrow();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].patched_files["vulnerable.py"], "eval(x)");
        assert_eq!(submissions[0].agent_id, "agent-under-test");
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn patched_code_is_submitted_under_task_label() {
        let out = temp_out("patched");
        let provider = FakeProvider::with_catalog(&["c1"]).with_challenge("c1", "eval(x)", secure());
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        let summary = runner.run().expect("run");
        assert_eq!(summary.solver_fallbacks, 0);
        let submissions = runner.provider.submissions.borrow();
        assert_eq!(submissions[0].challenge_id, "c1");
        assert_eq!(
            submissions[0].patched_files["vulnerable.py"],
            "# patched\neval(x)"
        );
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn submit_failure_skips_challenge() {
        let out = temp_out("submit_fail");
        let mut provider = FakeProvider::with_catalog(&["c1", "c2"]).with_challenge("c1", "a", secure());
        provider.files.insert("c2", json!({ "main.py": "b" }));
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        let summary = runner.run().expect("run");
        assert_eq!(summary.report.samples().len(), 1);
        assert_eq!(summary.report.samples()[0].challenge_id, "c1");
        assert_eq!(summary.report.metrics().expect("metrics").total_challenges, 2);
        assert_eq!(runner.provider.submissions.borrow().len(), 2);
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn challenge_without_files_is_skipped() {
        let out = temp_out("no_files");
        let mut provider = FakeProvider::with_catalog(&["empty"]);
        provider.files.insert("empty", json!({}));
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        match runner.run_challenge(&ChallengeRef {
            id: "empty".to_string(),
        }) {
            ChallengeOutcome::Skipped(CallError::EmptyChallenge { id }) => assert_eq!(id, "empty"),
            other => panic!("expected empty-challenge skip, got {:?}", other),
        }
        assert!(runner.provider.submissions.borrow().is_empty());
    }

    #[test]
    fn empty_catalog_still_writes_zeroed_report() {
        let out = temp_out("empty");
        let runner = BenchmarkRunner::new(config(&out), FakeProvider::with_catalog(&[]), solver());

        let summary = runner.run().expect("run");
        let metrics = summary.report.metrics().expect("metrics");
        assert_eq!(metrics.total_challenges, 0);
        assert_eq!(metrics.security_score_avg, 0.0);
        assert_eq!(metrics.similarity_score_avg, 0.0);
        assert!(summary.report.samples().is_empty());
        assert_eq!(report_files(&out), vec![summary.report_path.clone()]);
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn catalog_failure_aborts_without_report() {
        let out = temp_out("catalog_fail");
        let runner = BenchmarkRunner::new(config(&out), FakeProvider::default(), solver());

        let err = runner.run().expect_err("catalog failure must abort");
        assert!(matches!(err, BenchError::Catalog(_)), "unexpected: {}", err);
        assert_eq!(err.code(), "catalog_unavailable");
        assert!(report_files(&out).is_empty());
    }

    #[test]
    fn readiness_retries_until_services_answer() {
        let out = temp_out("ready");
        let provider = FakeProvider::with_catalog(&[]);
        provider.health_failures.set(2);
        let runner = BenchmarkRunner::new(config(&out), provider, solver());

        assert_eq!(runner.wait_until_ready(), Readiness::Ready { attempts: 3 });
        assert_eq!(runner.provider.health_calls.get(), 3);
    }

    #[test]
    fn waited_secs_saturates_on_huge_delay() {
        assert_eq!(waited_secs(Duration::from_secs(5), 1), 0);
        assert_eq!(waited_secs(Duration::from_secs(5), 3), 10);
        assert_eq!(waited_secs(Duration::from_secs(u64::MAX), 2), u64::MAX);
        assert_eq!(waited_secs(Duration::from_secs(u64::MAX), 12), u64::MAX);
    }

    #[test]
    fn readiness_exhaustion_does_not_block_the_run() {
        let out = temp_out("not_ready");
        let provider = FakeProvider::with_catalog(&["c1"]).with_challenge("c1", "a", secure());
        let down = FakeSolver {
            fail: false,
            down: true,
        };
        let runner = BenchmarkRunner::new(config(&out), provider, down);

        let summary = runner.run().expect("run proceeds without ready services");
        assert_eq!(summary.readiness, Readiness::NotReady { attempts: 3 });
        assert_eq!(summary.report.samples().len(), 1);
        let _ = fs::remove_dir_all(out);
    }

    #[test]
    fn require_ready_gates_the_catalog_fetch() {
        let out = temp_out("gated");
        let provider = FakeProvider::with_catalog(&["c1"]).with_challenge("c1", "a", secure());
        let down = FakeSolver {
            fail: false,
            down: true,
        };
        let mut cfg = config(&out);
        cfg.require_ready = true;
        let runner = BenchmarkRunner::new(cfg, provider, down);

        match runner.run() {
            Err(BenchError::NotReady { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected NotReady, got {:?}", other.map(|s| s.report_path)),
        }
        assert!(runner.provider.submissions.borrow().is_empty());
        assert!(report_files(&out).is_empty());
    }
}
