use anyhow::Result;
use bench_runner::{
    BenchError, BenchmarkRunner, HttpProvider, HttpSolver, Readiness, RunSummary, RunnerConfig,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bench", version, about = "Patch benchmark runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ServiceArgs {
    /// Challenge provider base URL
    #[arg(long, env = "GREEN_URL", default_value = bench_runner::DEFAULT_PROVIDER_URL)]
    provider_url: String,
    /// Solver base URL
    #[arg(long, env = "PURPLE_URL", default_value = bench_runner::DEFAULT_SOLVER_URL)]
    solver_url: String,
    #[arg(long, default_value_t = bench_runner::DEFAULT_READINESS_ATTEMPTS)]
    readiness_attempts: u32,
    #[arg(long, default_value_t = bench_runner::DEFAULT_READINESS_DELAY.as_secs())]
    readiness_delay_secs: u64,
    /// Per-request timeout; requests are unbounded when omitted
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one benchmark pass and write the report
    Run {
        #[command(flatten)]
        services: ServiceArgs,
        #[arg(long = "agent-id", env = "AGENT_ID", default_value = bench_runner::DEFAULT_PARTICIPANT_ID)]
        participant_id: String,
        /// Prefix of the report file name
        #[arg(long, default_value = bench_runner::DEFAULT_PARTICIPANT_LABEL)]
        label: String,
        #[arg(long, default_value = bench_runner::DEFAULT_TASK_LABEL)]
        task_label: String,
        #[arg(long, default_value = bench_runner::DEFAULT_OUTPUT_DIR)]
        out_dir: PathBuf,
        /// Abort when the services never become ready
        #[arg(long)]
        require_ready: bool,
        /// Exit 1 when the pass aborts without a report
        #[arg(long)]
        fail_on_abort: bool,
        #[arg(long)]
        json: bool,
    },
    /// Only wait for both services and report whether they came up
    Probe {
        #[command(flatten)]
        services: ServiceArgs,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            services,
            participant_id,
            label,
            task_label,
            out_dir,
            require_ready,
            fail_on_abort,
            json,
        } => {
            let mut config = services.into_config();
            config.participant_id = participant_id;
            config.participant_label = label;
            config.task_label = task_label;
            config.output_dir = out_dir;
            config.require_ready = require_ready;
            run_command(config, fail_on_abort, json)
        }
        Commands::Probe { services, json } => probe_command(services.into_config(), json),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl ServiceArgs {
    fn into_config(self) -> RunnerConfig {
        let mut config = RunnerConfig::default()
            .with_provider_url(self.provider_url)
            .with_solver_url(self.solver_url)
            .with_readiness(
                self.readiness_attempts,
                Duration::from_secs(self.readiness_delay_secs),
            );
        config.request_timeout = self.request_timeout_secs.map(Duration::from_secs);
        config
    }
}

/// Setup failures exit 1; in json mode they are reported in the error envelope first.
fn build_runner(
    config: RunnerConfig,
    json_mode: bool,
) -> Result<BenchmarkRunner<HttpProvider, HttpSolver>> {
    match BenchmarkRunner::from_config(config) {
        Ok(runner) => Ok(runner),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(&err));
                std::process::exit(1);
            }
            Err(err.into())
        }
    }
}

fn run_command(config: RunnerConfig, fail_on_abort: bool, json_mode: bool) -> Result<()> {
    let runner = build_runner(config, json_mode)?;
    match runner.run() {
        Ok(summary) => {
            if json_mode {
                emit_json(&json!({
                    "ok": true,
                    "command": "run",
                    "report_path": summary.report_path.display().to_string(),
                    "readiness": readiness_to_json(&summary.readiness),
                    "samples": summary.report.samples().len(),
                    "skipped": summary.skipped,
                    "solver_fallbacks": summary.solver_fallbacks,
                    "metrics": summary.report.metrics(),
                }));
            } else {
                print_summary(&runner.config().participant_id, &summary);
            }
            Ok(())
        }
        // An aborted pass is reported but, like a normal pass, exits 0 unless asked otherwise.
        Err(err) => {
            if json_mode {
                emit_json(&json_error(&err));
            } else {
                eprintln!("benchmark aborted: {}", err);
            }
            if fail_on_abort {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn probe_command(config: RunnerConfig, json_mode: bool) -> Result<()> {
    let runner = build_runner(config, json_mode)?;
    let readiness = runner.wait_until_ready();
    if json_mode {
        emit_json(&json!({
            "ok": readiness.is_ready(),
            "command": "probe",
            "provider_url": runner.config().provider_url,
            "solver_url": runner.config().solver_url,
            "readiness": readiness_to_json(&readiness),
        }));
    } else {
        println!("provider: {}", runner.config().provider_url);
        println!("solver: {}", runner.config().solver_url);
        println!("ready: {}", readiness.is_ready());
        println!("attempts: {}", readiness.attempts());
    }
    if !readiness.is_ready() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(participant: &str, summary: &RunSummary) {
    println!("participant: {}", participant);
    if let Some(metrics) = summary.report.metrics() {
        println!("total_challenges: {}", metrics.total_challenges);
        println!("security_score_avg: {:.3}", metrics.security_score_avg);
        println!("similarity_score_avg: {:.3}", metrics.similarity_score_avg);
        println!("functional_tests_passed: {}", metrics.functional_tests_passed);
    }
    println!("samples: {}", summary.report.samples().len());
    println!("skipped: {}", summary.skipped);
    println!("solver_fallbacks: {}", summary.solver_fallbacks);
    println!("report: {}", summary.report_path.display());
}

fn readiness_to_json(readiness: &Readiness) -> Value {
    json!({
        "ready": readiness.is_ready(),
        "attempts": readiness.attempts(),
    })
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(err: &BenchError) -> Value {
    let details = match err {
        BenchError::NotReady { attempts } => json!({ "attempts": attempts }),
        BenchError::Persist { path, .. } => json!({ "path": path.display().to_string() }),
        _ => json!({}),
    };
    json!({
        "ok": false,
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "details": details
        }
    })
}
