//! Blocking HTTP clients for the challenge provider and the solver.
//!
//! Every call returns a `CallResult`; deciding whether a failure skips a
//! challenge, falls back, or aborts the run is left to the runner.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BenchError, BenchResult, CallError, CallResult};
use crate::model::{Challenge, ChallengeRef, SolveRequest, SolveResponse, Submission, SubmissionResult};

/// Green: serves challenges and scores patches.
pub trait ChallengeProvider {
    fn health(&self) -> CallResult<()>;
    fn list_challenges(&self) -> CallResult<Vec<ChallengeRef>>;
    fn challenge(&self, id: &str) -> CallResult<Challenge>;
    fn submit(&self, submission: &Submission) -> CallResult<SubmissionResult>;
}

/// Purple: the system under test.
pub trait Solver {
    fn health(&self) -> CallResult<()>;
    fn solve(&self, task: &str, content: &str) -> CallResult<String>;
}

/// `None` disables the client's default timeout entirely.
pub fn build_http_client(timeout: Option<Duration>) -> BenchResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(BenchError::Client)
}

#[derive(Debug, Clone)]
struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Any HTTP answer counts; only an unreachable service is an error.
    fn ping(&self, path: &str) -> CallResult<()> {
        let endpoint = self.url(path);
        self.client
            .get(&endpoint)
            .send()
            .map(|_| ())
            .map_err(|source| CallError::Transport { endpoint, source })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> CallResult<T> {
        let endpoint = self.url(path);
        let response = self.client.get(&endpoint).send();
        decode_response(endpoint, response, StatusGate::RequireSuccess)
    }

    fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        gate: StatusGate,
    ) -> CallResult<T> {
        let endpoint = self.url(path);
        let response = self.client.post(&endpoint).json(body).send();
        decode_response(endpoint, response, gate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusGate {
    RequireSuccess,
    /// Decode the body whatever the status. Scoring replies such as a 422
    /// `{"detail": ...}` still carry a result with defaulted fields.
    AnyStatus,
}

fn decode_response<T: DeserializeOwned>(
    endpoint: String,
    response: reqwest::Result<Response>,
    gate: StatusGate,
) -> CallResult<T> {
    let response = match response {
        Ok(r) => r,
        Err(source) => return Err(CallError::Transport { endpoint, source }),
    };
    let status = response.status();
    if gate == StatusGate::RequireSuccess && !status.is_success() {
        return Err(CallError::Status { endpoint, status });
    }
    let body = match response.text() {
        Ok(b) => b,
        Err(source) => return Err(CallError::Transport { endpoint, source }),
    };
    serde_json::from_str(&body).map_err(|source| CallError::Decode { endpoint, source })
}

#[derive(Debug, Clone)]
pub struct HttpProvider {
    backend: HttpBackend,
}

impl HttpProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            backend: HttpBackend::new(client, base_url),
        }
    }
}

impl ChallengeProvider for HttpProvider {
    fn health(&self) -> CallResult<()> {
        self.backend.ping("/health")
    }

    fn list_challenges(&self) -> CallResult<Vec<ChallengeRef>> {
        self.backend.get_json("/challenges")
    }

    fn challenge(&self, id: &str) -> CallResult<Challenge> {
        self.backend.get_json(&format!("/challenges/{}", id))
    }

    fn submit(&self, submission: &Submission) -> CallResult<SubmissionResult> {
        self.backend
            .post_json("/submit", submission, StatusGate::AnyStatus)
    }
}

#[derive(Debug, Clone)]
pub struct HttpSolver {
    backend: HttpBackend,
}

impl HttpSolver {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            backend: HttpBackend::new(client, base_url),
        }
    }
}

impl Solver for HttpSolver {
    fn health(&self) -> CallResult<()> {
        self.backend.ping("/health")
    }

    fn solve(&self, task: &str, content: &str) -> CallResult<String> {
        let reply: SolveResponse = self
            .backend
            .post_json(
                "/solve",
                &SolveRequest { task, content },
                StatusGate::RequireSuccess,
            )?;
        Ok(reply.response)
    }
}
