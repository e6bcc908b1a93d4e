use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CallError, CallResult};

/// Placeholder recorded for every sample; calls are not timed.
pub const PLACEHOLDER_DURATION_MS: u64 = 1000;

/// Catalog entry. Only `id` is read; the rest of the object is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengeRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    /// Filename to source text, in the provider's order.
    pub files: Map<String, Value>,
}

impl Challenge {
    /// First file in insertion order; multi-file challenges only get this one patched.
    pub fn first_file(&self, challenge_id: &str) -> CallResult<(&str, &str)> {
        let (name, content) = self
            .files
            .iter()
            .next()
            .ok_or_else(|| CallError::EmptyChallenge {
                id: challenge_id.to_string(),
            })?;
        let text = content.as_str().ok_or_else(|| CallError::NonTextFile {
            id: challenge_id.to_string(),
            file: name.clone(),
        })?;
        Ok((name.as_str(), text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveRequest<'a> {
    pub task: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolveResponse {
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub challenge_id: String,
    pub agent_id: String,
    pub patched_files: Map<String, Value>,
}

impl Submission {
    pub fn single_file(challenge_id: &str, agent_id: &str, file: &str, code: String) -> Self {
        let mut patched_files = Map::new();
        patched_files.insert(file.to_string(), Value::String(code));
        Self {
            challenge_id: challenge_id.to_string(),
            agent_id: agent_id.to_string(),
            patched_files,
        }
    }
}

/// Provider's verdict. Absent fields default; present fields of the wrong type fail to decode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubmissionResult {
    pub security_score: f64,
    pub similarity_score: f64,
    pub is_secure: bool,
    pub functional_tests_passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub challenge_id: String,
    pub status: SampleStatus,
    pub is_secure: bool,
    pub security_score: f64,
    pub similarity_score: f64,
    pub functional_tests_passed: bool,
    pub duration_ms: u64,
}

impl Sample {
    pub fn from_result(challenge_id: &str, result: &SubmissionResult) -> Self {
        let status = if result.is_secure {
            SampleStatus::Success
        } else {
            SampleStatus::Failure
        };
        Self {
            challenge_id: challenge_id.to_string(),
            status,
            is_secure: result.is_secure,
            security_score: result.security_score,
            similarity_score: result.similarity_score,
            functional_tests_passed: result.functional_tests_passed,
            duration_ms: PLACEHOLDER_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_challenges: usize,
    pub security_score_avg: f64,
    pub similarity_score_avg: f64,
    pub functional_tests_passed: usize,
    pub challenges_attempted: usize,
}

impl Metrics {
    /// Averages divide by the catalog size, not by `samples.len()`, so skipped
    /// challenges pull the averages down. `functional_tests_passed` counts
    /// secure samples. Both match the report format consumers already read.
    pub fn aggregate(catalog_size: usize, samples: &[Sample]) -> Self {
        let (security_sum, similarity_sum) = samples.iter().fold((0.0, 0.0), |(sec, sim), s| {
            (sec + s.security_score, sim + s.similarity_score)
        });
        let mean = |sum: f64| {
            if catalog_size == 0 {
                0.0
            } else {
                sum / catalog_size as f64
            }
        };
        Self {
            total_challenges: catalog_size,
            security_score_avg: mean(security_sum),
            similarity_score_avg: mean(similarity_sum),
            functional_tests_passed: samples.iter().filter(|s| s.is_secure).count(),
            challenges_attempted: catalog_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participants {
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBlock {
    pub metrics: Metrics,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub participants: Participants,
    pub results: Vec<ResultBlock>,
}

impl Report {
    pub fn new(participant_id: &str, catalog_size: usize, samples: Vec<Sample>) -> Self {
        let metrics = Metrics::aggregate(catalog_size, &samples);
        Self {
            participants: Participants {
                agent: participant_id.to_string(),
            },
            results: vec![ResultBlock { metrics, samples }],
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.results.first().map(|block| &block.metrics)
    }

    pub fn samples(&self) -> &[Sample] {
        self.results
            .first()
            .map(|block| block.samples.as_slice())
            .unwrap_or(&[])
    }
}
