use std::fmt;

use thiserror::Error;

/// Phase of a benchmark run in which a contender failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Measured,
    Baseline,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Warmup => "warmup",
            Phase::Measured => "measured",
            Phase::Baseline => "baseline",
        })
    }
}

/// Failure raised by a contender's operation.
///
/// Contenders report ordinary failures by returning this; panics are turned into
/// one by the fixture loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ContenderFailure {
    pub message: String,
}

impl ContenderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the harness.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid configuration; raised before any measurement happens.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A contender failed on a fixture.
    #[error("contender '{contender}' failed on fixture '{fixture}' ({phase} iteration {iteration}): {source}")]
    Contender {
        contender: String,
        fixture: String,
        phase: Phase,
        iteration: u64,
        #[source]
        source: ContenderFailure,
    },

    /// Fixture loading or report writing failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixture file could not be parsed.
    #[error("fixture '{path}' is not valid JSON: {source}")]
    FixtureParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;
