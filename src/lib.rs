use clap::ValueEnum;

pub mod aggregate;
pub mod cleaners;
pub mod clock;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod memory;
pub mod order;
pub mod runner;
pub mod schema;
pub mod session;
pub mod sink;
pub mod stats;

pub use error::{BenchError, ContenderFailure, Result};
pub use runner::{BenchRunner, Contender};
pub use session::{ContenderRegistry, Fixture, FixtureSource, ReportSink, Session};

/// Cleaner implementation(s) to benchmark.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum CleanerVariant {
    /// Run every registered cleaner.
    #[default]
    All,
    /// Recursive rebuild into a fresh tree.
    Recursive,
    /// In-place pruning of an owned tree.
    InPlace,
    /// Explicit-stack rebuild, no recursion.
    Iterative,
}
