//! Error types for the simulator.
//!
//! `AccessFault` is the only failure the core raises and it never stops a run.
//! `SimError` covers everything that can go wrong before the first instruction
//! executes: reading files, parsing them and validating what they describe.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for loader and setup operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Recoverable fault raised by a single read or write.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessFault {
    /// The page is not covered by any VMA of the process
    #[error("segmentation fault: process {process} page {page}")]
    Segmentation { process: usize, page: usize },

    /// Write to a page of a write-protected VMA
    #[error("protection fault: process {process} page {page}")]
    Protection { process: usize, page: usize },
}

/// Setup errors. None of these are raised once the simulation is running.
#[derive(Error, Debug)]
pub enum SimError {
    /// Could not read an input file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line in an input file
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Frame count outside of what a PTE can address
    #[error("Frame count {0} out of range (1..={max})", max = crate::constants::MAX_FRAMES)]
    InvalidFrameCount(usize),

    /// Unknown paging algorithm letter
    #[error("Unknown paging algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// Random policy selected without any random numbers to draw from
    #[error("Random paging algorithm needs a non-empty random number file")]
    MissingRandomNumbers,

    /// Could not write a report
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl SimError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        SimError::Parse {
            line,
            message: message.into(),
        }
    }
}
