//! This module contains errors pertaining to the ingestion of the class model
//! from its on-disk representation.

use thiserror::Error;

/// Errors that occur while loading or writing the class model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("The input at {path} could not be read: {source}")]
    UnreadableInput {
        path: String,
        source: std::io::Error,
    },

    #[error("The output at {path} could not be written: {source}")]
    UnwritableOutput {
        path: String,
        source: std::io::Error,
    },

    #[error("The input at {path} is not a valid class model: {source}")]
    MalformedModel {
        path: String,
        source: serde_json::Error,
    },

    #[error("The method {signature} declares {registers} registers but its code names v{register}")]
    RegisterOutOfRange {
        signature: String,
        registers: usize,
        register: usize,
    },

    #[error("The method {signature} declares {registers} registers but its inputs occupy {inputs}")]
    FrameTooSmall {
        signature: String,
        registers: usize,
        inputs: usize,
    },

    #[error("The method {signature} branches to {target} but only has {available} instructions")]
    BranchTargetOutOfRange {
        signature: String,
        target: usize,
        available: usize,
    },

    #[error("The method {signature} has a malformed signature")]
    MalformedSignature { signature: String },
}

/// The result type for operations that may fail while loading or writing the
/// class model.
pub type Result<T> = std::result::Result<T, Error>;
