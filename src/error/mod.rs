//! This module contains the primary error type for the engine's interface. It
//! also re-exports the more specific error types that are subsystem-specific.
//!
//! # Anyhow
//!
//! All of the errors implement [`std::error::Error`], and hence can be used
//! with [`anyhow::Error`] internally. It is _not_ recommended to use that
//! error type in the interface of the library, as this forces clients to also
//! use `anyhow`.

pub mod container;
pub mod execution;
pub mod load;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Note that _all_ of the library is public in
/// order to facilitate use-cases beyond the ones designed for.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors from the symbolic execution subsystem of the library.
    #[error(transparent)]
    Execution(#[from] execution::LocatedError),

    /// Errors that come from loading or writing the class model.
    #[error(transparent)]
    Load(#[from] load::Error),
}

/// Allow simple conversions from bare execution errors by wrapping them at an
/// unknown address.
impl From<execution::Error> for Error {
    fn from(value: execution::Error) -> Self {
        Self::Execution(container::Located {
            location: 0,
            payload: value,
        })
    }
}
