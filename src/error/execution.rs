//! This module contains errors pertaining to the symbolic execution of method
//! code.

use thiserror::Error;

use crate::error::container;

/// Errors that occur during the execution of method code by the
/// [`crate::vm::VirtualMachine`].
///
/// The four resource-bound variants act as cancellation for the current
/// method's graph build; the launcher recovers from them by skipping the
/// method. The remaining variants indicate either malformed input or an
/// engine bug and are surfaced unchanged.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Address visit limit of {limit:?} exceeded")]
    MaxAddressVisitsExceeded { limit: usize },

    #[error("Call depth limit of {limit:?} exceeded invoking {signature}")]
    MaxCallDepthExceeded { limit: usize, signature: String },

    #[error("Method visit limit of {limit:?} exceeded")]
    MaxMethodVisitsExceeded { limit: usize },

    #[error("Execution time limit of {seconds:?}s exceeded")]
    MaxExecutionTimeExceeded { seconds: u64 },

    #[error("The {mnemonic} instruction was given operands it cannot accept: {reason}")]
    MalformedInstruction { mnemonic: String, reason: String },

    #[error("Register v{register:?} is out of range for a frame of {frame_size:?} registers")]
    RegisterOutOfRange { register: usize, frame_size: usize },

    #[error("Instruction address {requested:?} is out of bounds in a method of {available:?} instructions")]
    AddressOutOfBounds { requested: usize, available: usize },

    #[error("No method with signature {signature} exists in the executable")]
    NoSuchMethod { signature: String },

    #[error("A virtual {kind} exception escaped the method and no handler can represent it")]
    UnhandledVirtualException { kind: String },
}

impl Error {
    /// Checks whether this error is one of the four resource-bound breaches.
    ///
    /// Resource-bound breaches abort the current method's graph build but are
    /// recoverable for the run as a whole.
    #[must_use]
    pub fn is_resource_bound(&self) -> bool {
        matches!(
            self,
            Self::MaxAddressVisitsExceeded { .. }
                | Self::MaxCallDepthExceeded { .. }
                | Self::MaxMethodVisitsExceeded { .. }
                | Self::MaxExecutionTimeExceeded { .. }
        )
    }
}

/// An execution error with an associated instruction address in the method.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach addresses to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, address: u32) -> Self::Located {
        container::Located {
            location: address,
            payload: self,
        }
    }
}
