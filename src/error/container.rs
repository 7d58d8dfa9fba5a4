use std::fmt::Formatter;

use thiserror::Error;

/// An error that is localised to a particular instruction address within the
/// method being executed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The instruction address in the method where the error occurred.
    pub location: u32,

    /// The error data
    pub payload: E,
}

/// Displays the error associated with the instruction address in the method
/// where the error occurred.
impl<E> std::fmt::Display for Located<E>
where
    E: std::fmt::Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[@{:#x}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have an instruction address attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached instruction address.
    type Located;

    /// Attach the instruction address described by `address` to the error.
    fn locate(self, address: u32) -> Self::Located;
}

/// A blanket implementation that allows for attaching an address to any
/// result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, address: u32) -> Self::Located {
        self.map_err(|e| Located {
            location: address,
            payload: e,
        })
    }
}
