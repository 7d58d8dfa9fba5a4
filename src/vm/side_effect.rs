//! This module contains the side-effect classification attached to every
//! executed instruction.

use std::fmt::{Display, Formatter};

/// The side-effect level of an instruction, a method, or a class
/// initializer.
///
/// Levels form a join semilattice ordered `None < Weak < Strong`:
///
/// - [`Level::None`]: the instruction's effects are fully captured by the
///   abstract state, so the optimizer may remove or replace it freely.
/// - [`Level::Weak`]: the instruction mutates state the engine models (static
///   fields of local classes, locally created objects and arrays). Rewrites
///   must preserve the mutation's visibility but may still fold results.
/// - [`Level::Strong`]: the instruction's effects escape the model entirely
///   (unresolved calls, framework state, synchronization). It must be
///   preserved as-is.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Level {
    None,
    Weak,
    Strong,
}

impl Level {
    /// Joins two levels, yielding the stronger of the two.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Weak => write!(f, "weak"),
            Self::Strong => write!(f, "strong"),
        }
    }
}
