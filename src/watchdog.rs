//! This module contains the type definitions necessary to support the
//! monitoring functionality for the engine.
//!
//! # Best-Effort Monitoring
//!
//! Note that the monitoring provided by the watchdog is a best-effort
//! approach. The driver polls it cooperatively between worklist iterations,
//! so a single long-running opcode handler cannot be interrupted mid-flight.

use std::{
    fmt::Debug,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
pub type DynWatchdog = Rc<dyn Watchdog>;

/// The interface to an object that can be polled to see if the engine needs
/// to abort processing of the current method.
///
/// The interface is simple, but it can encapsulate arbitrary logic as far as
/// the engine is concerned, allowing the client to implement complex stop
/// logic.
pub trait Watchdog
where
    Self: Debug,
{
    /// Checks if the engine should halt the current method's execution and
    /// return an error.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of worklist iterations the engine should wait before
    /// polling the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// An implementation of the [`Watchdog`] trait that does not place any
/// restrictions on the execution of the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<dyn Watchdog> {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Something ridiculously huge so it basically never gets checked.
        1_000_000_000_000
    }
}

/// A watchdog that tells the engine to stop once a wall-clock deadline has
/// passed.
///
/// This is the watchdog behind the engine's execution-time bound: the driver
/// constructs one per top-level method execution and polls it on every
/// dequeue.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    /// The instant past which the engine must stop.
    deadline: Instant,

    /// The number of worklist iterations the engine should wait before
    /// polling the watchdog.
    poll_loop_iterations: usize,
}

impl DeadlineWatchdog {
    /// Constructs a new `DeadlineWatchdog` that expires `budget` from now.
    #[must_use]
    pub fn expiring_in(budget: Duration) -> Self {
        let deadline = Instant::now() + budget;
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            deadline,
            poll_loop_iterations,
        }
    }

    /// Specifies the number of worklist iterations that the engine should
    /// wait before polling the watchdog for status.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations;
        self
    }

    /// Wraps the watchdog into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<dyn Watchdog> {
        Rc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}
