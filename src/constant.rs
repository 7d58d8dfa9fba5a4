//! This module contains constants that are needed throughout the codebase.

/// The default maximum number of times the virtual machine will visit any
/// single instruction address during the execution of one method.
///
/// Loops whose trip count cannot be determined abstractly are cut off at this
/// bound.
pub const DEFAULT_MAX_ADDRESS_VISITS: usize = 500;

/// The default maximum depth of the call stack during symbolic execution.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 20;

/// The default maximum number of instruction visits, totalled over the target
/// method and every method entered on its behalf.
pub const DEFAULT_MAX_METHOD_VISITS: usize = 1_000_000;

/// The default wall-clock budget for the execution of one method, in seconds.
pub const DEFAULT_MAX_EXECUTION_TIME_SECONDS: u64 = 300;

/// The default maximum number of times the optimizer pipeline will sweep over
/// a method before giving up on reaching a fixed point.
pub const DEFAULT_MAX_OPTIMIZATION_PASSES: usize = 100;

/// The default number of worklist iterations the driver waits between polls
/// of the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 10;

/// The type descriptor the engine uses when a value's type cannot be named.
pub const UNKNOWN_TYPE_DESCRIPTOR: &str = "?";

/// The type descriptor for `java.lang.Object`, the common supertype of every
/// reference type.
pub const OBJECT_TYPE_DESCRIPTOR: &str = "Ljava/lang/Object;";
