//! This library implements a deobfuscation engine for Dalvik executables. It
//! symbolically executes each method of each non-framework class over an
//! abstract value domain, and uses the resulting execution graph to rewrite
//! instructions into semantically equivalent but simpler forms: constant
//! folding, dead-code elimination, unreachable-branch removal, and
//! predictable-call collapsing.
//!
//! # How it Works
//!
//! From a very high level, one method is simplified as follows:
//!
//! 1. The method's code, part of the in-memory class model managed by the
//!    [`smali::ClassManager`], is executed symbolically by the
//!    [`vm::VirtualMachine`]. Execution explores every path the abstract
//!    state cannot exclude, bounded by the resource limits in [`vm::Config`].
//! 2. The result is a [`vm::graph::ExecutionGraph`]: one node per visit of
//!    each instruction, carrying the register and class state observed there.
//! 3. The [`optimizer::Optimizer`] sweeps its pass pipeline over the graph
//!    and the method's code, rewriting what the graph proves predictable.
//! 4. When a pass reports that re-execution would expose further rewrites,
//!    the [`launcher::Launcher`] rebuilds the graph and sweeps again.
//!
//! # Basic Usage
//!
//! ```no_run
//! use dex_simplifier::launcher::{Launcher, Options};
//!
//! let options = Options::new("app.json");
//! let summary = Launcher::new(options).run().expect("The run failed");
//! println!("{} rewrites", summary.counts.total());
//! ```
//!
//! Binary DEX/APK parsing and emission are supplied by a separate
//! binary-format library; this crate consumes and produces the serialized
//! class model defined in [`smali`].

pub mod configuration;
pub mod constant;
pub mod emulate;
pub mod error;
pub mod launcher;
pub mod opcode;
pub mod optimizer;
pub mod smali;
pub mod vm;
pub mod watchdog;

pub use configuration::Configuration;
pub use launcher::{Launcher, Options};
pub use vm::{Config, VirtualMachine};
