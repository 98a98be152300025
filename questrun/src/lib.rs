//! Multi-phase team objective engine.
//!
//! A run is a fixed sequence of phases, each with PRIMARY, SECONDARY and TASK
//! objective slots. Objectives are generated deterministically from the run id
//! and a directory of JSON content rules, checked against hard constraints, and
//! persisted with the rest of the run state so a session survives restarts.
//!
//! - **[`core`]**: Pure, deterministic logic (slot keys, content validation,
//!   generation, constraint checks). No I/O.
//! - **[`io`]**: Side-effecting operations (config, content files, run state
//!   store, rendering).
//!
//! [`session`] coordinates the two to implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
