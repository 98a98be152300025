//! Deterministic, pure logic: content model, generation, constraint checks.
//!
//! Nothing in here touches the filesystem. Modules operate on in-memory data
//! and return deterministic results suitable for tests.

pub mod constraints;
pub mod content;
pub mod content_validate;
pub mod generator;
pub mod objective;
pub mod slot;
pub mod types;
