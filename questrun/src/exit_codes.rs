//! Stable exit codes for questrun CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid content, config or run state, or any other failure.
pub const INVALID: i32 = 1;
/// A lifecycle or team precondition did not hold; nothing was changed.
pub const REFUSED: i32 = 2;
