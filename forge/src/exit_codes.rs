//! Stable exit codes for forge CLI commands.

/// Command succeeded; for `generate`, the project builds.
pub const OK: i32 = 0;
/// Invalid configuration, missing requirements, or any other fatal error.
pub const INVALID: i32 = 1;
/// The build could not be repaired and the project was reverted.
pub const REVERTED: i32 = 2;
/// Generation was cancelled before it finished.
pub const CANCELLED: i32 = 3;
