//! Process exit codes
//!
//! Stable across releases so wrapper scripts can branch on them.

/// Success
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid configuration document or command line override
pub const CONFIG_ERROR: i32 = 2;

/// The render engine failed
pub const RENDER_ERROR: i32 = 3;

/// An overlay build failed
pub const BUILD_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
