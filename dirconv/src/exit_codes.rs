//! Stable exit codes for dirconv CLI commands.

/// Every ready directory converted (skipped directories are fine).
pub const OK: i32 = 0;
/// Invalid root, config, or helper, or another unexpected error.
pub const INVALID: i32 = 1;
/// At least one directory failed to convert or collect.
pub const PARTIAL: i32 = 2;
/// No subdirectory was ready to process.
pub const EMPTY: i32 = 3;
