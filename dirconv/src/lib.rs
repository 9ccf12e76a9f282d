//! Batch driver that runs an external converter in every subdirectory.
//!
//! For each immediate subdirectory of a root, the helper program is staged
//! into it, the converter command runs there, and the produced output files
//! are moved up into the root. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (output matching, outcome types,
//!   exit code classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, process execution,
//!   reports). Isolated behind the [`io::converter::Converter`] trait so tests
//!   can script conversions.
//!
//! Orchestration modules ([`plan`], [`batch`]) coordinate core logic with I/O
//! to implement CLI commands.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
