//! Deterministic, pure logic shared by the batch driver.
//!
//! Core modules must be free of I/O side effects. They operate on names and
//! in-memory outcomes and return deterministic results suitable for tests.

pub mod classify;
pub mod matcher;
pub mod types;
