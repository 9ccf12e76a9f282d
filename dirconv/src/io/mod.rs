//! I/O helpers for dirconv commands.

pub mod collect;
pub mod config;
pub mod converter;
pub mod discover;
pub mod init;
pub mod process;
pub mod report;
pub mod stage;
