// Library module for ftp-sync
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod fs;
pub mod sync;
