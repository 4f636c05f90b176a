//! Database access layer shared by the SteelTrack services

pub mod init;
pub mod models;

pub use init::{ensure_setting, init_database, init_memory_database, setting_i64};
