//! Core domain types and logic.

pub mod bar;
pub mod config_load;
pub mod engine;
pub mod entry;
pub mod error;
pub mod exit;
pub mod metrics;
pub mod signal;
pub mod trade;
