//! jk-consolidate library interface
//!
//! Exposes the consolidation engine for the binary and integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ConsolidationError, Result};
