//! Error types for jk-consolidate
//!
//! Per-group failures never surface here: they are collected into the run
//! report. Only conditions that stop a whole run are errors.

use thiserror::Error;

use crate::services::backup_manager::BackupError;

/// Whole-run failure
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// No restore point could be created; nothing was modified
    #[error("Backup failed, run aborted before any change: {0}")]
    BackupFailed(#[source] BackupError),

    /// Rejected run parameters
    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    /// jk-common error
    #[error("Common error: {0}")]
    Common(#[from] jk_common::Error),
}

pub type Result<T> = std::result::Result<T, ConsolidationError>;
