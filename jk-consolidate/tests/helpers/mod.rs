//! Test Helper Utilities
//!
//! Shared utilities for testing jk-consolidate

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

// Re-export commonly used items
pub use db_utils::{
    create_test_db, create_test_orchestrator, create_orchestrator_with, ingredient_names,
    seed_ingredient, seed_link, table_fingerprint,
};
pub use fakes::{FailingComparator, FailingSnapshotRepository, ScriptedComparator};
