//! # Joanie's Kitchen Common Library
//!
//! Shared code for the kitchen back-office tools including:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Database schema initialization
//! - Ingredient and recipe-link row models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
