//! Hospital platform pipeline core library
//!
//! Migrates hospital operational records from a relational source into
//! denormalized patient summary documents, and republishes document-store
//! aggregates into a dashboard cache.

pub mod activity;
pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;

pub use config::Settings;
pub use error::{PipelineError, Result};
