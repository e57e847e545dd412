//! rollcall - signin-sheet credential extraction and classification.
//!
//! Core library exposing domain modules for workspace crates.

pub mod aggregate;
pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod repository;
