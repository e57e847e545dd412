//! rollcall-analysis - page-level work for the rollcall pipeline.
//!
//! Rasterizes documents, classifies pages, preprocesses signin pages and
//! drives them through extraction. [`services::BatchJob`] ties the stages
//! together.

pub mod classify;
pub mod ocr;
pub mod preprocess;
pub mod render;
pub mod services;
