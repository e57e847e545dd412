//! Command-line interface for rollcall.

mod commands;

pub use commands::{is_verbose, run};
