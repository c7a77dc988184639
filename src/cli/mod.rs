//! CLI module for llm-patch
//!
//! This module provides:
//! - Command implementations (edit, check, doctor, backends)
//! - Output handlers (console, JSON, quiet)

pub mod commands;
pub mod output;

pub use commands::{check, doctor, edit, list_backends, read_response};
pub use output::{OutputMode, create_handler};
