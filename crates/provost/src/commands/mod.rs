//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod org;
pub mod settings;
pub mod workspace;
