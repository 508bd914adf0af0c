//! Tooling
//!
//! Command-line surface over identities, hashing, indexing and thumbnails.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
