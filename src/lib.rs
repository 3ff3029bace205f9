//! NINETY: sports odds lifecycle and settlement engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod clock;
pub mod feed;
pub mod storage;
pub mod settlement;
pub mod registry;
pub mod resolver;
pub mod bots;
pub mod api;
