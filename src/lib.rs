//! ALCHEMIST: high-alchemy item recommendation engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod market;
pub mod engine;
pub mod display;
pub mod dashboard;
