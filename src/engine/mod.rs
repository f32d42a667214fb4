//! Search engine: filter → tiered select → store, driven by the coordinator.

pub mod coordinator;
pub mod filter;
pub mod selector;
pub mod store;
