//! Common test utilities for integration tests.

pub mod fixtures;
pub mod replica_sim;
pub mod stores;

pub use fixtures::*;
pub use replica_sim::*;
pub use stores::*;
