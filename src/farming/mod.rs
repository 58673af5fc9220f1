// src/farming/mod.rs
//! Farming positions: local snapshot, pending actions and their confirmation

pub mod format;
mod reconciler;
pub mod subgraph;
pub mod submitter;
mod types;

pub use reconciler::PositionReconciler;
pub use subgraph::{PositionSource, SubgraphClient};
pub use submitter::{ActionSubmitter, BridgeSubmitter};
pub use types::*;
