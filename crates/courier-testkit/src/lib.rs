//! Courier Testing Infrastructure
//!
//! In-memory stand-ins for the ledger directory, the content store and the
//! gateways, plus deterministic signers and job fixtures. Every stand-in
//! records what was asked of it so tests can assert on side effects, and
//! supports failure injection for the error paths.
//!
//! ```toml
//! [dev-dependencies]
//! courier-testkit = { path = "../courier-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

/// In-memory content store and gateways
pub mod content;
/// In-memory job directory
pub mod directory;
/// Signers, listings, job builders, scripted capabilities
pub mod fixtures;

pub use content::{GatewayBehavior, MemoryContentStore};
pub use directory::{ApplicationGate, DirectoryCall, DirectoryOp, MemoryJobDirectory};
pub use fixtures::{listing_bytes, test_signer, JobBuilder, ScriptedCapability};
