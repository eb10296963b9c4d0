//! # Courier Core
//!
//! Foundation types shared by every Courier crate:
//!
//! - **Errors**: one [`CourierError`] taxonomy for transport, authentication,
//!   missing-key, state-conflict, and configuration failures
//! - **Identifiers**: job ids, actor addresses, content digests and locators
//! - **Jobs**: the typed job record and its single ledger decoding function
//! - **Traits**: the job directory and worker capability contracts
//! - **Configuration**: the TOML-backed process configuration
//!
//! This crate performs no I/O beyond reading a configuration file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Process configuration
pub mod config;
/// Unified error types
pub mod errors;
/// Job ids, addresses, digests, locators
pub mod identifiers;
/// Typed job records
pub mod job;
/// Collaborator traits
pub mod traits;

pub use config::{
    CourierConfig, DirectoryConfig, EnvelopeEncoding, IdentityConfig, LifecycleConfig,
    StoreConfig,
};
pub use errors::{CourierError, ErrorKind, ErrorSeverity, Result};
pub use identifiers::{ActorAddress, ContentDigest, ContentLocator, JobId};
pub use job::{take_action_message, Job, JobListing, JobState};
pub use traits::{IdentityProfile, JobDirectory, WorkerCapability};
