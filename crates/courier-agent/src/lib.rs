//! # Courier Agent
//!
//! The job-lifecycle side of Courier:
//!
//! - **Directory**: JSON-RPC client for the ledger's job directory
//! - **Identity**: startup check that the directory publishes our key
//! - **Capabilities**: registry of pluggable worker capabilities
//! - **Lifecycle**: discovery and active-poll passes over the job state machine
//! - **Runtime**: the two timers, shutdown, and task supervision
//! - **Builder**: assembly from a [`courier_core::CourierConfig`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Agent assembly
pub mod builder;
/// Worker capability registry
pub mod capabilities;
/// JSON-RPC job directory
pub mod directory;
/// Identity bootstrap
pub mod identity;
/// Job lifecycle manager
pub mod lifecycle;
/// Timer runtime
pub mod runtime;
/// Background task registry
pub mod task_registry;

pub use builder::{Agent, AgentBuilder};
pub use capabilities::{CapabilityRegistry, TemplateCapability, TEMPLATE_CAPABILITY};
pub use directory::RpcJobDirectory;
pub use identity::{ensure_identity, IdentityStatus};
pub use lifecycle::{
    ActiveJobRecord, ActiveStatus, JobPhase, LifecycleManager, LifecycleSettings, LifecycleSnapshot,
    TickOutcome, TickSummary,
};
pub use runtime::{LifecycleRuntime, RuntimeExit, RuntimeIntervals};
pub use task_registry::TaskRegistry;
