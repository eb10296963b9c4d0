//! Collaborator contracts
//!
//! The lifecycle manager only talks to the ledger and to worker plugins
//! through these traits. Implementations live in `courier-agent` (JSON-RPC
//! directory, built-in capabilities) and `courier-testkit` (in-memory).

use crate::{ActorAddress, ContentDigest, Job, JobId, JobListing, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public profile submitted with an identity registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Display name
    pub name: String,
    /// Short biography
    #[serde(default)]
    pub bio: String,
    /// Avatar URL or locator
    #[serde(default)]
    pub avatar: String,
}

/// Read/write access to the ledger's job directory.
///
/// Mutating calls return only after the ledger has confirmed the
/// transaction; callers never assume success before that.
#[async_trait]
pub trait JobDirectory: Send + Sync {
    /// Number of jobs ever posted
    async fn job_count(&self) -> Result<u64>;

    /// Fetch one job
    async fn get_job(&self, id: JobId) -> Result<Job>;

    /// Apply to a job, pointing the creator at an encrypted message
    async fn apply_to_job(
        &self,
        id: JobId,
        recipient: &ActorAddress,
        content_digest: ContentDigest,
    ) -> Result<()>;

    /// Take a single-applicant job with a signed, revision-bound message
    async fn assign_job(&self, id: JobId, signature: &[u8]) -> Result<()>;

    /// Record the digest of a delivered result
    async fn deliver_result(&self, id: JobId, result_digest: ContentDigest) -> Result<()>;

    /// Whether an identity is registered for `address`
    async fn is_registered(&self, address: &ActorAddress) -> Result<bool>;

    /// Published verification key for `address`, `None` when absent or empty
    async fn public_key_of(&self, address: &ActorAddress) -> Result<Option<Vec<u8>>>;

    /// Register the local identity
    async fn register_identity(&self, public_key: &[u8], profile: &IdentityProfile)
        -> Result<()>;
}

/// A pluggable kind of work the local actor can perform
#[async_trait]
pub trait WorkerCapability: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Whether this capability can handle the job
    fn matches(&self, job: &Job, listing: &JobListing) -> bool;

    /// Text sent to the creator with the application
    fn build_application_message(&self, job: &Job, listing: &JobListing) -> Result<String>;

    /// Produce the raw result
    async fn execute(&self, job: &Job, listing: &JobListing) -> Result<String>;

    /// Wrap the raw result into the text delivered to the creator
    fn package_result(&self, job: &Job, listing: &JobListing, result: &str) -> Result<String>;
}
