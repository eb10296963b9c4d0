//! Local bookkeeping for the lifecycle manager

use courier_core::{ContentDigest, Job, JobId, JobListing};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use time::OffsetDateTime;

/// Where a job stands from the local actor's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Seen by discovery, not yet decided
    Discovered,
    /// Not for us; never looked at again
    Irrelevant,
    /// Matched keywords and a capability
    Relevant,
    /// Application confirmed by the ledger
    Applied,
    /// Multi-applicant job waiting for the creator's pick
    AwaitingAssignment,
    /// Assigned to us, nothing delivered yet
    Taken,
    /// Capability running or delivery in progress
    Executing,
    /// Result delivery confirmed
    Delivered,
    /// Dropped: lost the job, job closed, or a conflict
    Abandoned,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Discovered => "discovered",
            JobPhase::Irrelevant => "irrelevant",
            JobPhase::Relevant => "relevant",
            JobPhase::Applied => "applied",
            JobPhase::AwaitingAssignment => "awaiting_assignment",
            JobPhase::Taken => "taken",
            JobPhase::Executing => "executing",
            JobPhase::Delivered => "delivered",
            JobPhase::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Progress of an active job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    /// Assigned, execution not started
    Started,
    /// Execution or delivery running
    Executing,
    /// Delivery confirmed
    Delivered,
    /// Last delivery attempt failed; retried on the next poll
    DeliveryFailed,
}

impl ActiveStatus {
    /// Whether the active poll should (re)attempt execution and delivery
    pub fn needs_delivery(&self) -> bool {
        matches!(self, ActiveStatus::Started | ActiveStatus::DeliveryFailed)
    }
}

/// A job assigned to the local actor
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobRecord {
    /// Last ledger view
    pub job: Job,
    /// Decoded public listing
    pub listing: JobListing,
    /// Capability handling the job
    pub capability: String,
    /// Local progress
    pub status: ActiveStatus,
    /// When the job became active
    pub started_at: OffsetDateTime,
    /// Packaged result kept for delivery retries
    #[serde(skip)]
    pub packaged_result: Option<String>,
    /// Digest of the published sealed result, once uploaded
    pub result_digest: Option<ContentDigest>,
    /// Delivery attempts made so far
    pub delivery_attempts: u32,
}

impl ActiveJobRecord {
    /// Fresh record for a job that was just assigned to us
    pub fn started(job: Job, listing: JobListing, capability: impl Into<String>) -> Self {
        Self {
            job,
            listing,
            capability: capability.into(),
            status: ActiveStatus::Started,
            started_at: OffsetDateTime::now_utc(),
            packaged_result: None,
            result_digest: None,
            delivery_attempts: 0,
        }
    }
}

/// An applied job not yet assigned to us
#[derive(Debug, Clone)]
pub(crate) struct PendingJob {
    pub listing: JobListing,
    pub capability: String,
    /// Single-applicant job whose take-action still has to go through
    pub take_pending: bool,
}

#[derive(Debug, Default)]
pub(crate) struct LifecycleState {
    pub processed: BTreeSet<JobId>,
    pub phases: BTreeMap<JobId, JobPhase>,
    pub active: BTreeMap<JobId, ActiveJobRecord>,
    pub pending: BTreeMap<JobId, PendingJob>,
    pub missing_key_logged: BTreeSet<JobId>,
    claims: BTreeSet<JobId>,
}

impl LifecycleState {
    pub fn set_phase(&mut self, id: JobId, phase: JobPhase) {
        let previous = self.phases.insert(id, phase);
        if previous != Some(phase) {
            tracing::debug!(job = %id, from = ?previous, to = %phase, "Job phase changed");
        }
    }
}

/// Exclusive per-job claim held while a tick works on that job
pub(crate) struct JobClaim<'a> {
    state: &'a Mutex<LifecycleState>,
    id: JobId,
}

impl<'a> JobClaim<'a> {
    /// Claim `id`, or `None` when another tick already holds it
    pub fn acquire(state: &'a Mutex<LifecycleState>, id: JobId) -> Option<Self> {
        state
            .lock()
            .claims
            .insert(id)
            .then(|| Self { state, id })
    }
}

impl Drop for JobClaim<'_> {
    fn drop(&mut self) {
        self.state.lock().claims.remove(&self.id);
    }
}

/// Point-in-time copy of the manager's bookkeeping
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleSnapshot {
    /// Jobs discovery will not look at again
    pub processed: Vec<JobId>,
    /// Phase of every job seen
    pub phases: BTreeMap<JobId, JobPhase>,
    /// Jobs currently assigned to us
    pub active: Vec<ActiveJobRecord>,
}
