//! In-memory job directory
//!
//! [`MemoryJobDirectory`] plays the ledger for one local actor. It enforces
//! the same rules the real directory does (applications only on open jobs,
//! take-actions verified against the applicant's registered key and the
//! job's current revision, deliveries only by the assigned worker) and
//! bumps a job's revision on every mutation.

use async_trait::async_trait;
use courier_core::{
    take_action_message, ActorAddress, ContentDigest, CourierError, IdentityProfile, Job, JobDirectory,
    JobId, JobState, Result,
};
use courier_crypto::verify_signature;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// Directory operations that can have failures injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryOp {
    /// `job_count`
    JobCount,
    /// `get_job`
    GetJob,
    /// `apply_to_job`
    Apply,
    /// `assign_job`
    Assign,
    /// `deliver_result`
    Deliver,
    /// `public_key_of`
    PublicKeyOf,
    /// `register_identity`
    Register,
}

/// A mutating call observed by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    /// Application submitted
    Apply {
        /// Target job
        job: JobId,
        /// Recipient named in the application
        recipient: ActorAddress,
        /// Digest of the sealed application message
        digest: ContentDigest,
    },
    /// Take-action submitted
    Assign {
        /// Target job
        job: JobId,
        /// Signature bytes
        signature: Vec<u8>,
    },
    /// Result delivered
    Deliver {
        /// Target job
        job: JobId,
        /// Digest of the sealed result
        digest: ContentDigest,
    },
    /// Identity registered
    Register {
        /// Published verification key
        public_key: Vec<u8>,
        /// Submitted profile
        profile: IdentityProfile,
    },
}

/// Holds applications open until the test releases them
#[derive(Debug, Default)]
pub struct ApplicationGate {
    entered: Notify,
    release: Notify,
}

impl ApplicationGate {
    /// Wait until an application has reached the directory
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held application proceed
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug)]
struct StoredJob {
    job: Job,
    applicants: Vec<ActorAddress>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    jobs: BTreeMap<JobId, StoredJob>,
    keys: HashMap<ActorAddress, Vec<u8>>,
    calls: Vec<DirectoryCall>,
    failures: HashMap<DirectoryOp, VecDeque<CourierError>>,
    reads: HashMap<DirectoryOp, usize>,
}

/// In-memory ledger as seen by one actor
#[derive(Debug)]
pub struct MemoryJobDirectory {
    acting_as: ActorAddress,
    state: Mutex<DirectoryState>,
    gate: Mutex<Option<Arc<ApplicationGate>>>,
}

impl MemoryJobDirectory {
    /// Directory whose mutating calls are attributed to `acting_as`
    pub fn new(acting_as: ActorAddress) -> Self {
        Self {
            acting_as,
            state: Mutex::new(DirectoryState::default()),
            gate: Mutex::new(None),
        }
    }

    /// Post a job; its id is the next free index
    pub fn post(&self, mut job: Job) -> JobId {
        let mut state = self.state.lock();
        let id = JobId(state.jobs.len() as u64);
        job.id = id;
        state.jobs.insert(
            id,
            StoredJob {
                job,
                applicants: Vec::new(),
            },
        );
        id
    }

    /// Publish a verification key for `address`
    pub fn register_key(&self, address: ActorAddress, public_key: Vec<u8>) {
        self.state.lock().keys.insert(address, public_key);
    }

    /// Current ledger view of a job
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.state.lock().jobs.get(&id).map(|stored| stored.job.clone())
    }

    /// Addresses that applied to a job
    pub fn applicants(&self, id: JobId) -> Vec<ActorAddress> {
        self.state
            .lock()
            .jobs
            .get(&id)
            .map(|stored| stored.applicants.clone())
            .unwrap_or_default()
    }

    /// Creator-side transition: pick `worker` for a job
    pub fn assign_worker(&self, id: JobId, worker: ActorAddress) {
        self.mutate(id, |job| {
            job.worker = Some(worker);
            job.state = JobState::Taken;
        });
    }

    /// Creator- or arbiter-side state change
    pub fn set_state(&self, id: JobId, state: JobState) {
        self.mutate(id, |job| job.state = state);
    }

    /// Every mutating call seen so far
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.state.lock().calls.clone()
    }

    /// Number of applications submitted for a job
    pub fn application_count(&self, id: JobId) -> usize {
        self.count_calls(|call| matches!(call, DirectoryCall::Apply { job, .. } if *job == id))
    }

    /// Number of deliveries submitted for a job
    pub fn delivery_count(&self, id: JobId) -> usize {
        self.count_calls(|call| matches!(call, DirectoryCall::Deliver { job, .. } if *job == id))
    }

    /// Number of times a read operation was served
    pub fn read_count(&self, op: DirectoryOp) -> usize {
        self.state.lock().reads.get(&op).copied().unwrap_or(0)
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: DirectoryOp, error: CourierError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Hold the next application until the returned gate is released
    pub fn hold_applications(&self) -> Arc<ApplicationGate> {
        let gate = Arc::new(ApplicationGate::default());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    fn count_calls(&self, predicate: impl Fn(&DirectoryCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn mutate(&self, id: JobId, change: impl FnOnce(&mut Job)) {
        if let Some(stored) = self.state.lock().jobs.get_mut(&id) {
            change(&mut stored.job);
            stored.job.revision += 1;
        }
    }

    fn injected(&self, op: DirectoryOp) -> Result<()> {
        let mut state = self.state.lock();
        *state.reads.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, call: DirectoryCall) {
        self.state.lock().calls.push(call);
    }
}

fn unknown_job(id: JobId) -> CourierError {
    CourierError::invalid(format!("No job {id}"))
}

#[async_trait]
impl JobDirectory for MemoryJobDirectory {
    async fn job_count(&self) -> Result<u64> {
        self.injected(DirectoryOp::JobCount)?;
        Ok(self.state.lock().jobs.len() as u64)
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.injected(DirectoryOp::GetJob)?;
        self.job(id).ok_or_else(|| unknown_job(id))
    }

    async fn apply_to_job(
        &self,
        id: JobId,
        recipient: &ActorAddress,
        content_digest: ContentDigest,
    ) -> Result<()> {
        self.record(DirectoryCall::Apply {
            job: id,
            recipient: recipient.clone(),
            digest: content_digest,
        });
        self.injected(DirectoryOp::Apply)?;

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock();
        let stored = state.jobs.get_mut(&id).ok_or_else(|| unknown_job(id))?;
        if stored.job.state != JobState::Open {
            return Err(CourierError::state_conflict(id.0, "job is not open"));
        }
        if &stored.job.creator != recipient {
            return Err(CourierError::invalid("application must be addressed to the creator"));
        }
        if !stored.applicants.contains(&self.acting_as) {
            stored.applicants.push(self.acting_as.clone());
        }
        stored.job.revision += 1;
        Ok(())
    }

    async fn assign_job(&self, id: JobId, signature: &[u8]) -> Result<()> {
        self.record(DirectoryCall::Assign {
            job: id,
            signature: signature.to_vec(),
        });
        self.injected(DirectoryOp::Assign)?;

        let mut state = self.state.lock();
        let key = state
            .keys
            .get(&self.acting_as)
            .cloned()
            .ok_or_else(|| CourierError::missing_key(self.acting_as.to_string()))?;
        let stored = state.jobs.get_mut(&id).ok_or_else(|| unknown_job(id))?;
        if stored.job.state != JobState::Open || stored.job.multiple_applicants {
            return Err(CourierError::state_conflict(id.0, "job cannot be taken"));
        }
        if !stored.applicants.contains(&self.acting_as) {
            return Err(CourierError::state_conflict(id.0, "caller has not applied"));
        }
        let message = take_action_message(id, stored.job.revision);
        verify_signature(&key, &message, signature)?;

        stored.job.worker = Some(self.acting_as.clone());
        stored.job.state = JobState::Taken;
        stored.job.revision += 1;
        Ok(())
    }

    async fn deliver_result(&self, id: JobId, result_digest: ContentDigest) -> Result<()> {
        self.record(DirectoryCall::Deliver {
            job: id,
            digest: result_digest,
        });
        self.injected(DirectoryOp::Deliver)?;

        let mut state = self.state.lock();
        let stored = state.jobs.get_mut(&id).ok_or_else(|| unknown_job(id))?;
        if stored.job.state != JobState::Taken || !stored.job.is_assigned_to(&self.acting_as) {
            return Err(CourierError::state_conflict(id.0, "caller is not the active worker"));
        }
        stored.job.state = JobState::Delivered;
        stored.job.result_digest = Some(result_digest);
        stored.job.revision += 1;
        Ok(())
    }

    async fn is_registered(&self, address: &ActorAddress) -> Result<bool> {
        Ok(self.state.lock().keys.contains_key(address))
    }

    async fn public_key_of(&self, address: &ActorAddress) -> Result<Option<Vec<u8>>> {
        self.injected(DirectoryOp::PublicKeyOf)?;
        Ok(self
            .state
            .lock()
            .keys
            .get(address)
            .filter(|key| !key.is_empty())
            .cloned())
    }

    async fn register_identity(&self, public_key: &[u8], profile: &IdentityProfile) -> Result<()> {
        self.record(DirectoryCall::Register {
            public_key: public_key.to_vec(),
            profile: profile.clone(),
        });
        self.injected(DirectoryOp::Register)?;
        self.state
            .lock()
            .keys
            .insert(self.acting_as.clone(), public_key.to_vec());
        Ok(())
    }
}
