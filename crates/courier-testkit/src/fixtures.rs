//! Deterministic signers, job builders and a scripted capability

use async_trait::async_trait;
use courier_core::{
    ActorAddress, ContentDigest, CourierError, Job, JobId, JobListing, JobState, Result,
    WorkerCapability,
};
use courier_crypto::Ed25519Signer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Signer whose seed is `seed` repeated 32 times
pub fn test_signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::from_seed([seed; 32])
}

/// JSON listing body
pub fn listing_bytes(title: &str, description: &str, tags: &[&str]) -> Vec<u8> {
    serde_json::json!({
        "title": title,
        "description": description,
        "tags": tags,
    })
    .to_string()
    .into_bytes()
}

/// Builder for ledger jobs
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// Open, single-applicant job posted by `creator`
    pub fn new(creator: ActorAddress) -> Self {
        Self {
            job: Job {
                id: JobId(0),
                state: JobState::Open,
                creator,
                worker: None,
                multiple_applicants: false,
                tags: Vec::new(),
                content_digest: ContentDigest::from_bytes([0u8; 32]),
                title: String::new(),
                revision: 0,
                result_digest: None,
            },
        }
    }

    /// Set the title
    pub fn title(mut self, title: &str) -> Self {
        self.job.title = title.to_string();
        self
    }

    /// Set the tags
    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.job.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Let the creator pick among applicants
    pub fn multiple_applicants(mut self) -> Self {
        self.job.multiple_applicants = true;
        self
    }

    /// Point at a stored listing
    pub fn listing(mut self, digest: ContentDigest) -> Self {
        self.job.content_digest = digest;
        self
    }

    /// Set the ledger state
    pub fn state(mut self, state: JobState) -> Self {
        self.job.state = state;
        self
    }

    /// Finish
    pub fn build(self) -> Job {
        self.job
    }
}

/// Capability with scripted output that counts its executions
#[derive(Debug)]
pub struct ScriptedCapability {
    name: String,
    tag: Option<String>,
    output: String,
    failures: Mutex<Vec<CourierError>>,
    executions: AtomicUsize,
}

impl ScriptedCapability {
    /// Capability returning `output` for every job
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: None,
            output: output.to_string(),
            failures: Mutex::new(Vec::new()),
            executions: AtomicUsize::new(0),
        }
    }

    /// Only match jobs carrying `tag`
    pub fn only_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Fail the next execution
    pub fn fail_next(&self, error: CourierError) {
        self.failures.lock().push(error);
    }

    /// Number of executions started
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerCapability for ScriptedCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, job: &Job, listing: &JobListing) -> bool {
        match &self.tag {
            None => true,
            Some(tag) => job.tags.iter().chain(listing.tags.iter()).any(|t| t == tag),
        }
    }

    fn build_application_message(&self, job: &Job, _listing: &JobListing) -> Result<String> {
        Ok(format!("{} applying for job {}", self.name, job.id))
    }

    async fn execute(&self, _job: &Job, _listing: &JobListing) -> Result<String> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop() {
            return Err(error);
        }
        Ok(self.output.clone())
    }

    fn package_result(&self, job: &Job, _listing: &JobListing, result: &str) -> Result<String> {
        Ok(format!("result for job {}: {result}", job.id))
    }
}
