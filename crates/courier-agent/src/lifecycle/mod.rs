//! Job lifecycle manager
//!
//! Two timer-driven passes move jobs through the local state machine:
//!
//! - **Discovery** scans the most recent jobs, decides relevance, applies
//!   with a sealed message and, for single-applicant jobs, submits the
//!   signed take-action.
//! - **Active poll** follows applied and assigned jobs: it notices the
//!   creator's pick, executes the capability, delivers the sealed result,
//!   and drops jobs we lost or that closed.
//!
//! Each pass is single-flight: a tick that fires while the previous one of
//! the same kind is still running is skipped. Within a tick, a job is only
//! worked on under a per-job claim, so the two passes never race on it.
//! Local state changes only after the ledger confirmed the corresponding
//! mutation.

mod state;

pub use state::{ActiveJobRecord, ActiveStatus, JobPhase, LifecycleSnapshot};

use crate::capabilities::CapabilityRegistry;
use courier_core::{
    take_action_message, ActorAddress, ContentDigest, CourierError, ErrorSeverity, Job, JobDirectory,
    JobId, JobListing, JobState, LifecycleConfig, Result, WorkerCapability,
};
use courier_crypto::{derive_session_key, SessionKey, SigningCapability};
use courier_store::{ContentStore, PublishMetadata};
use parking_lot::Mutex;
use state::{JobClaim, LifecycleState, PendingJob};
use std::sync::Arc;

/// Relevance and scan settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Lowercased keywords
    pub keywords: Vec<String>,
    /// Number of most recent jobs each discovery tick inspects
    pub recent_jobs: u64,
}

impl LifecycleSettings {
    /// Settings from the `[lifecycle]` section
    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self::new(config.keywords.iter().map(String::as_str), config.recent_jobs)
    }

    /// Settings from explicit keywords
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a str>, recent_jobs: u64) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            recent_jobs,
        }
    }

    /// Whether any keyword occurs in the title, tags, or listing text
    pub fn matches_keywords(&self, job: &Job, listing: &JobListing) -> bool {
        let mut haystack = job.title.to_lowercase();
        for tag in &job.tags {
            haystack.push('\n');
            haystack.push_str(&tag.to_lowercase());
        }
        haystack.push('\n');
        haystack.push_str(&listing.searchable_text().to_lowercase());
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

/// Counts from one completed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Jobs looked at
    pub examined: usize,
    /// Jobs that moved forward (applied, taken, delivered)
    pub advanced: usize,
    /// Jobs whose processing failed this tick
    pub failed: usize,
}

/// Result of asking for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick of the same kind was still running
    Skipped,
    /// The tick ran to completion
    Completed(TickSummary),
}

/// Drives jobs from discovery to delivery for the local actor
pub struct LifecycleManager {
    directory: Arc<dyn JobDirectory>,
    store: ContentStore,
    signer: Arc<dyn SigningCapability>,
    capabilities: CapabilityRegistry,
    settings: LifecycleSettings,
    local: ActorAddress,
    state: Mutex<LifecycleState>,
    discovery_flight: tokio::sync::Mutex<()>,
    active_flight: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("local", &self.local)
            .field("capabilities", &self.capabilities)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Manager acting for `signer`
    pub fn new(
        directory: Arc<dyn JobDirectory>,
        store: ContentStore,
        signer: Arc<dyn SigningCapability>,
        capabilities: CapabilityRegistry,
        settings: LifecycleSettings,
    ) -> Self {
        let local = signer.address();
        Self {
            directory,
            store,
            signer,
            capabilities,
            settings,
            local,
            state: Mutex::new(LifecycleState::default()),
            discovery_flight: tokio::sync::Mutex::new(()),
            active_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Address the manager acts as
    pub fn local_address(&self) -> &ActorAddress {
        &self.local
    }

    /// Current phase of a job, if it was ever seen
    pub fn phase(&self, id: JobId) -> Option<JobPhase> {
        self.state.lock().phases.get(&id).copied()
    }

    /// Whether discovery will skip the job from now on
    pub fn is_processed(&self, id: JobId) -> bool {
        self.state.lock().processed.contains(&id)
    }

    /// Active record of a job assigned to us
    pub fn active_record(&self, id: JobId) -> Option<ActiveJobRecord> {
        self.state.lock().active.get(&id).cloned()
    }

    /// Copy of all bookkeeping
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.state.lock();
        LifecycleSnapshot {
            processed: state.processed.iter().copied().collect(),
            phases: state.phases.clone(),
            active: state.active.values().cloned().collect(),
        }
    }

    /// One discovery pass over the most recent jobs
    pub async fn discovery_tick(&self) -> Result<TickOutcome> {
        let Ok(_flight) = self.discovery_flight.try_lock() else {
            tracing::debug!("Discovery tick still running, skipping");
            return Ok(TickOutcome::Skipped);
        };

        let count = self.directory.job_count().await?;
        let first = count.saturating_sub(self.settings.recent_jobs);
        let mut summary = TickSummary::default();

        for raw in (first..count).rev() {
            let id = JobId(raw);
            if self.is_processed(id) {
                continue;
            }
            let Some(_claim) = JobClaim::acquire(&self.state, id) else {
                continue;
            };
            summary.examined += 1;
            match self.discover(id).await {
                Ok(true) => summary.advanced += 1,
                Ok(false) => {}
                Err(err) => {
                    summary.failed += 1;
                    self.handle_job_error(id, "discovery", &err);
                }
            }
        }

        tracing::debug!(
            job_count = count,
            examined = summary.examined,
            advanced = summary.advanced,
            failed = summary.failed,
            "Discovery tick finished"
        );
        Ok(TickOutcome::Completed(summary))
    }

    /// One pass over applied and assigned jobs
    pub async fn active_tick(&self) -> Result<TickOutcome> {
        let Ok(_flight) = self.active_flight.try_lock() else {
            tracing::debug!("Active poll still running, skipping");
            return Ok(TickOutcome::Skipped);
        };

        let ids: Vec<JobId> = {
            let state = self.state.lock();
            state
                .pending
                .keys()
                .chain(state.active.keys())
                .copied()
                .collect()
        };
        let mut summary = TickSummary::default();

        for id in ids {
            let Some(_claim) = JobClaim::acquire(&self.state, id) else {
                continue;
            };
            summary.examined += 1;
            match self.poll_active(id).await {
                Ok(true) => summary.advanced += 1,
                Ok(false) => {}
                Err(err) => {
                    summary.failed += 1;
                    self.handle_job_error(id, "active poll", &err);
                }
            }
        }

        if summary.examined > 0 {
            tracing::debug!(
                examined = summary.examined,
                advanced = summary.advanced,
                failed = summary.failed,
                "Active poll finished"
            );
        }
        Ok(TickOutcome::Completed(summary))
    }

    async fn discover(&self, id: JobId) -> Result<bool> {
        let job = self.directory.get_job(id).await?;
        self.state.lock().set_phase(id, JobPhase::Discovered);

        if job.state != JobState::Open || job.creator == self.local {
            self.mark_irrelevant(id);
            return Ok(false);
        }

        let listing = self.fetch_listing(&job).await?;
        if !self.settings.matches_keywords(&job, &listing) {
            tracing::debug!(job = %id, title = %job.title, "No keyword match");
            self.mark_irrelevant(id);
            return Ok(false);
        }
        let Some(capability) = self.capabilities.select(&job, &listing) else {
            tracing::debug!(job = %id, title = %job.title, "No capability accepts the job");
            self.mark_irrelevant(id);
            return Ok(false);
        };

        self.state.lock().set_phase(id, JobPhase::Relevant);
        tracing::info!(
            job = %id,
            title = %job.title,
            capability = capability.name(),
            "Relevant job found"
        );
        self.apply(job, listing, capability).await?;
        Ok(true)
    }

    async fn fetch_listing(&self, job: &Job) -> Result<JobListing> {
        if job.content_digest.is_zero() {
            return Ok(JobListing::default());
        }
        let bytes = self.store.retrieve_digest(&job.content_digest, None).await?;
        Ok(JobListing::parse(&bytes))
    }

    async fn apply(
        &self,
        job: Job,
        listing: JobListing,
        capability: Arc<dyn WorkerCapability>,
    ) -> Result<()> {
        let id = job.id;
        let key = match self.session_key(&job).await {
            Ok(key) => key,
            Err(err) => {
                self.state.lock().set_phase(id, JobPhase::Discovered);
                return Err(err);
            }
        };

        let message = capability.build_application_message(&job, &listing)?;
        let metadata = PublishMetadata::named(format!("job-{id}-application"))
            .with("job", id.to_string())
            .with("kind", "application");
        let published = self
            .store
            .publish(message.as_bytes(), Some(&key), &metadata)
            .await?;
        self.directory
            .apply_to_job(id, &job.creator, published.digest)
            .await?;

        {
            let mut state = self.state.lock();
            state.processed.insert(id);
            state.missing_key_logged.remove(&id);
            state.set_phase(id, JobPhase::Applied);
            state.pending.insert(
                id,
                PendingJob {
                    listing,
                    capability: capability.name().to_string(),
                    take_pending: !job.multiple_applicants,
                },
            );
            if job.multiple_applicants {
                state.set_phase(id, JobPhase::AwaitingAssignment);
            }
        }
        tracing::info!(job = %id, locator = %published.locator, "Applied to job");

        if job.multiple_applicants {
            return Ok(());
        }
        self.take(id).await
    }

    async fn take(&self, id: JobId) -> Result<()> {
        let mut job = self.directory.get_job(id).await?;
        if job.is_assigned_to(&self.local) && job.state.is_actionable() {
            return self.activate(job);
        }
        if job.state != JobState::Open {
            return Err(CourierError::state_conflict(
                id.0,
                format!("job is {} before take-action", job.state),
            ));
        }

        let signature = self.signer.sign(&take_action_message(id, job.revision));
        self.directory.assign_job(id, &signature).await?;
        tracing::info!(job = %id, revision = job.revision, "Took job");

        job.worker = Some(self.local.clone());
        job.state = JobState::Taken;
        job.revision += 1;
        self.activate(job)
    }

    fn activate(&self, job: Job) -> Result<()> {
        let id = job.id;
        let mut state = self.state.lock();
        let pending = state.pending.remove(&id).ok_or_else(|| {
            CourierError::internal(format!("Job {id} assigned without a pending application"))
        })?;
        state.set_phase(id, JobPhase::Taken);
        state.active.insert(
            id,
            ActiveJobRecord::started(job, pending.listing, pending.capability),
        );
        Ok(())
    }

    async fn poll_active(&self, id: JobId) -> Result<bool> {
        let job = self.directory.get_job(id).await?;

        let pending = self.state.lock().pending.get(&id).cloned();
        if let Some(pending) = pending {
            if job.is_assigned_to(&self.local) && job.state.is_actionable() {
                tracing::info!(job = %id, "Creator assigned the job to us");
                self.activate(job.clone())?;
            } else if job.state == JobState::Open {
                if pending.take_pending {
                    self.take(id).await?;
                    return Ok(true);
                }
                return Ok(false);
            } else {
                self.abandon(id, &format!("job is {} and assigned elsewhere", job.state));
                return Ok(false);
            }
        }

        let Some(mut record) = self.active_record(id) else {
            return Ok(false);
        };

        if !job.is_assigned_to(&self.local) || !job.state.is_actionable() {
            let completed = job.state == JobState::Completed
                && record.status == ActiveStatus::Delivered
                && job.is_assigned_to(&self.local);
            if completed {
                let mut state = self.state.lock();
                state.active.remove(&id);
                tracing::info!(job = %id, "Delivered job completed");
            } else if job.state.is_closed() {
                self.abandon(id, &format!("job was closed as {}", job.state));
            } else {
                self.abandon(id, &format!("job is {} and assigned elsewhere", job.state));
            }
            return Ok(false);
        }

        let on_ledger = job.result_digest.is_some();
        record.job = job;
        if on_ledger && record.status != ActiveStatus::Delivered {
            record.status = ActiveStatus::Delivered;
            self.store_record(record, JobPhase::Delivered);
            return Ok(false);
        }
        if record.job.state != JobState::Taken || !record.status.needs_delivery() {
            self.state.lock().active.insert(id, record);
            return Ok(false);
        }

        self.deliver(record).await?;
        Ok(true)
    }

    async fn deliver(&self, mut record: ActiveJobRecord) -> Result<()> {
        let id = record.job.id;
        record.status = ActiveStatus::Executing;
        record.delivery_attempts += 1;
        self.store_record(record.clone(), JobPhase::Executing);

        match self.execute_and_deliver(&mut record).await {
            Ok(digest) => {
                tracing::info!(
                    job = %id,
                    %digest,
                    attempts = record.delivery_attempts,
                    "Result delivered"
                );
                record.status = ActiveStatus::Delivered;
                self.store_record(record, JobPhase::Delivered);
                Ok(())
            }
            Err(err) => {
                record.status = ActiveStatus::DeliveryFailed;
                self.store_record(record, JobPhase::Executing);
                Err(err)
            }
        }
    }

    async fn execute_and_deliver(&self, record: &mut ActiveJobRecord) -> Result<ContentDigest> {
        let job = record.job.clone();
        let digest = match record.result_digest {
            Some(digest) => digest,
            None => {
                let packaged = match record.packaged_result.clone() {
                    Some(packaged) => packaged,
                    None => {
                        let capability =
                            self.capabilities.get(&record.capability).ok_or_else(|| {
                                CourierError::internal(format!(
                                    "Capability '{}' is no longer registered",
                                    record.capability
                                ))
                            })?;
                        let raw = capability.execute(&job, &record.listing).await?;
                        let packaged = capability.package_result(&job, &record.listing, &raw)?;
                        record.packaged_result = Some(packaged.clone());
                        packaged
                    }
                };

                let key = self.session_key(&job).await?;
                let metadata = PublishMetadata::named(format!("job-{}-result", job.id))
                    .with("job", job.id.to_string())
                    .with("kind", "result");
                let published = self
                    .store
                    .publish(packaged.as_bytes(), Some(&key), &metadata)
                    .await?;
                record.result_digest = Some(published.digest);
                published.digest
            }
        };

        self.directory.deliver_result(job.id, digest).await?;
        Ok(digest)
    }

    async fn session_key(&self, job: &Job) -> Result<SessionKey> {
        let creator_key = self
            .directory
            .public_key_of(&job.creator)
            .await?
            .ok_or_else(|| CourierError::missing_key(job.creator.to_string()))?;
        derive_session_key(
            self.signer.as_ref(),
            &creator_key,
            &job.id.conversation_id(),
        )
    }

    fn store_record(&self, record: ActiveJobRecord, phase: JobPhase) {
        let id = record.job.id;
        let mut state = self.state.lock();
        state.set_phase(id, phase);
        state.active.insert(id, record);
    }

    fn mark_irrelevant(&self, id: JobId) {
        let mut state = self.state.lock();
        state.processed.insert(id);
        state.set_phase(id, JobPhase::Irrelevant);
    }

    fn abandon(&self, id: JobId, reason: &str) {
        {
            let mut state = self.state.lock();
            state.pending.remove(&id);
            state.active.remove(&id);
            state.processed.insert(id);
            state.set_phase(id, JobPhase::Abandoned);
        }
        tracing::info!(job = %id, reason, "Job abandoned");
    }

    fn handle_job_error(&self, id: JobId, stage: &str, err: &CourierError) {
        match err {
            CourierError::StateConflict { .. } => self.abandon(id, &err.to_string()),
            CourierError::MissingKey { address } => {
                let first = self.state.lock().missing_key_logged.insert(id);
                if first {
                    tracing::warn!(job = %id, creator = %address, "Creator has no published key; skipping job");
                } else {
                    tracing::debug!(job = %id, creator = %address, "Creator still has no published key");
                }
            }
            _ => match err.severity() {
                ErrorSeverity::Low => tracing::debug!(job = %id, stage, error = %err, "Job step failed"),
                ErrorSeverity::Medium => tracing::warn!(job = %id, stage, error = %err, "Job step failed"),
                ErrorSeverity::High | ErrorSeverity::Critical => {
                    tracing::error!(job = %id, stage, error = %err, "Job step failed")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_testkit::{test_signer, JobBuilder};

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let settings = LifecycleSettings::new(["Bot", " ", "scraper"], 20);
        assert_eq!(settings.keywords, vec!["bot", "scraper"]);

        let job = JobBuilder::new(test_signer(1).address())
            .title("Need a Discord BOT")
            .build();
        assert!(settings.matches_keywords(&job, &JobListing::default()));

        let job = JobBuilder::new(test_signer(1).address())
            .title("Logo design")
            .build();
        assert!(!settings.matches_keywords(&job, &JobListing::default()));

        let listing = JobListing {
            description: "a web scraper for prices".into(),
            ..Default::default()
        };
        assert!(settings.matches_keywords(&job, &listing));
    }

    #[test]
    fn test_tags_count_for_relevance() {
        let settings = LifecycleSettings::new(["bot"], 20);
        let job = JobBuilder::new(test_signer(1).address())
            .title("Automation")
            .tags(&["telegram-bot"])
            .build();
        assert!(settings.matches_keywords(&job, &JobListing::default()));
    }
}
