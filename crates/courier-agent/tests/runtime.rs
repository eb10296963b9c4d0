//! Assembled agent driven by its timers
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use courier_agent::{AgentBuilder, IdentityStatus, JobPhase, RuntimeExit};
use courier_core::{
    CourierConfig, CourierError, Job, JobId, JobListing, JobState, Result, WorkerCapability,
};
use courier_crypto::{derive_session_key, Ed25519Signer, EnvelopeCodec, SigningCapability};
use courier_testkit::{
    listing_bytes, test_signer, JobBuilder, MemoryContentStore, MemoryJobDirectory,
    ScriptedCapability,
};
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[directory]
rpc_url = "http://directory.invalid"

[store]
gateways = ["mem://primary/", "mem://backup/"]
gateway_timeout_ms = 500

[lifecycle]
keywords = ["bot"]
discovery_interval_secs = 30
active_interval_secs = 20
capabilities = ["template"]

[capabilities.template]
tags = ["discord"]
"#;

struct World {
    worker: Arc<Ed25519Signer>,
    creator: Ed25519Signer,
    directory: Arc<MemoryJobDirectory>,
    content: Arc<MemoryContentStore>,
}

impl World {
    fn new() -> Self {
        let worker = Arc::new(test_signer(1));
        let creator = test_signer(2);
        let directory = Arc::new(MemoryJobDirectory::new(worker.address()));
        directory.register_key(worker.address(), worker.verifying_key().to_vec());
        directory.register_key(creator.address(), creator.verifying_key().to_vec());
        Self {
            worker,
            creator,
            directory,
            content: MemoryContentStore::new(),
        }
    }

    fn builder(&self) -> AgentBuilder {
        AgentBuilder::new(CourierConfig::from_toml_str(CONFIG).unwrap())
            .with_directory(self.directory.clone())
            .with_publisher(self.content.clone())
            .with_gateway_client(self.content.clone())
            .with_signer(self.worker.clone())
    }

    fn post(&self, title: &str, tags: &[&str]) -> JobId {
        let listing = self.content.put(&listing_bytes(title, "", tags));
        self.directory.post(
            JobBuilder::new(self.creator.address())
                .title(title)
                .tags(tags)
                .listing(listing)
                .build(),
        )
    }

    fn delivered_result(&self, id: JobId) -> String {
        let job = self.directory.job(id).unwrap();
        assert_eq!(job.state, JobState::Delivered);
        let key = derive_session_key(
            &self.creator,
            &self.worker.verifying_key(),
            &id.conversation_id(),
        )
        .unwrap();
        let blob = self.content.object(&job.result_digest.unwrap()).unwrap();
        String::from_utf8(EnvelopeCodec::default().open_bytes(&blob, &key).unwrap()).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_timers_take_and_deliver_until_shutdown() {
    let world = World::new();
    let discord = world.post("Discord moderation bot", &["discord"]);
    let scraper = world.post("Price scraper bot", &["scraping"]);

    let agent = world
        .builder()
        .with_capability(Arc::new(ScriptedCapability::new("scripted", "prices.csv")))
        .build()
        .unwrap();
    assert_eq!(
        agent.bootstrap_identity().await.unwrap(),
        IdentityStatus::AlreadyRegistered
    );

    let exit = agent
        .start()
        .with_shutdown_grace(Duration::from_secs(1))
        .run_until(tokio::time::sleep(Duration::from_secs(65)))
        .await
        .unwrap();
    assert_eq!(exit, RuntimeExit::Signal);

    let templated: serde_json::Value =
        serde_json::from_str(&world.delivered_result(discord)).unwrap();
    assert_eq!(templated["capability"], "template");
    assert_eq!(templated["jobId"], discord.0);

    assert_eq!(
        world.delivered_result(scraper),
        format!("result for job {scraper}: prices.csv")
    );
    assert_eq!(agent.manager().phase(scraper), Some(JobPhase::Delivered));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_lets_an_in_flight_application_finish() {
    let world = World::new();
    let id = world.post("Discord moderation bot", &["discord"]);
    let gate = world.directory.hold_applications();
    let agent = world.builder().build().unwrap();

    let releaser = gate.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        releaser.release();
    });

    // Shut down while the application is waiting on the ledger.
    let exit = agent
        .start()
        .with_shutdown_grace(Duration::from_secs(5))
        .run_until(async move { gate.entered().await })
        .await
        .unwrap();
    assert_eq!(exit, RuntimeExit::Signal);

    assert_eq!(world.directory.application_count(id), 1);
    assert_eq!(world.directory.applicants(id), vec![world.worker.address()]);
    assert!(world.directory.job(id).unwrap().is_assigned_to(&world.worker.address()));
    assert_eq!(agent.manager().phase(id), Some(JobPhase::Taken));
    assert!(agent.manager().is_processed(id));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(world.directory.application_count(id), 1);
    assert_eq!(world.directory.delivery_count(id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_application_aborted_past_grace_is_not_recorded() {
    let world = World::new();
    let id = world.post("Discord moderation bot", &["discord"]);
    let gate = world.directory.hold_applications();
    let agent = world.builder().build().unwrap();

    // Never released: shutdown has to abort the held call.
    let exit = agent
        .start()
        .with_shutdown_grace(Duration::from_secs(1))
        .run_until(async move { gate.entered().await })
        .await
        .unwrap();
    assert_eq!(exit, RuntimeExit::Signal);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(world.directory.application_count(id), 1);
    assert!(world.directory.applicants(id).is_empty());
    assert_eq!(agent.manager().phase(id), Some(JobPhase::Relevant));
    assert!(!agent.manager().is_processed(id));
    assert!(agent.manager().active_record(id).is_none());

    // The next run picks the job up from scratch.
    agent.manager().discovery_tick().await.unwrap();
    assert_eq!(world.directory.applicants(id), vec![world.worker.address()]);
    assert_eq!(agent.manager().phase(id), Some(JobPhase::Taken));
}

struct PanickingCapability;

#[async_trait]
impl WorkerCapability for PanickingCapability {
    fn name(&self) -> &str {
        "panicking"
    }

    fn matches(&self, _job: &Job, _listing: &JobListing) -> bool {
        true
    }

    fn build_application_message(&self, _job: &Job, _listing: &JobListing) -> Result<String> {
        Ok("hello".to_string())
    }

    async fn execute(&self, _job: &Job, _listing: &JobListing) -> Result<String> {
        panic!("capability blew up");
    }

    fn package_result(&self, _job: &Job, _listing: &JobListing, result: &str) -> Result<String> {
        Ok(result.to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_timer_task_stops_the_runtime() {
    let world = World::new();
    world.post("Telegram bot", &[]);

    // The template capability only takes discord jobs, so this one panics.
    let agent = world
        .builder()
        .with_capability(Arc::new(PanickingCapability))
        .build()
        .unwrap();

    let err = agent
        .start()
        .with_shutdown_grace(Duration::from_secs(1))
        .run_until(std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::Internal { .. }));
    assert!(err.to_string().contains("active-poll"));
}

#[tokio::test]
async fn test_unknown_capability_name_fails_build() {
    let world = World::new();
    let mut config = CourierConfig::from_toml_str(CONFIG).unwrap();
    config.lifecycle.capabilities = vec!["summarizer".to_string()];

    let err = AgentBuilder::new(config)
        .with_directory(world.directory.clone())
        .with_publisher(world.content.clone())
        .with_gateway_client(world.content.clone())
        .with_signer(world.worker.clone())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("summarizer"));
}
