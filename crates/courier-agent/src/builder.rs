//! Agent builder
//!
//! Assembles the lifecycle manager from a [`CourierConfig`]. Every
//! collaborator defaults to its HTTP implementation and can be replaced,
//! which is how tests plug in the in-memory directory and store.
//!
//! ```rust,ignore
//! let agent = AgentBuilder::new(config).build()?;
//! agent.bootstrap_identity().await?;
//! agent.start().run_until(shutdown_signal()).await?;
//! ```

use crate::capabilities::CapabilityRegistry;
use crate::directory::RpcJobDirectory;
use crate::identity::{ensure_identity, IdentityStatus};
use crate::lifecycle::{LifecycleManager, LifecycleSettings};
use crate::runtime::{LifecycleRuntime, RuntimeIntervals};
use courier_core::{CourierConfig, CourierError, JobDirectory, Result, WorkerCapability};
use courier_crypto::{Ed25519Signer, EnvelopeCodec, NonceLength, SigningCapability};
use courier_store::{
    ContentPublisher, ContentStore, GatewayClient, GatewayFetcher, HttpGatewayClient,
    HttpPinningClient,
};
use std::sync::Arc;

/// Builder for a configured [`Agent`]
pub struct AgentBuilder {
    config: CourierConfig,
    directory: Option<Arc<dyn JobDirectory>>,
    publisher: Option<Arc<dyn ContentPublisher>>,
    gateway_client: Option<Arc<dyn GatewayClient>>,
    signer: Option<Arc<dyn SigningCapability>>,
    extra_capabilities: Vec<Arc<dyn WorkerCapability>>,
}

impl AgentBuilder {
    /// Builder over a loaded configuration
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            directory: None,
            publisher: None,
            gateway_client: None,
            signer: None,
            extra_capabilities: Vec::new(),
        }
    }

    /// Use this directory instead of the JSON-RPC client
    pub fn with_directory(mut self, directory: Arc<dyn JobDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use this publisher instead of the HTTP pinning client
    pub fn with_publisher(mut self, publisher: Arc<dyn ContentPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Use this gateway client instead of plain HTTP
    pub fn with_gateway_client(mut self, client: Arc<dyn GatewayClient>) -> Self {
        self.gateway_client = Some(client);
        self
    }

    /// Use this signer instead of the configured secret key
    pub fn with_signer(mut self, signer: Arc<dyn SigningCapability>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Register a capability after the configured ones
    pub fn with_capability(mut self, capability: Arc<dyn WorkerCapability>) -> Self {
        self.extra_capabilities.push(capability);
        self
    }

    /// Validate the configuration and assemble the agent
    pub fn build(self) -> Result<Agent> {
        let config = self.config;
        let signer: Arc<dyn SigningCapability> = match self.signer {
            Some(signer) => {
                config.validate_settings()?;
                signer
            }
            None => {
                config.validate()?;
                let secret = config.identity.secret_key.as_deref().ok_or_else(|| {
                    CourierError::configuration("identity.secret_key is required")
                })?;
                Arc::new(Ed25519Signer::from_hex(secret)?)
            }
        };

        let directory: Arc<dyn JobDirectory> = match self.directory {
            Some(directory) => directory,
            None => Arc::new(RpcJobDirectory::from_config(&config.directory)),
        };
        let publisher: Arc<dyn ContentPublisher> = match self.publisher {
            Some(publisher) => publisher,
            None => Arc::new(
                HttpPinningClient::new(
                    config.store.pin_endpoint.clone(),
                    config.store.pin_token.clone(),
                )
                .with_timeout(config.directory.request_timeout()),
            ),
        };
        let gateway_client: Arc<dyn GatewayClient> = match self.gateway_client {
            Some(client) => client,
            None => Arc::new(HttpGatewayClient::new()),
        };

        let nonce_len = NonceLength::try_from(config.store.nonce_len)?;
        let fetcher = GatewayFetcher::new(
            gateway_client,
            config.store.gateways.iter().cloned(),
            config.store.gateway_timeout(),
        );
        let store = ContentStore::new(
            publisher,
            fetcher,
            EnvelopeCodec::new(nonce_len),
            config.store.envelope_encoding,
        );

        let mut capabilities = CapabilityRegistry::from_config(&config)?;
        for capability in self.extra_capabilities {
            capabilities.register(capability)?;
        }
        let capability_names = capabilities.names();

        let manager = Arc::new(LifecycleManager::new(
            directory.clone(),
            store,
            signer.clone(),
            capabilities,
            LifecycleSettings::from_config(&config.lifecycle),
        ));

        tracing::info!(
            address = %signer.address(),
            capabilities = ?capability_names,
            gateways = config.store.gateways.len(),
            "Agent assembled"
        );
        Ok(Agent {
            config,
            directory,
            signer,
            manager,
        })
    }
}

/// A fully assembled agent
pub struct Agent {
    config: CourierConfig,
    directory: Arc<dyn JobDirectory>,
    signer: Arc<dyn SigningCapability>,
    manager: Arc<LifecycleManager>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("address", &self.signer.address())
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Lifecycle manager
    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    /// Make sure the directory publishes our key
    pub async fn bootstrap_identity(&self) -> Result<IdentityStatus> {
        ensure_identity(
            self.directory.as_ref(),
            self.signer.as_ref(),
            &self.config.identity,
        )
        .await
    }

    /// Start the poll timers
    pub fn start(&self) -> LifecycleRuntime {
        LifecycleRuntime::start(
            self.manager.clone(),
            RuntimeIntervals {
                discovery: self.config.lifecycle.discovery_interval(),
                active: self.config.lifecycle.active_interval(),
            },
        )
    }
}
