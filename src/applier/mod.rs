//! Delta appliers.
//!
//! Push update records into a running application. The variant is picked
//! once from the runtime shape:
//!
//! | Profile   | Channel(s)                                  |
//! |-----------|---------------------------------------------|
//! | `process` | in-process agent                            |
//! | `browser` | browser clients over WebSocket              |
//! | `hosted`  | server agent and browser clients, together  |
//!
//! A rejected batch is `Ok(false)`; errors are reserved for transport
//! failures.

mod agent;
mod browser;


pub use agent::AgentClient;
pub use browser::BrowserHub;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::capabilities::CapabilityQuery;
use crate::core::{CapabilitySet, ProjectGraph, UpdateRecord};
use crate::error::{HotReloadError, Result, TransportError};

/// Shape of the running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeProfile {
    Process,
    Browser,
    Hosted,
}

impl RuntimeProfile {
    pub fn name(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Browser => "browser",
            Self::Hosted => "hosted",
        }
    }
}

impl fmt::Display for RuntimeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport into one running target.
///
/// Channels outlive the appliers built on them: whoever starts a channel
/// shuts it down, so a rebuilt session can attach to the same one.
#[async_trait]
pub trait DeltaChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), TransportError>;

    async fn capabilities(&self) -> Result<CapabilitySet, TransportError>;

    /// Push one batch. `Ok(false)` when the target rejects it.
    async fn apply(&self, updates: &[UpdateRecord]) -> Result<bool, TransportError>;
}

/// Lifecycle wrapper around a single channel.
pub struct ChannelApplier {
    channel: Arc<dyn DeltaChannel>,
    connected: OnceCell<()>,
    disposed: AtomicBool,
}

impl ChannelApplier {
    pub fn new(channel: Arc<dyn DeltaChannel>) -> Self {
        Self {
            channel,
            connected: OnceCell::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.channel.name()
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.name()));
        }
        self.connected
            .get_or_try_init(|| self.channel.connect(cancel))
            .await?;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), TransportError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(TransportError::Closed(self.name()))
        } else if self.connected.initialized() {
            Ok(())
        } else {
            Err(TransportError::NotConnected(self.name()))
        }
    }

    async fn capabilities(&self) -> Result<CapabilitySet, TransportError> {
        self.ensure_ready()?;
        self.channel.capabilities().await
    }

    async fn apply(&self, updates: &[UpdateRecord]) -> Result<bool, TransportError> {
        self.ensure_ready()?;
        self.channel.apply(updates).await
    }

    /// Detach from the channel. The channel itself stays open.
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            crate::debug!("applier"; "detached from {}", self.name());
        }
    }
}

/// Applier variant selected by [`RuntimeProfile`].
pub enum DeltaApplier {
    Process(ChannelApplier),
    Browser(ChannelApplier),
    Hosted {
        server: ChannelApplier,
        client: ChannelApplier,
    },
}

impl DeltaApplier {
    pub fn profile(&self) -> RuntimeProfile {
        match self {
            Self::Process(_) => RuntimeProfile::Process,
            Self::Browser(_) => RuntimeProfile::Browser,
            Self::Hosted { .. } => RuntimeProfile::Hosted,
        }
    }

    /// Connect the channel(s). Safe to call more than once.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        match self {
            Self::Process(channel) | Self::Browser(channel) => channel.initialize(cancel).await?,
            Self::Hosted { server, client } => {
                let (server, client) =
                    tokio::join!(server.initialize(cancel), client.initialize(cancel));
                server?;
                client?;
            }
        }
        Ok(())
    }

    /// Capabilities of the target. A hosted pair supports what both sides do.
    pub async fn capabilities(&self) -> Result<CapabilitySet> {
        let capabilities = match self {
            Self::Process(channel) | Self::Browser(channel) => channel.capabilities().await?,
            Self::Hosted { server, client } => {
                let (server, client) = tokio::join!(server.capabilities(), client.capabilities());
                server?.intersect(&client?)
            }
        };
        Ok(capabilities)
    }

    /// Push the whole batch as one unit. An empty batch trivially succeeds.
    pub async fn apply(
        &self,
        updates: &[UpdateRecord],
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if updates.is_empty() {
            return Ok(true);
        }
        let push = async {
            match self {
                Self::Process(channel) | Self::Browser(channel) => channel.apply(updates).await,
                Self::Hosted { server, client } => {
                    let (server, client) =
                        tokio::join!(server.apply(updates), client.apply(updates));
                    Ok(server? & client?)
                }
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(HotReloadError::Cancelled),
            applied = push => Ok(applied?),
        }
    }

    /// Detach from the channel(s). Safe to call more than once.
    pub async fn dispose(&self) {
        match self {
            Self::Process(channel) | Self::Browser(channel) => channel.dispose(),
            Self::Hosted { server, client } => {
                server.dispose();
                client.dispose();
            }
        }
    }
}

#[async_trait]
impl CapabilityQuery for DeltaApplier {
    async fn query_capabilities(&self, _cancel: &CancellationToken) -> anyhow::Result<CapabilitySet> {
        Ok(self.capabilities().await?)
    }
}

/// Builds appliers from the configured channels.
#[derive(Clone, Default)]
pub struct ApplierFactory {
    profile: Option<RuntimeProfile>,
    agent: Option<Arc<dyn DeltaChannel>>,
    browser: Option<Arc<dyn DeltaChannel>>,
}

impl ApplierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a profile instead of inferring it from the project graph.
    pub fn with_profile(mut self, profile: Option<RuntimeProfile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_agent(mut self, channel: Arc<dyn DeltaChannel>) -> Self {
        self.agent = Some(channel);
        self
    }

    pub fn with_browser(mut self, channel: Arc<dyn DeltaChannel>) -> Self {
        self.browser = Some(channel);
        self
    }

    pub fn profile_for(&self, graph: &ProjectGraph) -> RuntimeProfile {
        self.profile
            .unwrap_or_else(|| crate::project::infer_profile(graph))
    }

    pub fn create(&self, graph: &ProjectGraph) -> Result<DeltaApplier> {
        let applier = match self.profile_for(graph) {
            RuntimeProfile::Process => DeltaApplier::Process(self.channel(&self.agent, "agent")?),
            RuntimeProfile::Browser => {
                DeltaApplier::Browser(self.channel(&self.browser, "browser")?)
            }
            RuntimeProfile::Hosted => DeltaApplier::Hosted {
                server: self.channel(&self.agent, "agent")?,
                client: self.channel(&self.browser, "browser")?,
            },
        };
        Ok(applier)
    }

    fn channel(
        &self,
        channel: &Option<Arc<dyn DeltaChannel>>,
        name: &str,
    ) -> Result<ChannelApplier> {
        channel
            .as_ref()
            .map(|channel| ChannelApplier::new(Arc::clone(channel)))
            .ok_or_else(|| {
                HotReloadError::Backend(anyhow::anyhow!("no {name} channel is configured"))
            })
    }
}
