//! Runtime capability negotiation.
//!
//! Resolves, once per run, which update kinds the target runtime accepts.
//! Negotiation never fails: any error, timeout or cancellation degrades to
//! [`CapabilitySet::defaults`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use crate::core::CapabilitySet;
use crate::report::SharedReporter;

const MODULE: &str = "capabilities";

/// Shared, clonable handle to a capability resolution in flight.
pub type CapabilityFuture = Shared<BoxFuture<'static, CapabilitySet>>;

/// Asks a running target which capabilities it supports.
#[async_trait]
pub trait CapabilityQuery: Send + Sync {
    async fn query_capabilities(&self, cancel: &CancellationToken) -> anyhow::Result<CapabilitySet>;
}

/// Already-resolved capability future.
pub fn resolved(capabilities: CapabilitySet) -> CapabilityFuture {
    futures::future::ready(capabilities).boxed().shared()
}

/// Bounded capability negotiation with a safe fallback.
#[derive(Clone)]
pub struct CapabilityNegotiator {
    timeout: Duration,
    reporter: SharedReporter,
}

impl CapabilityNegotiator {
    pub fn new(timeout: Duration, reporter: SharedReporter) -> Self {
        Self { timeout, reporter }
    }

    /// Await `query`, falling back to the default set on failure, timeout
    /// or cancellation.
    pub async fn negotiate<F>(&self, query: F, cancel: &CancellationToken) -> CapabilitySet
    where
        F: Future<Output = anyhow::Result<CapabilitySet>>,
    {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(anyhow::anyhow!("negotiation cancelled")),
            result = tokio::time::timeout(self.timeout, query) => match result {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "runtime did not answer within {}ms",
                    self.timeout.as_millis()
                )),
            },
        };

        match outcome {
            Ok(capabilities) => {
                self.reporter.verbose(
                    MODULE,
                    &format!("🔥 Hot reload capabilities: {capabilities}."),
                );
                capabilities
            }
            Err(err) => {
                let fallback = CapabilitySet::defaults();
                self.reporter.verbose(
                    MODULE,
                    &format!("Failed to read capabilities: {err:#}. Using {fallback}."),
                );
                fallback
            }
        }
    }

    /// Start negotiating against `target` and return a shared handle that
    /// any number of consumers may await.
    pub fn resolve(
        &self,
        target: Arc<dyn CapabilityQuery>,
        cancel: CancellationToken,
    ) -> CapabilityFuture {
        let negotiator = self.clone();
        async move {
            negotiator
                .negotiate(target.query_capabilities(&cancel), &cancel)
                .await
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Level, MemoryReporter};

    fn negotiator(timeout_ms: u64) -> (CapabilityNegotiator, Arc<MemoryReporter>) {
        let reporter = MemoryReporter::new();
        (
            CapabilityNegotiator::new(Duration::from_millis(timeout_ms), reporter.clone()),
            reporter,
        )
    }

    #[tokio::test]
    async fn test_success_dedupes_and_logs_verbose() {
        let (negotiator, reporter) = negotiator(1000);
        let caps = negotiator
            .negotiate(
                async { Ok(CapabilitySet::parse("Baseline AddMethodToExistingType Baseline")) },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(caps.len(), 2);
        let verbose = reporter.messages(Level::Verbose);
        assert_eq!(verbose.len(), 1);
        assert!(verbose[0].contains("Baseline AddMethodToExistingType"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_defaults() {
        let (negotiator, reporter) = negotiator(1000);
        let caps = negotiator
            .negotiate(
                async { Err(anyhow::anyhow!("agent refused")) },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(caps, CapabilitySet::defaults());
        assert!(reporter.contains("agent refused"));
        assert!(reporter.messages(Level::Warning).is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_defaults() {
        let (negotiator, _) = negotiator(20);
        let caps = negotiator
            .negotiate(
                std::future::pending::<anyhow::Result<CapabilitySet>>(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(caps, CapabilitySet::defaults());
    }

    #[tokio::test]
    async fn test_cancellation_falls_back_to_defaults() {
        let (negotiator, _) = negotiator(60_000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let caps = negotiator
            .negotiate(std::future::pending::<anyhow::Result<CapabilitySet>>(), &cancel)
            .await;
        assert_eq!(caps, CapabilitySet::defaults());
    }

    struct Counting(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl CapabilityQuery for Counting {
        async fn query_capabilities(&self, _: &CancellationToken) -> anyhow::Result<CapabilitySet> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(CapabilitySet::new(["Baseline"]))
        }
    }

    #[tokio::test]
    async fn test_resolve_queries_once_for_all_consumers() {
        let (negotiator, _) = negotiator(1000);
        let target = Arc::new(Counting(Default::default()));
        let future = negotiator.resolve(target.clone(), CancellationToken::new());

        let (a, b) = tokio::join!(future.clone(), future);
        assert_eq!(a, b);
        assert_eq!(target.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
