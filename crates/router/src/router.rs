//! The router: dispatches invocations to the owning server and keeps the
//! registry in step with server lifecycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use switchboard_config::RouterConfig;
use switchboard_core::{
    CapabilityDescriptor, Error, FailureKind, InvocationOutcome, InvocationRequest, ServerSpec,
};
use switchboard_servers::{Connector, HandleOptions, ServerHandle};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::registry::Registry;

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Used when a request carries no timeout of its own
    pub invocation_timeout: Duration,
    /// Pause before the reconnection attempt after a disconnect
    pub reconnect_backoff: Duration,
    pub handle: HandleOptions,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            invocation_timeout: Duration::from_secs(30),
            reconnect_backoff: Duration::from_millis(500),
            handle: HandleOptions::default(),
        }
    }
}

impl From<&RouterConfig> for RouterOptions {
    fn from(config: &RouterConfig) -> Self {
        let discovery = Duration::from_millis(config.discovery_timeout_ms);
        Self {
            invocation_timeout: Duration::from_millis(config.invocation_timeout_ms),
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
            handle: HandleOptions {
                handshake_timeout: discovery,
                discovery_timeout: discovery,
                max_transport_failures: config.max_transport_failures,
            },
        }
    }
}

/// Routes invocations by capability name.
pub struct Router {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    options: RouterOptions,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl Router {
    pub fn new(connector: Arc<dyn Connector>, options: RouterOptions) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            connector,
            options,
            supervisors: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Invoke the capability named by `request` on whichever server owns it.
    ///
    /// Never fails: an unknown name becomes an `UnknownCapability` outcome.
    pub async fn route(&self, request: &InvocationRequest) -> InvocationOutcome {
        let started = Instant::now();
        let handle = match self.registry.resolve(&request.capability).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    capability = %request.capability,
                    request_id = %request.request_id,
                    "Planner requested an unknown capability"
                );
                return InvocationOutcome::failure(
                    request,
                    FailureKind::UnknownCapability,
                    e.to_string(),
                    started.elapsed(),
                );
            }
        };
        let timeout = request.timeout().unwrap_or(self.options.invocation_timeout);
        handle.invoke(request, timeout).await
    }

    /// Connect, discover and register one server; returns the names it
    /// contributed.
    pub async fn connect(&self, spec: ServerSpec) -> Result<Vec<String>, Error> {
        let handle =
            ServerHandle::connect(spec, self.connector.as_ref(), self.options.handle.clone())
                .await?;

        let descriptors = match handle.discover(self.options.handle.discovery_timeout).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                handle.close();
                return Err(e.into());
            }
        };
        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        if let Err(e) = self.registry.register(handle.clone(), descriptors).await {
            handle.close();
            return Err(e.into());
        }

        info!(server = %handle.name(), capabilities = ?names, "Server attached");
        self.supervise(handle);
        Ok(names)
    }

    /// Connect every server in order. A server that fails (or collides with
    /// one connected earlier) is logged and left out; the rest carry on.
    pub async fn connect_all(&self, specs: &[ServerSpec]) -> Vec<(String, Result<Vec<String>, Error>)> {
        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = spec.name.clone();
            let result = self.connect(spec.clone()).await;
            if let Err(e) = &result {
                error!(server = %name, error = %e, "Failed to attach capability server");
            }
            results.push((name, result));
        }
        results
    }

    /// Watch `handle`; on disconnect, drop its capabilities and try once to
    /// bring it back.
    fn supervise(&self, handle: Arc<ServerHandle>) {
        let registry = self.registry.clone();
        let connector = self.connector.clone();
        let backoff = self.options.reconnect_backoff;

        let task = tokio::spawn(async move {
            loop {
                handle.wait_disconnected().await;
                let removed = registry.unregister(handle.id()).await;
                if handle.is_shutting_down() {
                    break;
                }
                warn!(
                    server = %handle.name(),
                    removed = ?removed,
                    "Server disconnected; capabilities withdrawn"
                );

                tokio::time::sleep(backoff).await;
                if handle.is_shutting_down() {
                    break;
                }

                let descriptors = match handle.reconnect(connector.as_ref()).await {
                    Ok(descriptors) => descriptors,
                    Err(e) => {
                        warn!(server = %handle.name(), error = %e, "Reconnection failed; server stays absent");
                        handle.close();
                        break;
                    }
                };
                if let Err(e) = registry.register(handle.clone(), descriptors).await {
                    warn!(server = %handle.name(), error = %e, "Reconnected server collides; dropping it");
                    handle.close();
                    break;
                }
                info!(server = %handle.name(), "Server capabilities restored");
            }
        });

        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Descriptors of every live capability, sorted by name.
    pub async fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.registry.descriptors().await
    }

    /// Close every server; nothing reconnects afterwards.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in self.registry.handles().await {
            handle.close();
            self.registry.unregister(handle.id()).await;
        }
        let tasks: Vec<JoinHandle<()>> = self
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            // supervisors of handles already dropped from the registry may
            // be sleeping on a backoff
            task.abort();
            let _ = task.await;
        }
        info!("Router shut down");
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        for task in self
            .supervisors
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::Listing;
    use switchboard_core::RequestId;
    use switchboard_servers::InProcessConnector;

    fn setup() -> (Arc<InProcessConnector>, Router) {
        setup_with_backoff(Duration::from_millis(10))
    }

    fn setup_with_backoff(backoff: Duration) -> (Arc<InProcessConnector>, Router) {
        let connector = Arc::new(InProcessConnector::new());
        let options = RouterOptions {
            reconnect_backoff: backoff,
            ..RouterOptions::default()
        };
        let router = Router::new(connector.clone(), options);
        (connector, router)
    }

    fn request(name: &str) -> InvocationRequest {
        InvocationRequest::new(RequestId::new(1, 1, 0), name, serde_json::Map::new(), 1)
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn routes_to_the_owning_server() {
        let (connector, router) = setup();
        connector.register("weather", Arc::new(Listing { server: "weather", names: vec!["get_weather"] }));
        connector.register("news", Arc::new(Listing { server: "news", names: vec!["get_news"] }));

        let results = router
            .connect_all(&[ServerSpec::in_process("weather"), ServerSpec::in_process("news")])
            .await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let outcome = router.route(&request("get_news")).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.summary(), "news:get_news");
    }

    #[tokio::test]
    async fn unknown_name_is_an_outcome_not_an_error() {
        let (_connector, router) = setup();
        let outcome = router.route(&request("teleport")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::UnknownCapability));
        assert_eq!(outcome.request_id.as_str(), "1.1.0");
    }

    #[tokio::test]
    async fn colliding_server_is_rejected_and_others_continue() {
        let (connector, router) = setup();
        connector.register("a", Arc::new(Listing { server: "a", names: vec!["x"] }));
        connector.register("b", Arc::new(Listing { server: "b", names: vec!["x"] }));
        connector.register("c", Arc::new(Listing { server: "c", names: vec!["y"] }));

        let results = router
            .connect_all(&[
                ServerSpec::in_process("a"),
                ServerSpec::in_process("b"),
                ServerSpec::in_process("c"),
                ServerSpec::in_process("missing"),
            ])
            .await;

        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(Error::NameCollision(_))));
        assert!(results[2].1.is_ok());
        assert!(matches!(results[3].1, Err(Error::Connection(_))));

        assert_eq!(router.route(&request("x")).await.summary(), "a:x");
        let names: Vec<String> = router.descriptors().await.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn disconnect_withdraws_then_reconnect_restores() {
        let (connector, router) = setup_with_backoff(Duration::from_millis(300));
        connector.register("news", Arc::new(Listing { server: "news", names: vec!["get_news"] }));
        router.connect(ServerSpec::in_process("news")).await.unwrap();

        connector.disconnect("news");
        wait_until(|| async { !router.registry().contains("get_news").await }).await;
        let outcome = router.route(&request("get_news")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::UnknownCapability));

        wait_until(|| async { router.registry().contains("get_news").await }).await;
        assert!(router.route(&request("get_news")).await.is_success());
    }

    #[tokio::test]
    async fn failed_reconnect_leaves_capabilities_absent() {
        let (connector, router) = setup();
        connector.register("news", Arc::new(Listing { server: "news", names: vec!["get_news"] }));
        connector.register("weather", Arc::new(Listing { server: "weather", names: vec!["get_weather"] }));
        router.connect(ServerSpec::in_process("news")).await.unwrap();
        router.connect(ServerSpec::in_process("weather")).await.unwrap();

        connector.remove("news");
        connector.disconnect("news");

        wait_until(|| async { !router.registry().contains("get_news").await }).await;
        // give the single reconnection attempt time to fail
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!router.registry().contains("get_news").await);
        assert!(router.registry().contains("get_weather").await);

        let outcome = router.route(&request("get_news")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::UnknownCapability));
    }

    #[tokio::test]
    async fn shutdown_closes_without_reconnecting() {
        let (connector, router) = setup();
        connector.register("utils", Arc::new(Listing { server: "utils", names: vec!["calculate"] }));
        router.connect(ServerSpec::in_process("utils")).await.unwrap();

        router.shutdown().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(router.registry().is_empty().await);
    }

    #[test]
    fn options_follow_config() {
        let config = RouterConfig {
            invocation_timeout_ms: 1_000,
            discovery_timeout_ms: 2_000,
            max_transport_failures: 5,
            reconnect_backoff_ms: 50,
        };
        let options = RouterOptions::from(&config);
        assert_eq!(options.invocation_timeout, Duration::from_secs(1));
        assert_eq!(options.handle.discovery_timeout, Duration::from_secs(2));
        assert_eq!(options.handle.max_transport_failures, 5);
        assert_eq!(options.reconnect_backoff, Duration::from_millis(50));
    }
}
