//! Server handles: one connected capability server.
//!
//! A handle owns the transport to its server and the descriptors the server
//! advertised. `invoke` never returns an error: every way a call can go
//! wrong is folded into the `InvocationOutcome` the loop records.
//!
//! Lifecycle:
//!
//! ```text
//! connect ──► Discovering ──discover──► Ready
//!                  ▲                      │ transport closed, or
//!                  │ reconnect            │ too many transport failures
//!                  └──── Disconnected ◄───┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use switchboard_core::error::{ConnectionError, DiscoveryError, TransportError};
use switchboard_core::protocol::{
    DiscoveryListing, HandshakeInfo, KIND_UNKNOWN_CAPABILITY, PROTOCOL_VERSION, RequestBody,
    ResponseStatus,
};
use switchboard_core::{
    CapabilityDescriptor, Error, FailureKind, InvocationOutcome, InvocationRequest, ServerSpec,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::transport::{Transport, wait_closed};

/// Name sent in the handshake.
const CLIENT_NAME: &str = "switchboard";

/// Identity of a handle; stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Discovering,
    Ready,
    Disconnected,
}

/// Tuning for handle connection and failure accounting.
#[derive(Debug, Clone)]
pub struct HandleOptions {
    pub handshake_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Consecutive transport failures before the handle gives up
    pub max_transport_failures: u32,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(10),
            max_transport_failures: 3,
        }
    }
}

pub struct ServerHandle {
    id: HandleId,
    spec: ServerSpec,
    options: HandleOptions,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Bumped on every transport swap so stale close watchers can tell
    generation: AtomicU64,
    descriptors: RwLock<Vec<CapabilityDescriptor>>,
    state: watch::Sender<HandleState>,
    failures: AtomicU32,
    shutting_down: AtomicBool,
    serial: Option<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("id", &self.id)
            .field("server", &self.spec.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ServerHandle {
    /// Open a transport for `spec` and complete the handshake.
    ///
    /// The returned handle is `Discovering`; call [`discover`](Self::discover)
    /// before routing to it.
    pub async fn connect(
        spec: ServerSpec,
        connector: &dyn Connector,
        options: HandleOptions,
    ) -> Result<Arc<Self>, ConnectionError> {
        let transport = open_and_handshake(&spec, connector, options.handshake_timeout).await?;
        let (state, _) = watch::channel(HandleState::Discovering);
        let serial = spec.serialize_requests.then(|| tokio::sync::Mutex::new(()));

        let handle = Arc::new(Self {
            id: HandleId::next(),
            spec,
            options,
            transport: RwLock::new(None),
            generation: AtomicU64::new(0),
            descriptors: RwLock::new(Vec::new()),
            state,
            failures: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
            serial,
        });
        handle.install(transport);
        info!(server = %handle.spec.name, handle = %handle.id, "Connected to capability server");
        Ok(handle)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    pub fn options(&self) -> &HandleOptions {
        &self.options
    }

    pub fn state(&self) -> HandleState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() != HandleState::Disconnected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<HandleState> {
        self.state.subscribe()
    }

    /// Descriptors from the last successful discovery.
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consecutive transport failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a fresh transport and watch it for closure.
    fn install(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let closed = transport.subscribe_closed();
        let previous = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(transport);
        if let Some(previous) = previous {
            previous.close();
        }
        self.failures.store(0, Ordering::Relaxed);
        self.state.send_replace(HandleState::Discovering);

        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            wait_closed(closed).await;
            if let Some(handle) = weak.upgrade()
                && handle.generation.load(Ordering::SeqCst) == generation
            {
                handle.mark_disconnected("transport closed");
            }
        });
    }

    /// List the server's capabilities and move to `Ready`.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<CapabilityDescriptor>, DiscoveryError> {
        let server = self.spec.name.clone();
        let failed = |reason: String| DiscoveryError::Failed {
            server: server.clone(),
            reason,
        };

        let transport = self
            .current_transport()
            .filter(|t| !t.is_closed())
            .ok_or_else(|| failed("server is disconnected".into()))?;

        let status = tokio::time::timeout(timeout, transport.request(RequestBody::Discover))
            .await
            .map_err(|_| DiscoveryError::Timeout {
                server: server.clone(),
                after: timeout,
            })?
            .map_err(|e| failed(e.to_string()))?;

        let payload = match status {
            ResponseStatus::Ok { payload } => payload,
            ResponseStatus::Error { message, kind } => {
                return Err(failed(format!("{kind}: {message}")));
            }
        };

        let listing: DiscoveryListing =
            serde_json::from_value(payload).map_err(|e| DiscoveryError::InvalidListing {
                server: server.clone(),
                reason: e.to_string(),
            })?;

        let mut seen = std::collections::HashSet::new();
        for descriptor in &listing.capabilities {
            descriptor
                .validate()
                .map_err(|reason| DiscoveryError::InvalidListing {
                    server: server.clone(),
                    reason,
                })?;
            if !seen.insert(descriptor.name.as_str()) {
                return Err(DiscoveryError::InvalidListing {
                    server: server.clone(),
                    reason: format!("capability '{}' is listed twice", descriptor.name),
                });
            }
        }

        *self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listing.capabilities.clone();
        if self.state() == HandleState::Discovering {
            self.state.send_replace(HandleState::Ready);
        }
        debug!(
            server = %self.spec.name,
            count = listing.capabilities.len(),
            "Discovered capabilities"
        );
        Ok(listing.capabilities)
    }

    /// Invoke one capability on this server.
    pub async fn invoke(&self, request: &InvocationRequest, timeout: Duration) -> InvocationOutcome {
        let started = Instant::now();

        let transport = match self.current_transport() {
            Some(t) if self.is_live() && !t.is_closed() => t,
            _ => {
                return InvocationOutcome::failure(
                    request,
                    FailureKind::ConnectionError,
                    format!("server {} is disconnected", self.spec.name),
                    started.elapsed(),
                );
            }
        };

        debug!(
            server = %self.spec.name,
            capability = %request.capability,
            request_id = %request.request_id,
            "Invoking capability"
        );

        // queueing behind a serialized call shares the timeout but is not a
        // transport failure
        let deadline = tokio::time::Instant::now() + timeout;
        let _serial = match &self.serial {
            Some(lock) => match tokio::time::timeout_at(deadline, lock.lock()).await {
                Ok(guard) => Some(guard),
                Err(_) => {
                    debug!(
                        server = %self.spec.name,
                        request_id = %request.request_id,
                        "Timed out waiting for a serialized slot"
                    );
                    return InvocationOutcome::timeout(
                        request,
                        format!(
                            "{} on {} was still queued after {}ms",
                            request.capability,
                            self.spec.name,
                            timeout.as_millis()
                        ),
                        started.elapsed(),
                    );
                }
            },
            None => None,
        };
        let call = transport.request(RequestBody::Invoke {
            name: request.capability.clone(),
            arguments: request.arguments.clone(),
        });
        let result = tokio::time::timeout_at(deadline, call).await;
        let elapsed = started.elapsed();

        let stray = transport.take_stray_errors();
        for _ in 0..stray {
            self.record_transport_failure("unattributable response line");
        }

        match result {
            Err(_) => {
                self.record_transport_failure("invocation timed out");
                InvocationOutcome::timeout(
                    request,
                    format!(
                        "{} on {} did not answer within {}ms",
                        request.capability,
                        self.spec.name,
                        timeout.as_millis()
                    ),
                    elapsed,
                )
            }
            Ok(Err(TransportError::Closed)) => {
                self.mark_disconnected("transport closed");
                InvocationOutcome::failure(
                    request,
                    FailureKind::ConnectionError,
                    format!("server {} disconnected", self.spec.name),
                    elapsed,
                )
            }
            Ok(Err(TransportError::Protocol(message))) => {
                self.record_transport_failure(&message);
                InvocationOutcome::failure(request, FailureKind::ProtocolError, message, elapsed)
            }
            Ok(Err(TransportError::Io(message))) => {
                self.record_transport_failure(&message);
                InvocationOutcome::failure(request, FailureKind::ConnectionError, message, elapsed)
            }
            Ok(Ok(ResponseStatus::Ok { payload })) => {
                self.failures.store(0, Ordering::Relaxed);
                InvocationOutcome::success(request, payload, elapsed)
            }
            Ok(Ok(ResponseStatus::Error { message, kind })) => {
                // the server answered; the connection is healthy
                self.failures.store(0, Ordering::Relaxed);
                let kind = if kind == KIND_UNKNOWN_CAPABILITY {
                    FailureKind::UnknownCapability
                } else {
                    FailureKind::CapabilityError
                };
                InvocationOutcome::failure(request, kind, message, elapsed)
            }
        }
    }

    fn record_transport_failure(&self, reason: &str) {
        let count = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            server = %self.spec.name,
            failures = count,
            reason,
            "Transport failure"
        );
        if count >= self.options.max_transport_failures {
            self.mark_disconnected("too many consecutive transport failures");
        }
    }

    /// Mark the handle disconnected and drop its transport.
    pub fn mark_disconnected(&self, reason: &str) {
        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport {
            transport.close();
        }
        let was = self.state.send_replace(HandleState::Disconnected);
        if was != HandleState::Disconnected && !self.is_shutting_down() {
            warn!(server = %self.spec.name, handle = %self.id, reason, "Server disconnected");
        }
    }

    /// Resolve once the handle is `Disconnected`.
    pub async fn wait_disconnected(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == HandleState::Disconnected).await;
    }

    /// One reconnection attempt: new transport, handshake, discovery.
    pub async fn reconnect(
        self: &Arc<Self>,
        connector: &dyn Connector,
    ) -> Result<Vec<CapabilityDescriptor>, Error> {
        if self.is_shutting_down() {
            return Err(ConnectionError::Disconnected(self.spec.name.clone()).into());
        }
        let transport =
            open_and_handshake(&self.spec, connector, self.options.handshake_timeout).await?;
        self.install(transport);
        let descriptors = self.discover(self.options.discovery_timeout).await?;
        info!(server = %self.spec.name, handle = %self.id, "Reconnected to capability server");
        Ok(descriptors)
    }

    /// Close for good; no reconnection follows.
    pub fn close(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.mark_disconnected("closed");
        debug!(server = %self.spec.name, handle = %self.id, "Handle closed");
    }
}

async fn open_and_handshake(
    spec: &ServerSpec,
    connector: &dyn Connector,
    timeout: Duration,
) -> Result<Arc<dyn Transport>, ConnectionError> {
    let transport = connector.open(spec).await?;
    let handshake_failed = |reason: String| ConnectionError::Handshake {
        server: spec.name.clone(),
        reason,
    };

    let hello = RequestBody::Handshake {
        client: CLIENT_NAME.to_string(),
        protocol_version: PROTOCOL_VERSION,
    };
    let status = match tokio::time::timeout(timeout, transport.request(hello)).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            transport.close();
            return Err(handshake_failed(e.to_string()));
        }
        Err(_) => {
            transport.close();
            return Err(ConnectionError::HandshakeTimeout {
                server: spec.name.clone(),
                after: timeout,
            });
        }
    };

    let info: HandshakeInfo = match status {
        ResponseStatus::Ok { payload } => serde_json::from_value(payload)
            .map_err(|e| handshake_failed(format!("invalid handshake payload: {e}"))),
        ResponseStatus::Error { message, .. } => Err(handshake_failed(message)),
    }
    .inspect_err(|_| transport.close())?;

    if info.protocol_version != PROTOCOL_VERSION {
        transport.close();
        return Err(handshake_failed(format!(
            "server speaks protocol {}, expected {PROTOCOL_VERSION}",
            info.protocol_version
        )));
    }

    debug!(server = %spec.name, reported = %info.server, "Handshake complete");
    Ok(transport)
}
