//! Connectors: turn a `ServerSpec` into a live transport.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use switchboard_core::error::ConnectionError;
use switchboard_core::{CapabilityService, ServerSpec, TransportKind};

use crate::transport::{InProcessTransport, StdioTransport, Transport};

/// Opens transports for server specs.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, spec: &ServerSpec) -> Result<Arc<dyn Transport>, ConnectionError>;
}

/// Launches each server as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioConnector;

#[async_trait]
impl Connector for StdioConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Arc<dyn Transport>, ConnectionError> {
        Ok(Arc::new(StdioTransport::spawn(spec)?))
    }
}

/// Resolves servers by name from a table of in-process services.
///
/// Keeps weak references to the transports it opened so a server can be
/// forcibly disconnected from outside (used to exercise reconnection).
#[derive(Default)]
pub struct InProcessConnector {
    services: RwLock<HashMap<String, Arc<dyn CapabilityService>>>,
    opened: RwLock<HashMap<String, Vec<Weak<InProcessTransport>>>>,
}

impl InProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `service` reachable under `name`.
    pub fn register(&self, name: impl Into<String>, service: Arc<dyn CapabilityService>) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), service);
    }

    /// Stop serving `name`; later connection attempts fail.
    pub fn remove(&self, name: &str) -> bool {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Close every live transport opened for `name`.
    pub fn disconnect(&self, name: &str) -> usize {
        let transports = self
            .opened
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .unwrap_or_default();
        let mut closed = 0;
        for transport in transports.iter().filter_map(Weak::upgrade) {
            transport.close();
            closed += 1;
        }
        closed
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn open(&self, spec: &ServerSpec) -> Result<Arc<dyn Transport>, ConnectionError> {
        let service = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| ConnectionError::NoService(spec.name.clone()))?;

        let transport = Arc::new(InProcessTransport::new(service));
        let mut opened = self.opened.write().unwrap_or_else(PoisonError::into_inner);
        let entry = opened.entry(spec.name.clone()).or_default();
        entry.retain(|w| w.strong_count() > 0);
        entry.push(Arc::downgrade(&transport));
        Ok(transport)
    }
}

/// Dispatches on `ServerSpec::transport`.
#[derive(Default)]
pub struct ConnectorSet {
    stdio: StdioConnector,
    in_process: Arc<InProcessConnector>,
}

impl ConnectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_process(in_process: Arc<InProcessConnector>) -> Self {
        Self {
            stdio: StdioConnector,
            in_process,
        }
    }

    pub fn in_process(&self) -> &Arc<InProcessConnector> {
        &self.in_process
    }
}

#[async_trait]
impl Connector for ConnectorSet {
    async fn open(&self, spec: &ServerSpec) -> Result<Arc<dyn Transport>, ConnectionError> {
        match spec.transport {
            TransportKind::Stdio => self.stdio.open(spec).await,
            TransportKind::InProcess => self.in_process.open(spec).await,
        }
    }
}
