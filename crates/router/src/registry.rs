//! The capability registry: one flat namespace over every server.

use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::CapabilityDescriptor;
use switchboard_core::error::{NameCollisionError, UnknownCapabilityError};
use switchboard_servers::{HandleId, ServerHandle};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Inner {
    /// Owns the handles
    handles: HashMap<HandleId, Arc<ServerHandle>>,
    /// Capability name to owning handle
    names: HashMap<String, (HandleId, CapabilityDescriptor)>,
}

/// Maps capability names to the server that owns them.
///
/// Every mutation and lookup runs inside one critical section; invocation
/// happens outside it, on the handle returned by [`resolve`](Self::resolve).
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `descriptors` as owned by `handle`.
    ///
    /// All or nothing: if any name is already owned by a different live
    /// handle, nothing changes. Registering again from the same handle
    /// replaces that handle's previous entries.
    pub async fn register(
        &self,
        handle: Arc<ServerHandle>,
        descriptors: Vec<CapabilityDescriptor>,
    ) -> Result<(), NameCollisionError> {
        let mut inner = self.inner.lock().await;
        let id = handle.id();

        for descriptor in &descriptors {
            if let Some((owner, _)) = inner.names.get(&descriptor.name)
                && *owner != id
                && let Some(existing) = inner.handles.get(owner)
                && existing.is_live()
            {
                return Err(NameCollisionError {
                    name: descriptor.name.clone(),
                    existing: existing.name().to_string(),
                    incoming: handle.name().to_string(),
                });
            }
        }

        inner.names.retain(|_, (owner, _)| *owner != id);
        for descriptor in descriptors {
            inner.names.insert(descriptor.name.clone(), (id, descriptor));
        }
        debug!(server = %handle.name(), handle = %id, "Registered capabilities");
        inner.handles.insert(id, handle);
        Ok(())
    }

    /// Remove exactly the capabilities owned by `id`; returns their names,
    /// sorted.
    pub async fn unregister(&self, id: HandleId) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        let mut removed: Vec<String> = inner
            .names
            .iter()
            .filter(|(_, (owner, _))| *owner == id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &removed {
            inner.names.remove(name);
        }
        inner.handles.remove(&id);
        removed.sort();
        removed
    }

    /// The handle that owns `name`.
    pub async fn resolve(&self, name: &str) -> Result<Arc<ServerHandle>, UnknownCapabilityError> {
        let inner = self.inner.lock().await;
        inner
            .names
            .get(name)
            .and_then(|(owner, _)| inner.handles.get(owner))
            .cloned()
            .ok_or_else(|| UnknownCapabilityError(name.to_string()))
    }

    /// All registered descriptors, sorted by name.
    pub async fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        let inner = self.inner.lock().await;
        let mut all: Vec<CapabilityDescriptor> =
            inner.names.values().map(|(_, d)| d.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Registered names with the server that owns each, sorted by name.
    pub async fn owners(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        let mut owners: Vec<(String, String)> = inner
            .names
            .iter()
            .filter_map(|(name, (owner, _))| {
                inner
                    .handles
                    .get(owner)
                    .map(|h| (name.clone(), h.name().to_string()))
            })
            .collect();
        owners.sort();
        owners
    }

    pub async fn handles(&self) -> Vec<Arc<ServerHandle>> {
        self.inner.lock().await.handles.values().cloned().collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.lock().await.names.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.names.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
