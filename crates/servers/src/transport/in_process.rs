//! In-process transport: calls a `CapabilityService` directly.

use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::CapabilityService;
use switchboard_core::error::TransportError;
use switchboard_core::protocol::{self, RequestBody, ResponseStatus};
use tokio::sync::watch;

use super::{Transport, wait_closed};

/// Satisfies the same request/response contract as the stdio transport
/// without a process boundary.
pub struct InProcessTransport {
    service: Arc<dyn CapabilityService>,
    closed: watch::Sender<bool>,
}

impl InProcessTransport {
    pub fn new(service: Arc<dyn CapabilityService>) -> Self {
        let (closed, _) = watch::channel(false);
        Self { service, closed }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn request(&self, body: RequestBody) -> Result<ResponseStatus, TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let closed = self.closed.subscribe();
        tokio::select! {
            status = protocol::dispatch(self.service.as_ref(), body) => {
                // notifications have no answer; report an empty ok
                Ok(status.unwrap_or(ResponseStatus::ok(serde_json::Value::Null)))
            }
            _ = wait_closed(closed) => Err(TransportError::Closed),
        }
    }

    fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
