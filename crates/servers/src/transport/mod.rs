//! Transports: how requests reach a capability server.

pub mod in_process;
pub mod stdio;

pub use in_process::InProcessTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use switchboard_core::error::TransportError;
use switchboard_core::protocol::{RequestBody, ResponseStatus};
use tokio::sync::watch;

/// One connection to one server.
///
/// `request` may be called concurrently; each call resolves with the answer
/// to its own request. Once the transport is closed every pending and
/// future request fails with `TransportError::Closed`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    ///
    /// Dropping the returned future abandons the request.
    async fn request(&self, body: RequestBody) -> Result<ResponseStatus, TransportError>;

    /// A receiver that flips to `true` when the transport closes.
    fn subscribe_closed(&self) -> watch::Receiver<bool>;

    fn is_closed(&self) -> bool {
        *self.subscribe_closed().borrow()
    }

    /// Close the connection and fail everything in flight.
    fn close(&self);

    /// Unparseable lines received since the last call that named no
    /// request id.
    fn take_stray_errors(&self) -> u32 {
        0
    }
}

/// Resolve once `rx` reports closed (or its sender is gone).
pub(crate) async fn wait_closed(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}
