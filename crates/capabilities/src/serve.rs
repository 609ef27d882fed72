//! Stdio serve loop: answers the capability protocol on stdin/stdout.
//!
//! Invocations run concurrently, each on its own task, and are answered in
//! completion order. A `cancel` notice aborts the named invocation; it is
//! then never answered. When input closes, invocations still running are
//! aborted without an answer; responses already queued are still written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use switchboard_core::CapabilityService;
use switchboard_core::protocol::{
    self, KIND_INVALID_REQUEST, RequestBody, ResponseStatus, WireRequest, WireResponse,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

type InFlight = Arc<Mutex<HashMap<u64, AbortHandle>>>;

/// Serve `service` on this process's stdin/stdout until stdin closes.
pub async fn serve_stdio(service: Arc<dyn CapabilityService>) -> std::io::Result<()> {
    serve(service, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve `service` over an arbitrary reader/writer pair.
pub async fn serve<R, W>(service: Arc<dyn CapabilityService>, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!(
        server = %service.server_name(),
        capabilities = service.descriptors().len(),
        "Serving capabilities on stdio"
    );

    let (tx, rx) = mpsc::unbounded_channel::<WireResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));
    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: WireRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_u64()));
                match id {
                    Some(id) => {
                        let _ = tx.send(WireResponse {
                            id,
                            status: ResponseStatus::error(
                                KIND_INVALID_REQUEST,
                                format!("invalid request: {e}"),
                            ),
                        });
                    }
                    None => warn!(error = %e, "Ignoring unparseable request line"),
                }
                continue;
            }
        };

        let id = request.id;
        match request.body {
            RequestBody::Cancel { target } => {
                let handle = lock(&in_flight).remove(&target);
                if let Some(handle) = handle {
                    handle.abort();
                    debug!(target, "Cancelled invocation");
                }
            }
            body @ RequestBody::Invoke { .. } => {
                let service = service.clone();
                let tx = tx.clone();
                let registry = in_flight.clone();
                // hold the table while spawning so the task's own removal
                // cannot run before the insert
                let mut table = lock(&in_flight);
                let task = tokio::spawn(async move {
                    let status = protocol::dispatch(service.as_ref(), body).await;
                    lock(&registry).remove(&id);
                    if let Some(status) = status {
                        let _ = tx.send(WireResponse { id, status });
                    }
                });
                table.insert(id, task.abort_handle());
            }
            body => {
                if let Some(status) = protocol::dispatch(service.as_ref(), body).await {
                    let _ = tx.send(WireResponse { id, status });
                }
            }
        }
    }

    // abort what is still running; queued responses are flushed below
    debug!("Client closed input; stopping");
    for (_, handle) in lock(&in_flight).drain() {
        handle.abort();
    }
    drop(tx);
    writer_task.await.unwrap_or(Ok(()))
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<u64, AbortHandle>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<WireResponse>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(response) = rx.recv().await {
        let line = serde_json::to_string(&response).map_err(std::io::Error::other)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
