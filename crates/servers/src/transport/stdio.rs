//! Stdio transport: a child process speaking line-delimited JSON.
//!
//! Requests are multiplexed over the one connection by wire id. A single
//! writer task owns the child's stdin; a reader task owns its stdout and
//! routes each response to the request waiting on that id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchboard_core::ServerSpec;
use switchboard_core::error::{ConnectionError, TransportError};
use switchboard_core::protocol::{self, RequestBody, ResponseStatus, WireRequest};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::Transport;

type Reply = oneshot::Sender<Result<ResponseStatus, TransportError>>;

/// State shared between the transport and its I/O tasks.
struct Shared {
    server: String,
    pending: Mutex<HashMap<u64, Reply>>,
    closed: watch::Sender<bool>,
    stray_errors: AtomicU32,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, Reply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, id: u64, result: Result<ResponseStatus, TransportError>) {
        match self.pending().remove(&id) {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => debug!(server = %self.server, id, "Response for a request nobody is waiting on"),
        }
    }

    /// Flip the closed flag, then fail everything still waiting.
    fn shut(&self) {
        if !self.closed.send_replace(true) {
            debug!(server = %self.server, "Transport closed");
        }
        let drained: Vec<Reply> = self.pending().drain().map(|(_, reply)| reply).collect();
        for reply in drained {
            let _ = reply.send(Err(TransportError::Closed));
        }
    }
}

/// A connection to a capability server over its stdin/stdout.
pub struct StdioTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Launch the server process described by `spec`.
    pub fn spawn(spec: &ServerSpec) -> Result<Self, ConnectionError> {
        let spawn_error = |reason: String| ConnectionError::Spawn {
            server: spec.name.clone(),
            command: spec.command.clone(),
            reason,
        };

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(spec.name.clone(), stderr));
        }

        debug!(
            server = %spec.name,
            command = %spec.command,
            pid = child.id().unwrap_or_default(),
            "Server process started"
        );

        let transport = Self::from_io(&spec.name, stdin, stdout);
        *transport.child_slot() = Some(child);
        Ok(transport)
    }

    /// Run the protocol over an arbitrary byte stream pair.
    pub fn from_io<W, R>(server: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            server: server.to_string(),
            pending: Mutex::new(HashMap::new()),
            closed,
            stray_errors: AtomicU32::new(0),
        });
        let (outbound, rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(shared.clone(), writer, rx));
        tokio::spawn(read_loop(shared.clone(), reader));

        Self {
            shared,
            outbound,
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
        }
    }

    fn child_slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(id: u64, body: RequestBody) -> Result<String, TransportError> {
        serde_json::to_string(&WireRequest { id, body })
            .map_err(|e| TransportError::Protocol(format!("cannot encode request: {e}")))
    }
}

/// Removes an abandoned request from the pending table and tells the
/// server to stop working on it.
struct PendingGuard<'a> {
    transport: &'a StdioTransport,
    id: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let still_pending = self.transport.shared.pending().remove(&self.id).is_some();
        if still_pending && !*self.transport.shared.closed.borrow() {
            let notice_id = self.transport.next_id.fetch_add(1, Ordering::Relaxed);
            if let Ok(line) =
                StdioTransport::encode(notice_id, RequestBody::Cancel { target: self.id })
            {
                debug!(server = %self.transport.shared.server, id = self.id, "Cancelling abandoned request");
                let _ = self.transport.outbound.send(line);
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, body: RequestBody) -> Result<ResponseStatus, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = Self::encode(id, body)?;
        let (reply, response) = oneshot::channel();
        self.shared.pending().insert(id, reply);
        let mut guard = PendingGuard {
            transport: self,
            id,
            armed: true,
        };

        // a close that raced the insert has already drained the table
        if self.is_closed() || self.outbound.send(line).is_err() {
            return Err(TransportError::Closed);
        }

        let result = response.await.unwrap_or(Err(TransportError::Closed));
        guard.armed = false;
        result
    }

    fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.shared.closed.subscribe()
    }

    fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    fn close(&self) {
        self.shared.shut();
        if let Some(child) = self.child_slot().as_mut() {
            let _ = child.start_kill();
        }
    }

    fn take_stray_errors(&self) -> u32 {
        self.shared.stray_errors.swap(0, Ordering::Relaxed)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn write_loop<W>(shared: Arc<Shared>, mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut closed = shared.closed.subscribe();
    loop {
        let line = tokio::select! {
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = closed.wait_for(|c| *c) => break,
        };
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(server = %shared.server, error = %e, "Write to server failed");
            break;
        }
    }
    shared.shut();
}

async fn read_loop<R>(shared: Arc<Shared>, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match protocol::parse_response(&line) {
                    Ok(response) => shared.complete(response.id, Ok(response.status)),
                    Err((Some(id), err)) => {
                        warn!(server = %shared.server, id, error = %err, "Malformed response");
                        shared.complete(id, Err(err));
                    }
                    Err((None, err)) => {
                        warn!(server = %shared.server, error = %err, "Unattributable line from server");
                        shared.stray_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Ok(None) => {
                debug!(server = %shared.server, "Server closed its output");
                break;
            }
            Err(e) => {
                warn!(server = %shared.server, error = %e, "Read from server failed");
                break;
            }
        }
    }
    shared.shut();
}

async fn forward_stderr(server: String, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %server, "{line}");
    }
}
