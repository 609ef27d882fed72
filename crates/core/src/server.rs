//! Server specifications: how to reach one capability server.
//!
//! All endpoint and credential configuration for a server lives here and is
//! fixed when the server is connected; routing and the reasoning loop never
//! read the environment themselves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which binding carries the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// A child process speaking line-delimited JSON on stdin/stdout
    #[default]
    Stdio,
    /// A service registered with the connector and called directly
    InProcess,
}

/// Everything needed to start or attach to one capability server.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Server name (e.g., "weather"); used in logs and collision reports
    pub name: String,

    /// Program to launch (stdio transport)
    #[serde(default)]
    pub command: String,

    /// Arguments passed to `command`
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for the server process (API keys, endpoints)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the server process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportKind,

    /// Serialize invocations on this server's connection (for servers that
    /// cannot handle concurrent requests)
    #[serde(default)]
    pub serialize_requests: bool,
}

impl ServerSpec {
    /// A subprocess server.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: BTreeMap::new(),
            cwd: None,
            transport: TransportKind::Stdio,
            serialize_requests: false,
        }
    }

    /// A server resolved by name from the connector's in-process services.
    pub fn in_process(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            transport: TransportKind::InProcess,
            serialize_requests: false,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_serialized_requests(mut self) -> Self {
        self.serialize_requests = true;
        self
    }

    /// Check this entry is usable for its transport.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("server name is empty".into());
        }
        if self.transport == TransportKind::Stdio && self.command.trim().is_empty() {
            return Err(format!("server '{}' uses stdio but has no command", self.name));
        }
        Ok(())
    }
}

/// Environment values are credentials more often than not; keep them out
/// of logs.
impl std::fmt::Debug for ServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.keys().map(|k| k.as_str()).collect();
        f.debug_struct("ServerSpec")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("cwd", &self.cwd)
            .field("transport", &self.transport)
            .field("serialize_requests", &self.serialize_requests)
            .finish()
    }
}
