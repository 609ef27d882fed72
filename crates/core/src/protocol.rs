//! The capability-server wire protocol.
//!
//! Messages are JSON objects, one per line. A client sends requests
//! carrying a numeric `id`; the server answers each with a response
//! carrying the same `id`, in any order. `cancel` is a notification and is
//! never answered.
//!
//! ```text
//! → {"id":1,"method":"handshake","params":{"client":"switchboard","protocol_version":1}}
//! ← {"id":1,"status":"ok","payload":{"server":"utils","protocol_version":1}}
//! → {"id":2,"method":"discover"}
//! ← {"id":2,"status":"ok","payload":{"capabilities":[...]}}
//! → {"id":3,"method":"invoke","params":{"name":"calculate","arguments":{"expression":"2+2"}}}
//! ← {"id":3,"status":"error","message":"division by zero","kind":"capability_error"}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityDescriptor;
use crate::error::TransportError;

/// Version spoken by this implementation.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error kind a server uses for names it does not serve.
pub const KIND_UNKNOWN_CAPABILITY: &str = "unknown_capability";
/// Error kind for arguments that do not match the schema.
pub const KIND_INVALID_ARGUMENTS: &str = "invalid_arguments";
/// Error kind for a capability that ran and failed.
pub const KIND_CAPABILITY_ERROR: &str = "capability_error";
/// Error kind for requests the server could not parse.
pub const KIND_INVALID_REQUEST: &str = "invalid_request";

/// A request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: u64,

    #[serde(flatten)]
    pub body: RequestBody,
}

/// The method-specific part of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RequestBody {
    Handshake {
        client: String,
        protocol_version: u32,
    },
    Discover,
    Invoke {
        name: String,
        #[serde(default)]
        arguments: serde_json::Map<String, serde_json::Value>,
    },
    /// Best-effort notice that the client stopped waiting for `target`.
    Cancel { target: u64 },
}

impl RequestBody {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Discover => "discover",
            Self::Invoke { .. } => "invoke",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// A response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: u64,

    #[serde(flatten)]
    pub status: ResponseStatus,
}

/// `ok` with a payload, or `error` with a message and a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok {
        #[serde(default)]
        payload: serde_json::Value,
    },
    Error {
        message: String,
        #[serde(default = "default_error_kind")]
        kind: String,
    },
}

fn default_error_kind() -> String {
    KIND_CAPABILITY_ERROR.into()
}

impl ResponseStatus {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self::Ok { payload }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind: kind.into(),
        }
    }
}

/// Payload of a successful `handshake`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeInfo {
    pub server: String,
    pub protocol_version: u32,
}

/// Payload of a successful `discover`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryListing {
    pub capabilities: Vec<CapabilityDescriptor>,
}

/// Parse one line received from a server.
///
/// When the line is not a valid response but still names an `id`, the
/// error is returned together with that id so the waiting request can be
/// failed instead of left hanging.
pub fn parse_response(line: &str) -> Result<WireResponse, (Option<u64>, TransportError)> {
    match serde_json::from_str::<WireResponse>(line) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            let id = serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_u64()));
            Err((id, TransportError::Protocol(format!("malformed response: {e}"))))
        }
    }
}

/// Application-level failure reported by a capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub kind: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(KIND_INVALID_ARGUMENTS, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(KIND_CAPABILITY_ERROR, message)
    }
}

/// The server side of the protocol.
///
/// Implemented by capability sets; served over stdio by the serve loop or
/// called directly by the in-process transport.
#[async_trait]
pub trait CapabilityService: Send + Sync {
    /// The server's name, reported in the handshake.
    fn server_name(&self) -> &str;

    /// The ordered capability listing.
    fn descriptors(&self) -> Vec<CapabilityDescriptor>;

    /// Run one capability.
    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ServiceError>;
}

fn to_payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Answer one request against a service.
///
/// Returns `None` for notifications.
pub async fn dispatch(service: &dyn CapabilityService, body: RequestBody) -> Option<ResponseStatus> {
    let status = match body {
        RequestBody::Handshake {
            protocol_version, ..
        } => {
            if protocol_version != PROTOCOL_VERSION {
                ResponseStatus::error(
                    KIND_INVALID_REQUEST,
                    format!(
                        "unsupported protocol version {protocol_version}, expected {PROTOCOL_VERSION}"
                    ),
                )
            } else {
                ResponseStatus::ok(to_payload(&HandshakeInfo {
                    server: service.server_name().to_string(),
                    protocol_version: PROTOCOL_VERSION,
                }))
            }
        }
        RequestBody::Discover => ResponseStatus::ok(to_payload(&DiscoveryListing {
            capabilities: service.descriptors(),
        })),
        RequestBody::Invoke { name, arguments } => match service.invoke(&name, arguments).await {
            Ok(payload) => ResponseStatus::ok(payload),
            Err(e) => ResponseStatus::error(e.kind, e.message),
        },
        RequestBody::Cancel { .. } => return None,
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl CapabilityService for Echo {
        fn server_name(&self) -> &str {
            "echo"
        }

        fn descriptors(&self) -> Vec<CapabilityDescriptor> {
            vec![CapabilityDescriptor::new(
                "echo",
                "Echoes back the input",
                serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            )]
        }

        async fn invoke(
            &self,
            name: &str,
            arguments: serde_json::Map<String, serde_json::Value>,
        ) -> Result<serde_json::Value, ServiceError> {
            if name != "echo" {
                return Err(ServiceError::new(KIND_UNKNOWN_CAPABILITY, name));
            }
            Ok(arguments.get("text").cloned().unwrap_or_default())
        }
    }

    #[test]
    fn request_serializes_method_and_params() {
        let req = WireRequest {
            id: 7,
            body: RequestBody::Invoke {
                name: "echo".into(),
                arguments: serde_json::Map::new(),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""id":7"#));
        assert!(json.contains(r#""method":"invoke""#));
        assert!(json.contains(r#""params":{"#));
    }

    #[test]
    fn discover_has_no_params() {
        let req: WireRequest = serde_json::from_str(r#"{"id":2,"method":"discover"}"#).unwrap();
        assert_eq!(req.body, RequestBody::Discover);
    }

    #[test]
    fn error_response_parses() {
        let resp = parse_response(
            r#"{"id":3,"status":"error","message":"nope","kind":"capability_error"}"#,
        )
        .unwrap();
        assert_eq!(resp.id, 3);
        assert_eq!(resp.status, ResponseStatus::error("capability_error", "nope"));
    }

    #[test]
    fn malformed_response_keeps_id() {
        let (id, err) = parse_response(r#"{"id":9,"status":"maybe"}"#).unwrap_err();
        assert_eq!(id, Some(9));
        assert!(matches!(err, TransportError::Protocol(_)));

        let (id, _) = parse_response("not json").unwrap_err();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn dispatch_answers_handshake_discover_and_invoke() {
        let hs = dispatch(
            &Echo,
            RequestBody::Handshake {
                client: "test".into(),
                protocol_version: PROTOCOL_VERSION,
            },
        )
        .await
        .unwrap();
        assert!(matches!(hs, ResponseStatus::Ok { ref payload } if payload["server"] == "echo"));

        let listing = dispatch(&Echo, RequestBody::Discover).await.unwrap();
        match listing {
            ResponseStatus::Ok { payload } => {
                let listing: DiscoveryListing = serde_json::from_value(payload).unwrap();
                assert_eq!(listing.capabilities.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut args = serde_json::Map::new();
        args.insert("text".into(), serde_json::json!("hello"));
        let out = dispatch(
            &Echo,
            RequestBody::Invoke {
                name: "echo".into(),
                arguments: args,
            },
        )
        .await
        .unwrap();
        assert_eq!(out, ResponseStatus::ok(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn dispatch_rejects_wrong_protocol_version() {
        let hs = dispatch(
            &Echo,
            RequestBody::Handshake {
                client: "test".into(),
                protocol_version: 99,
            },
        )
        .await
        .unwrap();
        assert!(matches!(hs, ResponseStatus::Error { ref kind, .. } if kind == KIND_INVALID_REQUEST));
    }

    #[tokio::test]
    async fn cancel_is_not_answered() {
        assert!(dispatch(&Echo, RequestBody::Cancel { target: 1 }).await.is_none());
    }
}
