//! Capability server adapters for Switchboard.
//!
//! A [`ServerHandle`] owns one long-lived connection to a capability
//! server. The bytes travel over a [`Transport`]: a child process speaking
//! line-delimited JSON ([`StdioTransport`]) or a service called in the same
//! process ([`InProcessTransport`]). A [`Connector`] turns a
//! [`ServerSpec`](switchboard_core::ServerSpec) into a transport.

pub mod connector;
pub mod handle;
pub mod transport;

pub use connector::{Connector, ConnectorSet, InProcessConnector, StdioConnector};
pub use handle::{HandleId, HandleOptions, HandleState, ServerHandle};
pub use transport::{InProcessTransport, StdioTransport, Transport};
