//! The server side of the Switchboard capability protocol.
//!
//! Capabilities implement [`Capability`] and are grouped into a
//! [`CapabilitySet`], which answers the protocol either in-process or over
//! stdio through [`serve_stdio`]. The built-in `utils` set needs no
//! network access or credentials.

pub mod capability;
pub mod serve;
pub mod utils;

pub use capability::{Capability, CapabilitySet};
pub use serve::{serve, serve_stdio};

/// Build a built-in capability set by name.
pub fn builtin(name: &str) -> Option<CapabilitySet> {
    match name {
        "utils" => Some(utils::utils_server()),
        _ => None,
    }
}

/// Names accepted by [`builtin`].
pub const BUILTIN_SERVERS: &[&str] = &["utils"];
