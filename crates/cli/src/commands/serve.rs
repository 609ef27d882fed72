//! `switchboard serve`: run a built-in capability set on stdio.

use std::sync::Arc;
use switchboard_capabilities::{BUILTIN_SERVERS, builtin, serve_stdio};

pub async fn run(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let set = builtin(name).ok_or_else(|| {
        format!(
            "Unknown built-in server '{name}'. Available: {}",
            BUILTIN_SERVERS.join(", ")
        )
    })?;
    tracing::info!(server = %name, capabilities = ?set.names(), "Serving on stdio");
    serve_stdio(Arc::new(set)).await?;
    Ok(())
}
