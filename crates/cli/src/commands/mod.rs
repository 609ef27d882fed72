pub mod capabilities;
pub mod chat;
pub mod init;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchboard_config::AppConfig;
use switchboard_router::{Router, RouterOptions};
use switchboard_servers::ConnectorSet;

pub(crate) fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub(crate) fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Connect every configured server. Servers that fail are reported and
/// skipped.
pub(crate) async fn connect_router(config: &AppConfig) -> Arc<Router> {
    let router = Arc::new(Router::new(
        Arc::new(ConnectorSet::new()),
        RouterOptions::from(&config.router),
    ));
    for (server, result) in router.connect_all(&config.servers).await {
        if let Err(e) = result {
            eprintln!("  [{server}] not attached: {e}");
        }
    }
    router
}
