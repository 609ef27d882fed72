//! `switchboard capabilities`: connect and list the namespace.

use std::path::Path;

pub async fn run(explicit: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    if config.servers.is_empty() {
        println!("No servers configured. Add [[servers]] entries or run `switchboard init`.");
        return Ok(());
    }

    let router = super::connect_router(&config).await;
    let owners = router.registry().owners().await;
    let descriptors = router.descriptors().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
    } else {
        println!("{} capabilities from {} servers\n", descriptors.len(), config.servers.len());
        for descriptor in &descriptors {
            let server = owners
                .iter()
                .find(|(name, _)| *name == descriptor.name)
                .map(|(_, server)| server.as_str())
                .unwrap_or("?");
            println!("  {:<24} [{server}]", descriptor.name);
            if !descriptor.description.is_empty() {
                println!("      {}", descriptor.description);
            }
        }
    }

    router.shutdown().await;
    Ok(())
}
