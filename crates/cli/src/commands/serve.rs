//! `polibrief serve`: start the HTTP API server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("polibrief gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.generation.provider, config.generation.model);
    if !config.has_api_key() {
        println!("   Warning: no generation API key configured");
    }

    polibrief_gateway::start(config).await
}
