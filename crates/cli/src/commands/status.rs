//! `polibrief status`: show the effective configuration.

use std::path::Path;

fn set_or_missing<T>(value: &Option<T>) -> &'static str {
    if value.is_some() { "set" } else { "missing" }
}

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);
    let config = super::load_config(config_path)?;

    println!("polibrief status");
    println!("================");
    println!("  Config file:  {}", path.display());
    println!("  Provider:     {}", config.generation.provider);
    println!("  Model:        {}", config.generation.model);
    println!("  Temperature:  {}", config.generation.temperature);
    println!("  API key:      {}", set_or_missing(&config.generation.api_key));
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Database:     {}", config.database.url);
    println!("  JWT secret:   {}", set_or_missing(&config.auth.jwt_secret));
    println!(
        "  Search URL:   {}",
        config.sources.search_url.as_deref().unwrap_or("missing")
    );
    println!("  Cache age:    {} day(s)", config.research.default_max_age_days);
    println!("  Chat TTL:     {} hour(s)", config.chat.temporary_ttl_hours);

    if path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, run `polibrief onboard` first");
    }

    match config.validate_for_serving() {
        Ok(()) => println!("  Ready to serve"),
        Err(e) => println!("  Not ready to serve: {e}"),
    }
    Ok(())
}
