//! `polibrief onboard`: first-time setup.

use polibrief_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(config_path);

    println!("polibrief first-time setup");
    println!("==========================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set generation.api_key (or GEMINI_API_KEY / OPENAI_API_KEY)");
    println!("  2. Set auth.jwt_secret (or POLIBRIEF_JWT_SECRET)");
    println!("  3. Set sources.search_url to a search endpoint");
    println!("  4. Run: polibrief serve\n");
    Ok(())
}
