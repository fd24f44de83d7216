pub mod cleanup;
pub mod onboard;
pub mod research;
pub mod serve;
pub mod status;

use polibrief_config::AppConfig;
use polibrief_research::{AssemblerOptions, ReportAssembler, ResearchService};
use polibrief_store::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Open the configured database and wire a research service around it.
pub async fn research_service(
    config: &AppConfig,
) -> Result<(Arc<SqliteStore>, Arc<ResearchService>), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);
    let provider = polibrief_providers::build_from_config(&config.generation);
    let gatherer = polibrief_gateway::build_gatherer(config)?;
    let assembler = ReportAssembler::new(provider, gatherer, store.clone())
        .with_options(AssemblerOptions::from(&config.research));
    let service = Arc::new(ResearchService::new(assembler, store.clone()));
    Ok((store, service))
}
