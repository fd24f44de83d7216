//! `polibrief cleanup-chats`: purge expired temporary chats.

use polibrief_research::ChatService;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    hours: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let ttl_hours = hours.unwrap_or(config.chat.temporary_ttl_hours);
    if ttl_hours < 0 {
        return Err("--hours must be >= 0".into());
    }

    let (store, research) = super::research_service(&config).await?;
    let provider = polibrief_providers::build_from_config(&config.generation);
    let chats = ChatService::new(store.clone(), store, research, provider);

    let purged = chats.purge_temporary(ttl_hours).await?;
    println!("Deleted {purged} temporary chat(s) older than {ttl_hours} hour(s)");
    Ok(())
}
