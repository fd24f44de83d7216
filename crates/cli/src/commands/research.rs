//! `polibrief research`: run research from the command line.

use polibrief_core::ReportKey;
use polibrief_research::ResearchMode;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    name: &str,
    position: &str,
    max_age: Option<i64>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    if name.trim().is_empty() {
        return Err("Politician name is required".into());
    }
    let (_, service) = super::research_service(&config).await?;

    let mode = if force {
        ResearchMode::Force
    } else {
        ResearchMode::Get {
            max_age_days: max_age.unwrap_or(config.research.default_max_age_days),
        }
    };
    let key = ReportKey::new(name, position);

    match service.research(&key, mode).await {
        Ok(outcome) => {
            if !outcome.ran_assembly {
                eprintln!("Served from cache (updated {})", outcome.report.updated_at);
            }
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            Ok(())
        }
        Err(e) => {
            let completed: Vec<&str> = e
                .completed_sections()
                .into_iter()
                .map(|s| s.as_str())
                .collect();
            if !completed.is_empty() {
                eprintln!("Completed before failure: {}", completed.join(", "));
                eprintln!("Re-run the same command to resume.");
            }
            Err(e.into())
        }
    }
}
