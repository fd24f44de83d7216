//! Cache-aware entry point for research requests.

use crate::assembler::ReportAssembler;
use crate::error::ResearchError;
use crate::freshness::Freshness;
use crate::locks::ResearchLocks;
use chrono::Utc;
use polibrief_core::{PoliticianReport, ReportKey, ReportStore};
use std::sync::Arc;
use tracing::{debug, info};

/// How a research request treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchMode {
    /// Serve a stored report younger than `max_age_days`, else assemble.
    Get { max_age_days: i64 },
    /// Always assemble from scratch.
    Force,
}

impl ResearchMode {
    pub fn request_method(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Force => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub report: PoliticianReport,
    /// Whether this request ran the assembler (false when served from cache)
    pub ran_assembly: bool,
}

pub struct ResearchService {
    assembler: ReportAssembler,
    reports: Arc<dyn ReportStore>,
    locks: ResearchLocks,
}

impl ResearchService {
    pub fn new(assembler: ReportAssembler, reports: Arc<dyn ReportStore>) -> Self {
        Self {
            assembler,
            reports,
            locks: ResearchLocks::new(),
        }
    }

    pub async fn research(
        &self,
        key: &ReportKey,
        mode: ResearchMode,
    ) -> Result<ResearchOutcome, ResearchError> {
        if let ResearchMode::Get { max_age_days } = mode {
            if let Some(report) = self.fresh_report(key, max_age_days).await? {
                return Ok(ResearchOutcome {
                    report,
                    ran_assembly: false,
                });
            }
        }

        let _guard = self.locks.acquire(key).await;

        // A request that waited on a concurrent run for the same key serves
        // that run's report.
        if let ResearchMode::Get { max_age_days } = mode {
            if let Some(report) = self.fresh_report(key, max_age_days).await? {
                debug!(key = %key, "Served report assembled while waiting");
                return Ok(ResearchOutcome {
                    report,
                    ran_assembly: false,
                });
            }
        }

        info!(key = %key, method = mode.request_method(), "Conducting new research");
        let report = self
            .assembler
            .run(key, matches!(mode, ResearchMode::Force))
            .await?;
        Ok(ResearchOutcome {
            report,
            ran_assembly: true,
        })
    }

    async fn fresh_report(
        &self,
        key: &ReportKey,
        max_age_days: i64,
    ) -> Result<Option<PoliticianReport>, ResearchError> {
        let Some(report) = self.reports.get_report(key).await? else {
            return Ok(None);
        };
        let verdict = Freshness::evaluate(report.updated_at, max_age_days, Utc::now());
        if verdict.is_fresh {
            info!(key = %key, age_days = verdict.age_days, "Using cached report");
            Ok(Some(report))
        } else {
            debug!(key = %key, age_days = verdict.age_days, max_age_days, "Cached report is stale");
            Ok(None)
        }
    }
}
