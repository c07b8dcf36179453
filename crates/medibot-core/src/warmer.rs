//! Cache warming for common medical queries.
//!
//! Run offline (scheduled or at deploy time) so frequent first-aid questions
//! are served from cache. Warmed entries get a longer TTL than organic ones.

use std::sync::Arc;

use medibot_abstraction::{Model, ModelParameters};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::prompt::{build_prompt, clean_model_answer};
use crate::topic::detect_medical_topic;

/// TTL for warmed entries: 48 hours.
pub const WARM_TTL_HOURS: i64 = 48;

/// Queries worth pre-answering.
pub const COMMON_QUERIES: &[&str] = &[
    "How to perform CPR?",
    "How to treat a burn?",
    "How to stop bleeding from a cut?",
    "What to do when someone is choking?",
    "How to treat a sprained ankle?",
    "What to do if someone faints?",
    "How to bandage a wound?",
    "How to treat a nosebleed?",
    "What are the signs of a heart attack?",
    "How to put someone in the recovery position?",
];

/// Outcome of one warming run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmReport {
    /// Entries generated and cached.
    pub warmed: usize,
    /// Entries already present and unexpired.
    pub skipped: usize,
    /// Queries whose model call failed.
    pub failed: usize,
    /// Queries attempted.
    pub total: usize,
}

/// Generates and caches answers for [`COMMON_QUERIES`].
///
/// With `skip_existing`, queries that already have an unexpired entry are
/// left alone. Model failures are counted and skipped; the run itself never
/// errors.
pub async fn warm_cache(
    model: Arc<dyn Model>,
    cache: &ResponseCache,
    skip_existing: bool,
) -> WarmReport {
    let mut report = WarmReport { total: COMMON_QUERIES.len(), ..WarmReport::default() };

    for query in COMMON_QUERIES {
        if skip_existing && cache.lookup(query).await.is_some() {
            report.skipped += 1;
            continue;
        }

        let prompt = build_prompt(query, "", false);
        match model.generate_text(&prompt, Some(ModelParameters::default())).await {
            Ok(answer) => {
                let cleaned = clean_model_answer(&answer.content, false);
                let topic = detect_medical_topic(query).map(str::to_string);
                cache.store(query, &cleaned, topic, Some(WARM_TTL_HOURS)).await;
                report.warmed += 1;
            }
            Err(e) => {
                warn!(query, error = %e, "Cache warming failed for query");
                report.failed += 1;
            }
        }
    }

    info!(
        warmed = report.warmed,
        skipped = report.skipped,
        failed = report.failed,
        total = report.total,
        "Cache warming complete"
    );
    report
}
