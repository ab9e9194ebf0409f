//! Cache-aware explanation of the top candidates.
//!
//! Cached moves are served from the cache; everything else goes out in a
//! single batched request. Newly fetched text is written back in the
//! background, so a slow or broken cache never delays the report.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::cache::{cache_key, CacheEntry, ExplanationCache};
use super::client::ExplanationService;
use super::prompt;
use super::reply::{match_explanations, Candidate};
use crate::aggregator::{RankedLine, RankedResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplanationStatus {
    Explained { text: String, from_cache: bool },
    /// The reply did not mention this move
    Unavailable,
    /// The explanation service could not be reached
    Failed,
}

impl fmt::Display for ExplanationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explained { text, .. } => f.write_str(text),
            Self::Unavailable => f.write_str("no explanation available"),
            Self::Failed => f.write_str("error fetching explanation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveExplanation {
    pub san: String,
    pub uci: String,
    pub eval: String,
    pub status: ExplanationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationReport {
    pub fen: String,
    /// Same order as the ranked candidates
    pub entries: Vec<MoveExplanation>,
    /// External requests made for this report (0 or 1)
    pub external_requests: usize,
}

impl ExplanationReport {
    pub fn get(&self, san: &str) -> Option<&MoveExplanation> {
        self.entries.iter().find(|e| e.san == san)
    }
}

enum Fetched {
    Skipped,
    Failed,
    Replied(HashMap<String, String>),
}

pub struct ExplanationPipeline<C, S> {
    cache: Arc<C>,
    service: Arc<S>,
    top_k: usize,
}

impl<C: ExplanationCache, S: ExplanationService> ExplanationPipeline<C, S> {
    pub fn new(cache: Arc<C>, service: Arc<S>, top_k: usize) -> Self {
        Self {
            cache,
            service,
            top_k,
        }
    }

    /// Explain the top candidates of `result`. Never fails as a whole: each
    /// entry carries its own status.
    pub async fn explain(&self, result: &RankedResult) -> ExplanationReport {
        let candidates = result.top(self.top_k);

        let probes = candidates.iter().map(|ranked| {
            let key = cache_key(&result.fen, &ranked.line.san);
            let cache = &self.cache;
            async move {
                match cache.get(&key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                        None
                    }
                }
            }
        });
        let cached: Vec<Option<String>> = join_all(probes).await;

        let uncached: Vec<&RankedLine> = candidates
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(ranked, _)| ranked)
            .collect();
        debug!(
            candidates = candidates.len(),
            uncached = uncached.len(),
            "Explanation cache probed"
        );

        let fetched = if uncached.is_empty() {
            Fetched::Skipped
        } else {
            self.fetch(result, &uncached).await
        };

        let entries = candidates
            .iter()
            .zip(cached)
            .map(|(ranked, hit)| {
                let status = match (hit, &fetched) {
                    (Some(text), _) => ExplanationStatus::Explained {
                        text,
                        from_cache: true,
                    },
                    (None, Fetched::Replied(found)) => match found.get(&ranked.line.san) {
                        Some(text) => ExplanationStatus::Explained {
                            text: text.clone(),
                            from_cache: false,
                        },
                        None => ExplanationStatus::Unavailable,
                    },
                    (None, Fetched::Failed | Fetched::Skipped) => ExplanationStatus::Failed,
                };
                MoveExplanation {
                    san: ranked.line.san.clone(),
                    uci: ranked.line.uci.clone(),
                    eval: ranked.eval.text.clone(),
                    status,
                }
            })
            .collect();

        ExplanationReport {
            fen: result.fen.clone(),
            entries,
            external_requests: usize::from(!matches!(fetched, Fetched::Skipped)),
        }
    }

    /// One request for every uncached move. Matched explanations are written
    /// back to the cache without waiting for the writes.
    async fn fetch(&self, result: &RankedResult, uncached: &[&RankedLine]) -> Fetched {
        let request = prompt::build(&result.fen, result.side_to_move, uncached);
        let reply = match self.service.explain(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, moves = uncached.len(), "Explanation request failed");
                return Fetched::Failed;
            }
        };

        let wanted: Vec<Candidate<'_>> = uncached
            .iter()
            .map(|ranked| Candidate {
                san: &ranked.line.san,
                uci: &ranked.line.uci,
            })
            .collect();
        let found = match_explanations(&reply, &wanted);
        info!(requested = uncached.len(), matched = found.len(), "Explanations received");

        for (san, text) in &found {
            let entry = CacheEntry::new(&result.fen, san, text.clone());
            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                if let Err(e) = cache.upsert(entry).await {
                    warn!(error = %e, "Failed to cache explanation");
                }
            });
        }

        Fetched::Replied(found)
    }
}
