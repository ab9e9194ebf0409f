//! Natural-language explanations for candidate moves.

pub mod cache;
pub mod client;
pub mod pipeline;
pub mod prompt;
pub mod reply;

pub use cache::{cache_key, CacheEntry, ExplanationCache, MemoryCache, PgCache};
pub use client::{ChatClient, ExplanationService};
pub use pipeline::{ExplanationPipeline, ExplanationReport, ExplanationStatus, MoveExplanation};
pub use prompt::Prompt;
