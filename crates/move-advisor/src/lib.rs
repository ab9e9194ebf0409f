//! Engine-backed move advice for interactive play.
//!
//! A UCI engine session streams multi-PV search output; the aggregator folds
//! it into ranked candidate moves; the scheduler debounces position changes
//! so the engine only ever works on the latest position; the explanation
//! pipeline adds cached, batched natural-language explanations.

pub mod aggregator;
pub mod config;
pub mod context;
pub mod db;
pub mod engine;
pub mod error;
pub mod eval;
pub mod explain;
pub mod scheduler;

pub use aggregator::{AnalysisAggregator, CandidateLine, LineOutcome, RankedLine, RankedResult};
pub use config::AppConfig;
pub use context::{AnalysisContext, AnalysisView};
pub use engine::{AnalysisEngine, EngineMessage, EngineSession, SessionState};
pub use error::AnalysisError;
pub use eval::{DisplayEval, EngineScore, ScorePerspective};
pub use scheduler::{RequestScheduler, SchedulerCommand};
