//! Analysis error types

use thiserror::Error;

use crate::engine::SessionState;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine not ready (state: {0:?})")]
    NotReady(SessionState),

    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    #[error("Stale result: line from generation {line}, current is {current}")]
    StaleResult { line: u64, current: u64 },

    #[error("Principal variation move {uci} is not legal in {fen}")]
    IllegalPrincipalVariation { uci: String, fen: String },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Explanation service error: {0}")]
    ExplanationService(String),

    #[error("Chess error: {0}")]
    Chess(#[from] chess_core::ChessError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
