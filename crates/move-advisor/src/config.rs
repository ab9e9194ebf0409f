//! Configuration from environment variables (`.env` is loaded by `main`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AnalysisError;
use crate::eval::ScorePerspective;

pub const DEFAULT_EXPLAIN_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the UCI engine binary
    pub path: String,

    /// Search depth sent with `go depth`
    pub depth: u32,

    /// Number of parallel candidate lines (`MultiPV`)
    pub multipv: u32,

    /// Upper bound on the `uci`/`isready` handshake
    pub handshake_timeout: Duration,

    /// Which side the engine's scores are reported for
    pub score_perspective: ScorePerspective,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            depth: 20,
            multipv: 4,
            handshake_timeout: Duration::from_secs(10),
            score_perspective: ScorePerspective::White,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExplainConfig {
    /// Chat-completions endpoint
    pub api_url: String,

    /// Bearer token; explanations are disabled without one
    pub api_key: Option<String>,

    pub model: String,

    /// How many of the top candidates get explained
    pub top_k: usize,

    pub timeout: Duration,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_EXPLAIN_API_URL.to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            top_k: 4,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,

    /// Quiet period before a position change is sent to the engine
    pub debounce: Duration,

    pub explain: ExplainConfig,

    /// Postgres URL for the explanation cache (in-memory cache when unset)
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            debounce: Duration::from_millis(100),
            explain: ExplainConfig::default(),
            database_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and validate it.
    pub fn load() -> Result<Self, AnalysisError> {
        let defaults = Self::default();

        let engine = EngineConfig {
            path: env::var("STOCKFISH_PATH").unwrap_or(defaults.engine.path),
            depth: parse_var("ANALYSIS_DEPTH", defaults.engine.depth)?,
            multipv: parse_var("MULTIPV", defaults.engine.multipv)?,
            handshake_timeout: Duration::from_secs(parse_var(
                "ENGINE_HANDSHAKE_TIMEOUT_SECS",
                defaults.engine.handshake_timeout.as_secs(),
            )?),
            score_perspective: parse_var(
                "ENGINE_SCORE_PERSPECTIVE",
                defaults.engine.score_perspective,
            )?,
        };

        let explain = ExplainConfig {
            api_url: env::var("EXPLAIN_API_URL").unwrap_or(defaults.explain.api_url),
            api_key: env::var("EXPLAIN_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("EXPLAIN_MODEL").unwrap_or(defaults.explain.model),
            top_k: parse_var("EXPLAIN_TOP_K", defaults.explain.top_k)?,
            timeout: Duration::from_secs(parse_var(
                "EXPLAIN_TIMEOUT_SECS",
                defaults.explain.timeout.as_secs(),
            )?),
        };

        let config = Self {
            engine,
            debounce: Duration::from_millis(parse_var(
                "DEBOUNCE_MS",
                defaults.debounce.as_millis() as u64,
            )?),
            explain,
            database_url: env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.engine.path.trim().is_empty() {
            return Err(AnalysisError::Config("STOCKFISH_PATH is empty".into()));
        }
        if self.engine.depth == 0 {
            return Err(AnalysisError::Config("ANALYSIS_DEPTH must be at least 1".into()));
        }
        if !(1..=500).contains(&self.engine.multipv) {
            return Err(AnalysisError::Config("MULTIPV must be between 1 and 500".into()));
        }
        if self.explain.top_k == 0 {
            return Err(AnalysisError::Config("EXPLAIN_TOP_K must be at least 1".into()));
        }
        if self.explain.model.trim().is_empty() {
            return Err(AnalysisError::Config("EXPLAIN_MODEL is empty".into()));
        }
        Ok(())
    }
}

/// Parse an optional variable; a present but malformed value is an error.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AnalysisError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Config(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}
