//! External search engine: protocol and session.

use std::future::Future;

use chess_core::Position;

use crate::error::AnalysisError;

pub mod protocol;
pub mod session;

pub use session::{EngineMessage, EngineSession, SessionState};

/// What the scheduler needs from an engine.
pub trait AnalysisEngine: Send {
    fn stop(&mut self) -> impl Future<Output = Result<(), AnalysisError>> + Send;

    fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        generation: u64,
    ) -> impl Future<Output = Result<(), AnalysisError>> + Send;

    /// Release the engine once the scheduler is done with it.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
