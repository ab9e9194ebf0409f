//! The analysis context owned by the shell.
//!
//! Wires one engine session to the scheduler (which owns the engine) and to
//! a pump task (which feeds engine output through the aggregator). Ranked
//! snapshots are published on a `watch` channel so observers only ever see
//! the newest one.

use std::sync::Arc;

use chess_core::Position;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::aggregator::{AnalysisAggregator, LineOutcome, RankedResult};
use crate::config::AppConfig;
use crate::engine::{AnalysisEngine, EngineMessage, EngineSession};
use crate::error::AnalysisError;
use crate::scheduler::{RequestScheduler, SchedulerCommand};

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisView {
    /// Nothing published yet
    Idle,
    Ranked(RankedResult),
    /// Analysis is disabled; manual play continues
    Unavailable(String),
}

impl AnalysisView {
    pub fn ranked(&self) -> Option<&RankedResult> {
        match self {
            Self::Ranked(result) => Some(result),
            _ => None,
        }
    }
}

pub struct AnalysisContext {
    commands: Option<mpsc::Sender<SchedulerCommand>>,
    view: watch::Receiver<AnalysisView>,
    scheduler: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl AnalysisContext {
    /// Start the engine and the analysis tasks. If the engine cannot be
    /// started the context still comes up, with analysis disabled.
    pub async fn start(config: &AppConfig) -> Self {
        let mut session = EngineSession::new(config.engine.clone());
        match session.initialize().await {
            Ok(messages) => {
                info!(engine = %session.name(), "Analysis enabled");
                Self::with_engine(session, messages, config)
            }
            Err(e) => {
                warn!(error = %e, "Analysis disabled");
                Self::unavailable(e.to_string())
            }
        }
    }

    /// Build a context around an engine that has already been initialized.
    pub fn with_engine<E>(
        engine: E,
        messages: mpsc::UnboundedReceiver<EngineMessage>,
        config: &AppConfig,
    ) -> Self
    where
        E: AnalysisEngine + 'static,
    {
        let aggregator = Arc::new(Mutex::new(AnalysisAggregator::new(
            config.engine.multipv,
            config.engine.score_perspective,
        )));
        let (view_tx, view_rx) = watch::channel(AnalysisView::Idle);
        let (commands_tx, commands_rx) = mpsc::channel(64);

        let scheduler = RequestScheduler::new(
            engine,
            aggregator.clone(),
            config.debounce,
            config.engine.depth,
        );
        let scheduler = tokio::spawn(async move {
            let mut engine = scheduler.run(commands_rx).await;
            engine.shutdown().await;
        });
        let pump = tokio::spawn(pump(messages, aggregator, view_tx));

        Self {
            commands: Some(commands_tx),
            view: view_rx,
            scheduler: Some(scheduler),
            pump: Some(pump),
        }
    }

    /// A context with analysis disabled from the start.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let (_view_tx, view_rx) = watch::channel(AnalysisView::Unavailable(reason.into()));
        Self {
            commands: None,
            view: view_rx,
            scheduler: None,
            pump: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.commands.is_some() && !matches!(*self.view.borrow(), AnalysisView::Unavailable(_))
    }

    /// Queue `position` for analysis (debounced).
    pub async fn position_changed(&self, position: Position) {
        self.send(SchedulerCommand::PositionChanged(position)).await;
    }

    /// Drop any analysis request still waiting out the debounce delay.
    pub async fn cancel(&self) {
        self.send(SchedulerCommand::Cancel).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisView> {
        self.view.clone()
    }

    /// The newest published view. A ranked result stays here until the next
    /// position publishes, so it may describe an earlier position; compare
    /// `fen` or use [`latest_for`](Self::latest_for).
    pub fn latest(&self) -> AnalysisView {
        self.view.borrow().clone()
    }

    /// The newest ranked result, only if it was computed for `fen`.
    pub fn latest_for(&self, fen: &str) -> Option<RankedResult> {
        self.view.borrow().ranked().filter(|r| r.fen == fen).cloned()
    }

    /// Stop the scheduler, quit the engine and wait for both tasks.
    pub async fn shutdown(mut self) {
        self.send(SchedulerCommand::Shutdown).await;
        self.commands = None;
        if let Some(scheduler) = self.scheduler.take() {
            let _ = scheduler.await;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        debug!("Analysis context shut down");
    }

    async fn send(&self, command: SchedulerCommand) {
        if let Some(commands) = &self.commands {
            if commands.send(command).await.is_err() {
                warn!("Scheduler is gone, command dropped");
            }
        }
    }
}

impl Drop for AnalysisContext {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(
    mut messages: mpsc::UnboundedReceiver<EngineMessage>,
    aggregator: Arc<Mutex<AnalysisAggregator>>,
    view: watch::Sender<AnalysisView>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            EngineMessage::Line { generation, line } => {
                let outcome = aggregator.lock().await.ingest(generation, &line);
                match outcome {
                    Ok(LineOutcome::Published(result)) => {
                        trace!(generation, depth = result.depth, "Publishing ranked result");
                        view.send_replace(AnalysisView::Ranked(result));
                    }
                    Ok(LineOutcome::BelowDepthFloor { depth, floor }) => {
                        trace!(generation, depth, floor, "Line below depth floor");
                    }
                    Ok(LineOutcome::Accepted | LineOutcome::Ignored) => {}
                    Err(AnalysisError::StaleResult { line: stale, current }) => {
                        trace!(stale, current, "Dropped stale engine line");
                    }
                    Err(e) => warn!(error = %e, line = %line, "Discarded engine line"),
                }
            }
            EngineMessage::Failed(reason) => {
                view.send_replace(AnalysisView::Unavailable(reason));
                break;
            }
        }
    }
}
