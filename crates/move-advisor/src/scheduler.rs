//! Debounced dispatch of analysis requests.
//!
//! Position changes land in a single pending slot; each change replaces the
//! slot and restarts the deadline. When the deadline passes the scheduler
//! bumps the generation, resets the aggregator under the new generation and
//! only then asks the engine to analyze. Output from superseded requests is
//! never awaited; the aggregator's generation check drops it.

use std::sync::Arc;
use std::time::Duration;

use chess_core::Position;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::AnalysisAggregator;
use crate::engine::AnalysisEngine;
use crate::error::AnalysisError;

#[derive(Debug)]
pub enum SchedulerCommand {
    PositionChanged(Position),
    Cancel,
    Shutdown,
}

struct Pending {
    position: Position,
    due: Instant,
}

pub struct RequestScheduler<E> {
    engine: E,
    aggregator: Arc<Mutex<AnalysisAggregator>>,
    delay: Duration,
    depth: u32,
    generation: u64,
    pending: Option<Pending>,
}

impl<E: AnalysisEngine> RequestScheduler<E> {
    pub fn new(
        engine: E,
        aggregator: Arc<Mutex<AnalysisAggregator>>,
        delay: Duration,
        depth: u32,
    ) -> Self {
        Self {
            engine,
            aggregator,
            delay,
            depth,
            generation: 0,
            pending: None,
        }
    }

    /// Latest wins: replaces whatever is pending and restarts the delay.
    pub fn position_changed(&mut self, position: Position) {
        self.pending = Some(Pending {
            position,
            due: Instant::now() + self.delay,
        });
    }

    /// Drop the pending request, if any. A search already dispatched keeps
    /// running until the next dispatch stops it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Generation of the most recently dispatched request (0 before any).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Dispatch the pending position now, regardless of its deadline.
    /// Returns the generation it was dispatched under.
    pub async fn dispatch(&mut self) -> Result<Option<u64>, AnalysisError> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };

        self.generation += 1;
        let generation = self.generation;
        self.aggregator
            .lock()
            .await
            .reset(generation, pending.position.clone());

        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "Failed to stop previous search");
        }
        debug!(generation, fen = %pending.position, depth = self.depth, "Dispatching analysis");
        self.engine
            .analyze(&pending.position, self.depth, generation)
            .await?;
        Ok(Some(generation))
    }

    /// Process commands until `Shutdown` or the channel closes, then hand the
    /// engine back to the caller.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) -> E {
        loop {
            let due = self.next_due();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SchedulerCommand::PositionChanged(position)) => {
                        self.position_changed(position);
                    }
                    Some(SchedulerCommand::Cancel) => self.cancel(),
                    Some(SchedulerCommand::Shutdown) | None => break,
                },
                () = sleep_until_due(due) => {
                    if let Err(e) = self.dispatch().await {
                        warn!(error = %e, "Analysis request was not dispatched");
                    }
                }
            }
        }
        info!(generation = self.generation, "Scheduler stopped");
        self.engine
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ScorePerspective;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Stop,
        Analyze { fen: String, depth: u32, generation: u64 },
    }

    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<Call>,
    }

    impl RecordingEngine {
        fn analyzed(&self) -> Vec<(String, u64)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Analyze { fen, generation, .. } => Some((fen.clone(), *generation)),
                    Call::Stop => None,
                })
                .collect()
        }
    }

    impl AnalysisEngine for RecordingEngine {
        async fn stop(&mut self) -> Result<(), AnalysisError> {
            self.calls.push(Call::Stop);
            Ok(())
        }

        async fn analyze(
            &mut self,
            position: &Position,
            depth: u32,
            generation: u64,
        ) -> Result<(), AnalysisError> {
            self.calls.push(Call::Analyze {
                fen: position.fen().to_string(),
                depth,
                generation,
            });
            Ok(())
        }
    }

    fn positions_after(moves: &[&str]) -> Vec<Position> {
        let mut current = Position::starting();
        let mut out = Vec::new();
        for m in moves {
            let (next, _) = current.apply(m).unwrap();
            out.push(next.clone());
            current = next;
        }
        out
    }

    fn scheduler() -> (
        RequestScheduler<RecordingEngine>,
        Arc<Mutex<AnalysisAggregator>>,
    ) {
        let aggregator = Arc::new(Mutex::new(AnalysisAggregator::new(
            4,
            ScorePerspective::White,
        )));
        let scheduler = RequestScheduler::new(
            RecordingEngine::default(),
            aggregator.clone(),
            Duration::from_millis(100),
            18,
        );
        (scheduler, aggregator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_collapse_to_last_position() {
        let (scheduler, aggregator) = scheduler();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(scheduler.run(rx));

        let positions = positions_after(&["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        for position in &positions {
            tx.send(SchedulerCommand::PositionChanged(position.clone()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(SchedulerCommand::Shutdown).await.unwrap();
        let engine = handle.await.unwrap();

        let last = positions.last().unwrap().fen().to_string();
        assert_eq!(engine.analyzed(), vec![(last, 1)]);
        assert_eq!(engine.calls[0], Call::Stop);
        assert_eq!(aggregator.lock().await.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_changes_each_dispatch() {
        let (scheduler, aggregator) = scheduler();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(scheduler.run(rx));

        let positions = positions_after(&["d4", "d5"]);
        for position in &positions {
            tx.send(SchedulerCommand::PositionChanged(position.clone()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        tx.send(SchedulerCommand::Shutdown).await.unwrap();
        let engine = handle.await.unwrap();

        let analyzed = engine.analyzed();
        assert_eq!(analyzed.len(), 2);
        assert_eq!(analyzed[0].1, 1);
        assert_eq!(analyzed[1], (positions[1].fen().to_string(), 2));
        assert_eq!(aggregator.lock().await.position(), Some(&positions[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_request() {
        let (scheduler, _aggregator) = scheduler();
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(scheduler.run(rx));

        tx.send(SchedulerCommand::PositionChanged(Position::starting()))
            .await
            .unwrap();
        tx.send(SchedulerCommand::Cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(tx);
        let engine = handle.await.unwrap();

        assert!(engine.calls.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_resets_aggregator_before_analyze() {
        let (mut scheduler, aggregator) = scheduler();
        assert_eq!(scheduler.dispatch().await.unwrap(), None);

        let position = positions_after(&["c4"]).remove(0);
        scheduler.position_changed(position.clone());
        assert!(scheduler.has_pending());
        assert_eq!(scheduler.dispatch().await.unwrap(), Some(1));
        assert!(!scheduler.has_pending());

        let agg = aggregator.lock().await;
        assert_eq!(agg.generation(), 1);
        assert_eq!(agg.current_depth(), 0);
        assert_eq!(agg.position(), Some(&position));
        assert_eq!(
            scheduler.engine.calls.last(),
            Some(&Call::Analyze {
                fen: position.fen().to_string(),
                depth: 18,
                generation: 1
            })
        );
    }

    #[tokio::test]
    async fn test_new_change_restarts_deadline() {
        let (mut scheduler, _aggregator) = scheduler();
        scheduler.position_changed(Position::starting());
        let first = scheduler.next_due().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.position_changed(Position::starting());
        assert!(scheduler.next_due().unwrap() > first);
    }
}
