//! UCI engine session (async I/O).
//!
//! The session owns the engine's stdin. Its stdout is handed to a reader
//! task after the handshake; the reader forwards search output on an
//! unbounded channel, tagging every line with the generation of the `go`
//! that produced it. Each `go` is answered by exactly one `bestmove`, so
//! attribution is a FIFO of outstanding generations popped on `bestmove`.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chess_core::Position;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::protocol::{self, is_search_output};
use super::AnalysisEngine;
use crate::config::EngineConfig;
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Analyzing,
    /// Terminal: the process could not be started or stopped talking
    Failed,
}

/// Output delivered to the session's observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    /// An `info` or `bestmove` line, tagged with the request that produced it
    Line { generation: u64, line: String },
    /// The engine went away; no further lines will follow
    Failed(String),
}

#[derive(Debug)]
struct Shared {
    state: SessionState,
    outstanding: VecDeque<u64>,
}

type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct EngineSession {
    config: EngineConfig,
    shared: Arc<Mutex<Shared>>,
    stdin: Option<EngineWriter>,
    process: Option<Child>,
    reader: Option<JoinHandle<()>>,
    name: String,
}

impl EngineSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Uninitialized,
                outstanding: VecDeque::new(),
            })),
            stdin: None,
            process: None,
            reader: None,
            name: String::new(),
        }
    }

    /// Spawn the engine process and run the UCI handshake.
    pub async fn initialize(&mut self) -> Result<mpsc::UnboundedReceiver<EngineMessage>, AnalysisError> {
        let spawned = Command::new(&self.config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut process = match spawned {
            Ok(process) => process,
            Err(e) => {
                return Err(self.fail(format!("Failed to spawn {}: {e}", self.config.path)));
            }
        };

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            return Err(self.fail("Engine process has no stdio pipes".to_string()));
        };
        self.process = Some(process);

        self.initialize_with_io(stdout, stdin).await
    }

    /// Run the handshake over an arbitrary duplex transport.
    pub async fn initialize_with_io<R, W>(
        &mut self,
        reader: R,
        writer: W,
    ) -> Result<mpsc::UnboundedReceiver<EngineMessage>, AnalysisError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if self.state() != SessionState::Uninitialized {
            return Err(AnalysisError::NotReady(self.state()));
        }

        self.stdin = Some(Box::new(writer));
        let mut stdout = BufReader::new(reader);

        let timeout = self.config.handshake_timeout;
        match tokio::time::timeout(timeout, self.handshake(&mut stdout)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail(e.to_string())),
            Err(_) => {
                return Err(self.fail(format!("Handshake timed out after {timeout:?}")));
            }
        }

        self.lock().state = SessionState::Ready;
        info!(engine = %self.name, multipv = self.config.multipv, "Engine ready");

        let (tx, rx) = mpsc::unbounded_channel();
        self.reader = Some(tokio::spawn(read_loop(stdout, self.shared.clone(), tx)));
        Ok(rx)
    }

    async fn handshake<R>(&mut self, stdout: &mut BufReader<R>) -> Result<(), AnalysisError>
    where
        R: AsyncRead + Unpin,
    {
        self.send(protocol::UCI).await?;
        let mut name = String::new();
        wait_for(stdout, protocol::UCI_OK, |line| {
            if let Some(id) = line.strip_prefix("id name ") {
                name = id.to_string();
            }
        })
        .await?;
        self.name = if name.is_empty() {
            "Unknown Engine".to_string()
        } else {
            name
        };

        self.send(&protocol::set_option("MultiPV", self.config.multipv))
            .await?;
        self.send(protocol::IS_READY).await?;
        wait_for(stdout, protocol::READY_OK, |_| {}).await
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Engine name reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop any running search, then search `position` to `depth`.
    ///
    /// Accepted once the handshake has completed; a search still running is
    /// stopped first. Rejected (never queued) before readiness or after
    /// failure.
    pub async fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        generation: u64,
    ) -> Result<(), AnalysisError> {
        self.ensure_usable()?;
        self.send(protocol::STOP).await?;
        self.send(&protocol::position_fen(position.fen())).await?;
        {
            // Enqueue before `go` is written so no output can precede it.
            let mut shared = self.lock();
            shared.outstanding.push_back(generation);
            shared.state = SessionState::Analyzing;
        }
        self.send(&protocol::go_depth(depth)).await
    }

    /// Ask the engine to stop searching. No-op unless a search is running.
    pub async fn stop(&mut self) -> Result<(), AnalysisError> {
        match self.state() {
            SessionState::Analyzing => self.send(protocol::STOP).await,
            SessionState::Failed => Err(AnalysisError::EngineUnavailable(
                "engine session has failed".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Send `quit` and wait for the process to exit.
    pub async fn shutdown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.state() != SessionState::Failed && self.stdin.is_some() {
            let _ = self.send(protocol::QUIT).await;
        }
        if let Some(mut process) = self.process.take() {
            match tokio::time::timeout(Duration::from_secs(2), process.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Engine did not exit after quit, killing");
                    let _ = process.kill().await;
                }
            }
        }
        self.stdin = None;
    }

    fn ensure_usable(&self) -> Result<(), AnalysisError> {
        match self.state() {
            SessionState::Ready | SessionState::Analyzing => Ok(()),
            SessionState::Failed => Err(AnalysisError::EngineUnavailable(
                "engine session has failed".into(),
            )),
            state @ SessionState::Uninitialized => Err(AnalysisError::NotReady(state)),
        }
    }

    /// Send a command to the engine
    async fn send(&mut self, cmd: &str) -> Result<(), AnalysisError> {
        debug!(cmd, "SF <");
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AnalysisError::NotReady(self.state()));
        };
        let written = async {
            stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        written.map_err(|e| self.fail(format!("Failed to write to engine: {e}")))
    }

    fn fail(&self, reason: String) -> AnalysisError {
        error!(reason = %reason, "Engine session failed");
        let mut shared = self.lock();
        shared.state = SessionState::Failed;
        shared.outstanding.clear();
        AnalysisError::EngineUnavailable(reason)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }
}

impl AnalysisEngine for EngineSession {
    async fn stop(&mut self) -> Result<(), AnalysisError> {
        EngineSession::stop(self).await
    }

    async fn analyze(
        &mut self,
        position: &Position,
        depth: u32,
        generation: u64,
    ) -> Result<(), AnalysisError> {
        EngineSession::analyze(self, position, depth, generation).await
    }

    async fn shutdown(&mut self) {
        EngineSession::shutdown(self).await
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // Best-effort synchronous kill in drop
        if let Some(process) = self.process.as_mut() {
            let _ = process.start_kill();
        }
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read until `expected`, passing every other line to `on_line`.
async fn wait_for<R, F>(
    stdout: &mut BufReader<R>,
    expected: &str,
    mut on_line: F,
) -> Result<(), AnalysisError>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| AnalysisError::EngineUnavailable(format!("Failed to read from engine: {e}")))?;
        if read == 0 {
            return Err(AnalysisError::EngineUnavailable(format!(
                "Engine closed its output while waiting for {expected}"
            )));
        }
        let trimmed = line.trim();
        debug!(line = trimmed, "SF >");
        if trimmed == expected {
            return Ok(());
        }
        on_line(trimmed);
    }
}

async fn read_loop<R>(
    stdout: BufReader<R>,
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::UnboundedSender<EngineMessage>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = stdout.lines();
    let reason = loop {
        match lines.next_line().await {
            Ok(Some(raw)) => {
                let line = raw.trim();
                if !is_search_output(line) {
                    trace!(line, "SF > (ignored)");
                    continue;
                }
                let generation = {
                    let mut shared = lock_shared(&shared);
                    let Some(&generation) = shared.outstanding.front() else {
                        trace!(line, "Output with no outstanding request");
                        continue;
                    };
                    if line.starts_with("bestmove") {
                        shared.outstanding.pop_front();
                        if shared.outstanding.is_empty() && shared.state == SessionState::Analyzing {
                            shared.state = SessionState::Ready;
                        }
                    }
                    generation
                };
                trace!(generation, line, "SF >");
                let message = EngineMessage::Line {
                    generation,
                    line: line.to_string(),
                };
                if tx.send(message).is_err() {
                    debug!("Engine observer dropped, stopping reader");
                    return;
                }
            }
            Ok(None) => break "Engine process exited".to_string(),
            Err(e) => break format!("Failed to read from engine: {e}"),
        }
    };

    error!(reason = %reason, "Engine session failed");
    {
        let mut shared = lock_shared(&shared);
        shared.state = SessionState::Failed;
        shared.outstanding.clear();
    }
    let _ = tx.send(EngineMessage::Failed(reason));
}
