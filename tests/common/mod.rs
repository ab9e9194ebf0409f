use std::sync::{Arc, Mutex};
use std::time::Duration;

use move_advisor::config::{AppConfig, EngineConfig};
use move_advisor::{AnalysisView, EngineMessage, EngineSession, RankedResult};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};

/// Reply line that makes the fake engine close its pipes.
pub const EXIT: &str = "__exit__";

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Small, fast settings for tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.engine = EngineConfig {
        depth: 12,
        multipv: 3,
        handshake_timeout: Duration::from_secs(2),
        ..EngineConfig::default()
    };
    config.debounce = Duration::from_millis(30);
    config
}

/// An initialized session talking to an in-process scripted engine.
pub struct FakeEngine {
    pub session: EngineSession,
    pub messages: mpsc::UnboundedReceiver<EngineMessage>,
    /// Every command the engine received, in order
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeEngine {
    /// `replies` maps the FEN of the last `position` command to the lines
    /// written back for `go` (including the `bestmove`).
    pub async fn start<F>(config: &EngineConfig, replies: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + 'static,
    {
        let (ours, theirs) = duplex(64 * 1024);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let seen = commands.clone();

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read).lines();
            let mut fen = String::new();
            while let Ok(Some(cmd)) = lines.next_line().await {
                seen.lock().unwrap().push(cmd.clone());
                let out = if cmd == "uci" {
                    "id name Fake Engine\nuciok\n".to_string()
                } else if cmd == "isready" {
                    "readyok\n".to_string()
                } else if cmd == "quit" {
                    break;
                } else if let Some(f) = cmd.strip_prefix("position fen ") {
                    fen = f.to_string();
                    continue;
                } else if cmd.starts_with("go") {
                    let replies = replies(&fen);
                    let exit = replies.iter().any(|l| l == EXIT);
                    let mut out = String::new();
                    for line in replies.iter().filter(|l| *l != EXIT) {
                        out.push_str(line);
                        out.push('\n');
                    }
                    if write.write_all(out.as_bytes()).await.is_err() || exit {
                        break;
                    }
                    continue;
                } else {
                    continue;
                };
                if write.write_all(out.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let (read, write) = tokio::io::split(ours);
        let mut session = EngineSession::new(config.clone());
        let messages = session
            .initialize_with_io(read, write)
            .await
            .expect("fake engine handshake");
        Self {
            session,
            messages,
            commands,
        }
    }

    pub fn commands(commands: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        commands.lock().unwrap().clone()
    }
}

/// Wait (bounded) for a final ranked result for `fen`.
pub async fn final_result(view: &mut watch::Receiver<AnalysisView>, fen: &str) -> RankedResult {
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| matches!(v, AnalysisView::Ranked(r) if r.is_final && r.fen == fen)),
    )
    .await
    .expect("timed out waiting for analysis")
    .expect("analysis view closed")
    .clone();
    match seen {
        AnalysisView::Ranked(result) => result,
        other => panic!("unexpected view {other:?}"),
    }
}
