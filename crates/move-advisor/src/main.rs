//! Move Advisor
//!
//! Interactive shell: play moves, watch the engine's ranked candidates
//! update, and ask for explanations of the top moves.

use std::sync::Arc;

use anyhow::Context;
use chess_core::{Game, Position};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use move_advisor::config::AppConfig;
use move_advisor::context::{AnalysisContext, AnalysisView};
use move_advisor::db;
use move_advisor::explain::{
    ChatClient, ExplanationPipeline, ExplanationReport, MemoryCache, PgCache,
};
use move_advisor::RankedResult;

const HELP: &str = "\
Commands:
  <move>            play a move (SAN like Nf3 or UCI like g1f3)
  undo              take back the last move
  new               start a new game
  fen <FEN>         set up a position
  replay <m1 m2 ..> play several moves back to back
  show              print the position and the latest analysis
  explain           explain the top candidate moves
  help              show this help
  quit              exit";

/// Parse `--fen <FEN>` from CLI args
fn parse_start_fen() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    let idx = args.iter().position(|a| a == "--fen")?;
    let fen = args[idx + 1..].join(" ");
    (!fen.trim().is_empty()).then_some(fen)
}

enum Explainer {
    Postgres(ExplanationPipeline<PgCache, ChatClient>),
    Memory(ExplanationPipeline<MemoryCache, ChatClient>),
    Disabled(String),
}

impl Explainer {
    async fn build(config: &AppConfig) -> Self {
        let client = match ChatClient::new(&config.explain) {
            Ok(client) => Arc::new(client),
            Err(e) => return Self::Disabled(e.to_string()),
        };
        let top_k = config.explain.top_k;

        let Some(url) = config.database_url.as_deref() else {
            info!("No DATABASE_URL, caching explanations in memory");
            return Self::Memory(ExplanationPipeline::new(
                Arc::new(MemoryCache::new()),
                client,
                top_k,
            ));
        };
        match connect_cache(url).await {
            Ok(cache) => {
                info!("Explanation cache connected");
                Self::Postgres(ExplanationPipeline::new(Arc::new(cache), client, top_k))
            }
            Err(e) => {
                warn!(error = %e, "Explanation cache unavailable, using in-memory cache");
                Self::Memory(ExplanationPipeline::new(
                    Arc::new(MemoryCache::new()),
                    client,
                    top_k,
                ))
            }
        }
    }

    async fn explain(&self, result: &RankedResult) -> Result<ExplanationReport, String> {
        match self {
            Self::Postgres(pipeline) => Ok(pipeline.explain(result).await),
            Self::Memory(pipeline) => Ok(pipeline.explain(result).await),
            Self::Disabled(reason) => Err(reason.clone()),
        }
    }
}

async fn connect_cache(url: &str) -> Result<PgCache, sqlx::Error> {
    let pool = db::create_pool(url).await?;
    db::run_migrations(&pool).await?;
    Ok(PgCache::new(pool))
}

struct Shell {
    game: Game,
    analysis: AnalysisContext,
    explainer: Explainer,
}

enum Flow {
    Continue,
    Quit,
}

impl Shell {
    async fn handle(&mut self, input: &str) -> Flow {
        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command {
            "" => {}
            "quit" | "exit" => return Flow::Quit,
            "help" => println!("{HELP}"),
            "new" => {
                self.game.reset();
                self.position_changed().await;
            }
            "undo" => match self.game.undo() {
                Ok(undone) => {
                    println!("took back {}", undone.san);
                    self.position_changed().await;
                }
                Err(e) => println!("{e}"),
            },
            "fen" => match self.game.load_fen(rest) {
                Ok(()) => self.position_changed().await,
                Err(e) => println!("{e}"),
            },
            "replay" => {
                for intent in rest.split_whitespace() {
                    if let Err(e) = self.game.play(intent) {
                        println!("{e}");
                        break;
                    }
                    self.position_changed().await;
                }
            }
            "show" => self.show(),
            "explain" => self.explain().await,
            _ => match self.game.play(input) {
                Ok(played) => {
                    println!("played {}", played.san);
                    self.position_changed().await;
                }
                Err(e) => println!("{e}"),
            },
        }
        Flow::Continue
    }

    async fn position_changed(&self) {
        let current = self.game.current();
        println!("{}", self.game.move_text());
        println!("{current}");
        if let Some(outcome) = current.outcome() {
            println!("game over: {outcome}");
            self.analysis.cancel().await;
            return;
        }
        self.analysis.position_changed(current.clone()).await;
    }

    fn current_result(&self) -> Option<RankedResult> {
        self.analysis.latest_for(self.game.current().fen())
    }

    fn show(&self) {
        let current = self.game.current();
        println!("{}", self.game.move_text());
        println!("{current} ({} legal moves)", current.legal_move_count());
        match (self.analysis.latest(), self.current_result()) {
            (AnalysisView::Unavailable(reason), _) => println!("analysis unavailable: {reason}"),
            (_, Some(result)) => render(&result),
            (_, None) => println!("analysis pending"),
        }
    }

    async fn explain(&self) {
        let Some(result) = self.current_result() else {
            println!("no analysis for this position yet");
            return;
        };
        match self.explainer.explain(&result).await {
            Ok(report) => {
                for entry in &report.entries {
                    println!("  {:<7} {:>7}  {}", entry.san, entry.eval, entry.status);
                }
            }
            Err(reason) => println!("explanations disabled: {reason}"),
        }
    }
}

fn render(result: &RankedResult) {
    let marker = if result.is_final { " (final)" } else { "" };
    println!("depth {}{marker}:", result.depth);
    for (i, ranked) in result.lines.iter().enumerate() {
        println!(
            "  {}. {:<7} {:>7}  {:>5.1}%  {}",
            i + 1,
            ranked.line.san,
            ranked.eval.text,
            ranked.eval.win_probability,
            continuation(&result.fen, &ranked.line.pv)
        );
    }
}

/// Principal variation in SAN, cut at the first move that does not replay.
fn continuation(fen: &str, pv: &[String]) -> String {
    let Ok(mut position) = Position::from_fen(fen) else {
        return pv.join(" ");
    };
    let mut sans = Vec::with_capacity(pv.len());
    for uci in pv.iter().take(8) {
        match position.apply(uci) {
            Ok((next, played)) => {
                sans.push(played.san);
                position = next;
            }
            Err(_) => break,
        }
    }
    sans.join(" ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout belongs to the shell
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load().context("invalid configuration")?;
    info!(
        engine = %config.engine.path,
        depth = config.engine.depth,
        multipv = config.engine.multipv,
        "Config loaded"
    );

    let game = match parse_start_fen() {
        Some(fen) => Game::from_position(Position::from_fen(&fen).context("invalid --fen")?),
        None => Game::new(),
    };

    let analysis = AnalysisContext::start(&config).await;
    if let AnalysisView::Unavailable(reason) = analysis.latest() {
        println!("analysis unavailable: {reason}");
    }
    let explainer = Explainer::build(&config).await;
    if let Explainer::Disabled(reason) = &explainer {
        info!(reason = %reason, "Explanations disabled");
    }

    let mut view = analysis.subscribe();
    let mut watching = analysis.is_enabled();
    let mut shell = Shell {
        game,
        analysis,
        explainer,
    };
    println!("{HELP}");
    shell.position_changed().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = shell.handle(line.trim()).await {
                    break;
                }
            }
            changed = view.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let latest = view.borrow_and_update().clone();
                match latest {
                    AnalysisView::Ranked(result)
                        if result.is_final && result.fen == shell.game.current().fen() =>
                    {
                        render(&result);
                    }
                    AnalysisView::Unavailable(reason) => {
                        println!("analysis unavailable: {reason}");
                        watching = false;
                    }
                    _ => {}
                }
            }
        }
    }

    shell.analysis.shutdown().await;
    Ok(())
}
