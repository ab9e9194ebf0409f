//! Folds streamed engine output into a ranked candidate list.
//!
//! Lines are accepted per rank only when their depth reaches the deepest
//! depth seen so far for the current request, so a published snapshot never
//! regresses to a shallower multi-line view. Every line carries the
//! generation of the request that produced it; anything not matching the
//! current generation is dropped before it can touch state.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chess_core::{Color, Position};
use tracing::trace;

use crate::engine::protocol::{parse_line, EngineLine, ProgressLine};
use crate::error::AnalysisError;
use crate::eval::{convert, DisplayEval, EngineScore, ScorePerspective};

/// Snapshots are republished from this depth on, at even depths.
pub const PUBLISH_MIN_DEPTH: u32 = 10;

/// Best-known line for one multi-PV rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLine {
    pub rank: u32,
    pub san: String,
    pub uci: String,
    pub depth: u32,
    /// Score exactly as the engine reported it
    pub score: EngineScore,
    pub pv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedLine {
    pub line: CandidateLine,
    pub eval: DisplayEval,
}

/// Immutable snapshot handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub generation: u64,
    pub fen: String,
    pub side_to_move: Color,
    pub depth: u32,
    /// Set on the snapshot published for `bestmove`
    pub is_final: bool,
    pub best_move: Option<String>,
    /// Best first for the side to move
    pub lines: Vec<RankedLine>,
}

impl RankedResult {
    pub fn top(&self, k: usize) -> &[RankedLine] {
        &self.lines[..k.min(self.lines.len())]
    }

    pub fn best(&self) -> Option<&RankedLine> {
        self.lines.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Stored, but no snapshot is due
    Accepted,
    Published(RankedResult),
    /// Shallower than the depth already reached for this request
    BelowDepthFloor { depth: u32, floor: u32 },
    /// Not a progress or terminal line, or nothing is being analyzed
    Ignored,
}

pub struct AnalysisAggregator {
    max_lines: u32,
    perspective: ScorePerspective,
    generation: u64,
    position: Option<Position>,
    current_depth: u32,
    lines_by_rank: BTreeMap<u32, CandidateLine>,
    finished: bool,
}

impl AnalysisAggregator {
    pub fn new(max_lines: u32, perspective: ScorePerspective) -> Self {
        Self {
            max_lines,
            perspective,
            generation: 0,
            position: None,
            current_depth: 0,
            lines_by_rank: BTreeMap::new(),
            finished: false,
        }
    }

    /// Start over for a new request. Must happen before the engine is asked
    /// to analyze `position` under `generation`.
    pub fn reset(&mut self, generation: u64, position: Position) {
        self.generation = generation;
        self.position = Some(position);
        self.current_depth = 0;
        self.lines_by_rank.clear();
        self.finished = false;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn ingest(&mut self, generation: u64, raw: &str) -> Result<LineOutcome, AnalysisError> {
        if generation != self.generation {
            return Err(AnalysisError::StaleResult {
                line: generation,
                current: self.generation,
            });
        }
        if self.position.is_none() || self.finished {
            return Ok(LineOutcome::Ignored);
        }

        match parse_line(raw)? {
            EngineLine::Progress(progress) => self.accept(progress),
            EngineLine::BestMove { best, .. } => {
                self.finished = true;
                Ok(self
                    .snapshot(true, best)
                    .map_or(LineOutcome::Ignored, LineOutcome::Published))
            }
            EngineLine::Other => Ok(LineOutcome::Ignored),
        }
    }

    fn accept(&mut self, progress: ProgressLine) -> Result<LineOutcome, AnalysisError> {
        let Some(position) = self.position.as_ref() else {
            return Ok(LineOutcome::Ignored);
        };

        if progress.multipv == 0 || progress.multipv > self.max_lines {
            return Err(AnalysisError::ProtocolParse(format!(
                "rank {} outside 1..={}",
                progress.multipv, self.max_lines
            )));
        }

        // Replay the first move on a scratch copy; a move that is not legal
        // here belongs to some other position.
        let uci = progress.pv[0].clone();
        let san = position
            .san_for_uci(&uci)
            .map_err(|_| AnalysisError::IllegalPrincipalVariation {
                uci: uci.clone(),
                fen: position.fen().to_string(),
            })?;

        if progress.depth < self.current_depth {
            return Ok(LineOutcome::BelowDepthFloor {
                depth: progress.depth,
                floor: self.current_depth,
            });
        }

        self.current_depth = progress.depth;
        trace!(
            generation = self.generation,
            rank = progress.multipv,
            depth = progress.depth,
            san = %san,
            "Accepted line"
        );
        self.lines_by_rank.insert(
            progress.multipv,
            CandidateLine {
                rank: progress.multipv,
                san,
                uci,
                depth: progress.depth,
                score: progress.score,
                pv: progress.pv,
            },
        );

        if self.current_depth >= PUBLISH_MIN_DEPTH && self.current_depth % 2 == 0 {
            Ok(self
                .snapshot(false, None)
                .map_or(LineOutcome::Accepted, LineOutcome::Published))
        } else {
            Ok(LineOutcome::Accepted)
        }
    }

    /// Current ranked view, or `None` when nothing is being analyzed.
    pub fn snapshot(&self, is_final: bool, best_move: Option<String>) -> Option<RankedResult> {
        let position = self.position.as_ref()?;
        let side_to_move = position.side_to_move();
        let reported_from = self.perspective.reporting_side(side_to_move);

        let mut lines: Vec<RankedLine> = self
            .lines_by_rank
            .values()
            .map(|line| RankedLine {
                eval: convert(line.score, reported_from, side_to_move),
                line: line.clone(),
            })
            .collect();
        lines.sort_by_key(|l| (Reverse(l.eval.sort_key), l.line.rank));

        Some(RankedResult {
            generation: self.generation,
            fen: position.fen().to_string(),
            side_to_move,
            depth: self.current_depth,
            is_final,
            best_move,
            lines,
        })
    }
}
