//! Immutable position snapshots backed by `shakmaty`.
//!
//! A [`Position`] never changes after construction; applying a move returns a
//! new snapshot. Scratch replays (UCI → SAN conversion, legality probes) work
//! on clones and leave the original untouched.

use std::fmt;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Outcome, Position as _};

use crate::error::ChessError;
use crate::fen::board_field;

/// A move that was legally applied, in both notations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub san: String,
    pub uci: String,
}

#[derive(Clone)]
pub struct Position {
    fen: String,
    chess: Chess,
}

impl Position {
    pub fn starting() -> Self {
        Self::from_chess(Chess::default())
    }

    /// Parse and validate a FEN. The stored FEN is re-serialised, so two
    /// spellings of the same position compare equal.
    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let parsed: Fen = fen.trim().parse().map_err(|e| ChessError::InvalidFen {
            fen: fen.to_string(),
            reason: format!("{e}"),
        })?;
        let chess: Chess =
            parsed
                .into_position(CastlingMode::Standard)
                .map_err(|e| ChessError::InvalidFen {
                    fen: fen.to_string(),
                    reason: format!("{e}"),
                })?;
        Ok(Self::from_chess(chess))
    }

    fn from_chess(chess: Chess) -> Self {
        let fen = Fen::from_position(&chess, EnPassantMode::Legal).to_string();
        Self { fen, chess }
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Board-layout field only (no side to move, castling, ep or clocks).
    pub fn board_fen(&self) -> &str {
        board_field(&self.fen)
    }

    pub fn side_to_move(&self) -> Color {
        self.chess.turn()
    }

    pub fn is_game_over(&self) -> bool {
        self.chess.is_game_over()
    }

    /// `1-0`, `0-1` or `1/2-1/2` once the game is over.
    pub fn outcome(&self) -> Option<String> {
        match self.chess.outcome() {
            Outcome::Unknown => None,
            known => Some(known.to_string()),
        }
    }

    pub fn legal_move_count(&self) -> usize {
        self.chess.legal_moves().len()
    }

    /// Validate a move intent (SAN such as `Nf3`, or UCI such as `g1f3`)
    /// and return the resulting position together with the played move.
    pub fn apply(&self, intent: &str) -> Result<(Position, PlayedMove), ChessError> {
        let m = self.resolve(intent)?;
        let played = self.describe(m);
        let mut next = self.chess.clone();
        next.play_unchecked(m);
        Ok((Self::from_chess(next), played))
    }

    /// SAN for a UCI move, checked for legality against a scratch copy.
    pub fn san_for_uci(&self, uci: &str) -> Result<String, ChessError> {
        let m = self.resolve_uci(uci)?;
        Ok(self.describe(m).san)
    }

    fn resolve_uci(&self, uci: &str) -> Result<Move, ChessError> {
        let parsed: UciMove = uci
            .trim()
            .parse()
            .map_err(|_| ChessError::InvalidMove(uci.to_string()))?;
        parsed.to_move(&self.chess).map_err(|_| ChessError::IllegalMove {
            intent: uci.to_string(),
            fen: self.fen.clone(),
        })
    }

    fn resolve(&self, intent: &str) -> Result<Move, ChessError> {
        let intent = intent.trim();
        if let Ok(uci) = intent.parse::<UciMove>() {
            return uci.to_move(&self.chess).map_err(|_| ChessError::IllegalMove {
                intent: intent.to_string(),
                fen: self.fen.clone(),
            });
        }
        let san: SanPlus = intent
            .parse()
            .map_err(|_| ChessError::InvalidMove(intent.to_string()))?;
        san.san
            .to_move(&self.chess)
            .map_err(|_| ChessError::IllegalMove {
                intent: intent.to_string(),
                fen: self.fen.clone(),
            })
    }

    fn describe(&self, m: Move) -> PlayedMove {
        PlayedMove {
            san: SanPlus::from_move(self.chess.clone(), m).to_string(),
            uci: m.to_uci(CastlingMode::Standard).to_string(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::starting()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for Position {}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Position").field(&self.fen).finish()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}
