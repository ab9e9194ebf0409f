use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Unrecognised move notation: {0}")]
    InvalidMove(String),

    #[error("Illegal move {intent} in position {fen}")]
    IllegalMove { intent: String, fen: String },

    #[error("Nothing to undo")]
    EmptyHistory,
}
