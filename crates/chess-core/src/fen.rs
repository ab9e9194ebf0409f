//! FEN field helpers.

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// The piece-placement field of a FEN (everything before the first space).
pub fn board_field(fen: &str) -> &str {
    fen.split_whitespace().next().unwrap_or("")
}
