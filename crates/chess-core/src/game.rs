//! Live game: a stack of position snapshots plus the moves between them.

use crate::error::ChessError;
use crate::position::{PlayedMove, Position};

#[derive(Debug, Clone)]
pub struct Game {
    positions: Vec<Position>,
    moves: Vec<PlayedMove>,
}

impl Game {
    pub fn new() -> Self {
        Self::from_position(Position::starting())
    }

    pub fn from_position(start: Position) -> Self {
        Self {
            positions: vec![start],
            moves: Vec::new(),
        }
    }

    pub fn current(&self) -> &Position {
        // positions always holds at least the starting snapshot
        &self.positions[self.positions.len() - 1]
    }

    pub fn moves(&self) -> &[PlayedMove] {
        &self.moves
    }

    /// Apply a move intent if it is legal; the game is unchanged otherwise.
    pub fn play(&mut self, intent: &str) -> Result<&PlayedMove, ChessError> {
        let (next, played) = self.current().apply(intent)?;
        self.positions.push(next);
        self.moves.push(played);
        Ok(&self.moves[self.moves.len() - 1])
    }

    pub fn undo(&mut self) -> Result<PlayedMove, ChessError> {
        if self.moves.is_empty() {
            return Err(ChessError::EmptyHistory);
        }
        self.positions.pop();
        self.moves.pop().ok_or(ChessError::EmptyHistory)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn load_fen(&mut self, fen: &str) -> Result<(), ChessError> {
        *self = Self::from_position(Position::from_fen(fen)?);
        Ok(())
    }

    /// Moves in SAN with move numbers, e.g. `1. e4 e5 2. Nf3`.
    pub fn move_text(&self) -> String {
        let start_black = self.positions[0].side_to_move() == shakmaty::Color::Black;
        let start_number = self.positions[0]
            .fen()
            .split_whitespace()
            .nth(5)
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(1);

        let mut out = String::new();
        for (i, mv) in self.moves.iter().enumerate() {
            let ply = i + usize::from(start_black);
            if ply % 2 == 0 {
                out.push_str(&format!("{}. ", start_number + ply / 2));
            } else if i == 0 {
                out.push_str(&format!("{}... ", start_number + ply / 2));
            }
            out.push_str(&mv.san);
            out.push(' ');
        }
        out.trim_end().to_string()
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_and_undo() {
        let mut game = Game::new();
        game.play("e4").unwrap();
        game.play("e7e5").unwrap();
        game.play("Nf3").unwrap();
        assert_eq!(game.move_text(), "1. e4 e5 2. Nf3");

        let undone = game.undo().unwrap();
        assert_eq!(undone.san, "Nf3");
        assert_eq!(game.moves().len(), 2);
    }

    #[test]
    fn test_illegal_move_leaves_game_unchanged() {
        let mut game = Game::new();
        let before = game.current().clone();
        assert!(game.play("e5").is_err());
        assert_eq!(game.current(), &before);
        assert!(game.moves().is_empty());
    }

    #[test]
    fn test_undo_on_empty_history() {
        let mut game = Game::new();
        assert_eq!(game.undo(), Err(ChessError::EmptyHistory));
    }

    #[test]
    fn test_move_text_from_black_start() {
        let mut game = Game::new();
        game.load_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
            .unwrap();
        game.play("c5").unwrap();
        game.play("Nf3").unwrap();
        assert_eq!(game.move_text(), "1... c5 2. Nf3");
    }
}
