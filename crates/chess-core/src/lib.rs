//! Rules-engine adapter: immutable position snapshots and move application
//! on top of `shakmaty`.

pub mod error;
pub mod fen;
pub mod game;
pub mod position;

pub use error::ChessError;
pub use game::Game;
pub use position::{PlayedMove, Position};
pub use shakmaty::Color;
