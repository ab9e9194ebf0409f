use std::fmt::Write;

use chess_core::Color;

use crate::aggregator::RankedLine;

const SYSTEM_PROMPT: &str = "You are a chess coach. For each candidate move you are given, \
explain in one or two sentences the idea behind it. Answer with one line per move, in the form \
`<move>: <explanation>`, using the move exactly as written in the request.";

/// Continuation moves shown alongside each candidate.
const PV_PREVIEW: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// SAN of every move the prompt asks about, in order
    pub moves: Vec<String>,
}

/// One prompt covering every candidate in `lines`.
pub fn build(fen: &str, side_to_move: Color, lines: &[&RankedLine]) -> Prompt {
    let side = match side_to_move {
        Color::White => "White",
        Color::Black => "Black",
    };

    let mut user = format!("Position (FEN): {fen}\n{side} to move.\n\nCandidate moves:\n");
    for ranked in lines {
        let pv: Vec<&str> = ranked
            .line
            .pv
            .iter()
            .take(PV_PREVIEW)
            .map(String::as_str)
            .collect();
        let _ = writeln!(
            user,
            "- {} (evaluation {}, line {})",
            ranked.line.san,
            ranked.eval.text,
            pv.join(" ")
        );
    }

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        moves: lines.iter().map(|l| l.line.san.clone()).collect(),
    }
}
