//! Engine score → display value and win probability.

use std::fmt;
use std::str::FromStr;

use chess_core::Color;

/// Sort key base for mate scores; any mate outranks any centipawn score.
const MATE_SCORE: i64 = 100_000;

/// Raw score as reported on a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScore {
    Centipawns(i32),
    /// Mate in N moves; positive = the reporting side mates
    Mate(i32),
}

impl EngineScore {
    /// Flip perspective. Saturates at the `i32` bounds.
    pub fn negate(self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(cp.saturating_neg()),
            Self::Mate(m) => Self::Mate(m.saturating_neg()),
        }
    }
}

/// Which side the engine's scores are reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorePerspective {
    /// Always from White's point of view
    White,
    /// From the point of view of the side to move (plain UCI behaviour)
    SideToMove,
}

impl ScorePerspective {
    pub fn reporting_side(self, side_to_move: Color) -> Color {
        match self {
            Self::White => Color::White,
            Self::SideToMove => side_to_move,
        }
    }
}

impl FromStr for ScorePerspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" => Ok(Self::White),
            "side_to_move" | "side-to-move" | "stm" => Ok(Self::SideToMove),
            other => Err(format!("unknown score perspective '{other}'")),
        }
    }
}

/// A score converted to the side to move.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEval {
    /// Score from the side to move's point of view
    pub relative: EngineScore,
    /// `+0.35`, `-1.20`, `M3`, `M-2`
    pub text: String,
    /// Winning chances for the side to move, 0..=100
    pub win_probability: f64,
    /// Higher is better for the side to move
    pub sort_key: i64,
}

impl fmt::Display for DisplayEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Convert an engine score reported for `reported_from` into the side to
/// move's perspective.
pub fn convert(score: EngineScore, reported_from: Color, side_to_move: Color) -> DisplayEval {
    let relative = if reported_from == side_to_move {
        score
    } else {
        score.negate()
    };
    DisplayEval {
        relative,
        text: display_text(relative),
        win_probability: win_probability(relative),
        sort_key: sort_key(relative),
    }
}

pub fn display_text(score: EngineScore) -> String {
    match score {
        EngineScore::Centipawns(cp) => format!("{:+.2}", f64::from(cp) / 100.0),
        EngineScore::Mate(m) => format!("M{m}"),
    }
}

/// Logistic win-probability model (percent).
pub fn win_probability(score: EngineScore) -> f64 {
    match score {
        EngineScore::Centipawns(cp) => {
            50.0 + 50.0 * (2.0 / (1.0 + (-0.003_682_08 * f64::from(cp)).exp()) - 1.0)
        }
        EngineScore::Mate(m) if m > 0 => 100.0,
        EngineScore::Mate(_) => 0.0,
    }
}

/// Orders scores for the side to move: quicker mates first, then centipawns,
/// then being mated (longer defence ranks higher).
pub fn sort_key(score: EngineScore) -> i64 {
    match score {
        EngineScore::Centipawns(cp) => i64::from(cp),
        EngineScore::Mate(m) if m > 0 => MATE_SCORE - i64::from(m),
        EngineScore::Mate(m) => -MATE_SCORE - i64::from(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_to_move_keeps_sign() {
        let eval = convert(EngineScore::Centipawns(20), Color::White, Color::White);
        assert_eq!(eval.text, "+0.20");
        assert_eq!(eval.relative, EngineScore::Centipawns(20));
    }

    #[test]
    fn test_black_to_move_flips_white_perspective() {
        let eval = convert(EngineScore::Centipawns(-35), Color::White, Color::Black);
        assert_eq!(eval.text, "+0.35");
        assert_eq!(eval.relative, EngineScore::Centipawns(35));
    }

    #[test]
    fn test_side_to_move_perspective_is_not_flipped() {
        let side = ScorePerspective::SideToMove.reporting_side(Color::Black);
        let eval = convert(EngineScore::Centipawns(-35), side, Color::Black);
        assert_eq!(eval.text, "-0.35");
    }

    #[test]
    fn test_extreme_scores_flip_without_overflow() {
        let eval = convert(EngineScore::Centipawns(i32::MIN), Color::White, Color::Black);
        assert_eq!(eval.relative, EngineScore::Centipawns(i32::MAX));
        assert!(eval.text.starts_with('+'));
        assert_eq!(EngineScore::Mate(i32::MIN).negate(), EngineScore::Mate(i32::MAX));
    }

    #[test]
    fn test_mate_display() {
        assert_eq!(display_text(EngineScore::Mate(3)), "M3");
        assert_eq!(display_text(EngineScore::Mate(-2)), "M-2");
        let eval = convert(EngineScore::Mate(-4), Color::White, Color::Black);
        assert_eq!(eval.text, "M4");
    }

    #[test]
    fn test_centipawn_formatting() {
        assert_eq!(display_text(EngineScore::Centipawns(0)), "+0.00");
        assert_eq!(display_text(EngineScore::Centipawns(-150)), "-1.50");
        assert_eq!(display_text(EngineScore::Centipawns(1234)), "+12.34");
    }

    #[test]
    fn test_sort_key_ordering() {
        let mate_in_1 = sort_key(EngineScore::Mate(1));
        let mate_in_3 = sort_key(EngineScore::Mate(3));
        let big_cp = sort_key(EngineScore::Centipawns(5000));
        let lost_cp = sort_key(EngineScore::Centipawns(-5000));
        let mated_in_5 = sort_key(EngineScore::Mate(-5));
        let mated_in_2 = sort_key(EngineScore::Mate(-2));

        assert!(mate_in_1 > mate_in_3);
        assert!(mate_in_3 > big_cp);
        assert!(big_cp > lost_cp);
        assert!(lost_cp > mated_in_5);
        assert!(mated_in_5 > mated_in_2);
    }

    #[test]
    fn test_win_probability() {
        assert!((win_probability(EngineScore::Centipawns(0)) - 50.0).abs() < 1e-9);
        assert!(win_probability(EngineScore::Centipawns(300)) > 70.0);
        assert!(win_probability(EngineScore::Centipawns(-300)) < 30.0);
        assert_eq!(win_probability(EngineScore::Mate(2)), 100.0);
        assert_eq!(win_probability(EngineScore::Mate(-2)), 0.0);
    }

    #[test]
    fn test_perspective_from_str() {
        assert_eq!("white".parse::<ScorePerspective>(), Ok(ScorePerspective::White));
        assert_eq!(
            "side_to_move".parse::<ScorePerspective>(),
            Ok(ScorePerspective::SideToMove)
        );
        assert!("black".parse::<ScorePerspective>().is_err());
    }
}
