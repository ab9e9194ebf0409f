//! UCI command formatting and output-line parsing.

use crate::error::AnalysisError;
use crate::eval::EngineScore;

pub const UCI: &str = "uci";
pub const UCI_OK: &str = "uciok";
pub const IS_READY: &str = "isready";
pub const READY_OK: &str = "readyok";
pub const STOP: &str = "stop";
pub const QUIT: &str = "quit";

pub fn set_option(name: &str, value: impl std::fmt::Display) -> String {
    format!("setoption name {name} value {value}")
}

pub fn position_fen(fen: &str) -> String {
    format!("position fen {fen}")
}

pub fn go_depth(depth: u32) -> String {
    format!("go depth {depth}")
}

/// One multi-PV progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub depth: u32,
    /// 1-based rank; engines omit it when MultiPV is 1
    pub multipv: u32,
    pub score: EngineScore,
    pub pv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    Progress(ProgressLine),
    /// Search finished; `best` is `None` for `bestmove (none)`
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    /// Anything else (`info string`, `currmove` updates, `id`, ...)
    Other,
}

/// Whether a raw line is worth forwarding to the aggregator at all.
pub fn is_search_output(line: &str) -> bool {
    line.starts_with("info ") || line.starts_with("bestmove")
}

pub fn parse_line(line: &str) -> Result<EngineLine, AnalysisError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first() {
        Some(&"info") => parse_info(&tokens),
        Some(&"bestmove") => Ok(parse_bestmove(&tokens)),
        _ => Ok(EngineLine::Other),
    }
}

fn parse_info(tokens: &[&str]) -> Result<EngineLine, AnalysisError> {
    if tokens.get(1) == Some(&"string") {
        return Ok(EngineLine::Other);
    }
    let Some(pv_idx) = tokens.iter().position(|t| *t == "pv") else {
        // currmove / hashfull / nps-only updates
        return Ok(EngineLine::Other);
    };

    let depth = required_u32(tokens, "depth")?;
    let multipv = match value_after(tokens, "multipv") {
        Some(raw) => parse_u32(raw, "multipv")?,
        None => 1,
    };
    let score = parse_score(tokens)?;

    let pv: Vec<String> = tokens[pv_idx + 1..]
        .iter()
        .take_while(|t| !matches!(**t, "bmc" | "string"))
        .map(|t| t.to_string())
        .collect();
    if pv.is_empty() {
        return Err(AnalysisError::ProtocolParse("empty principal variation".into()));
    }

    Ok(EngineLine::Progress(ProgressLine {
        depth,
        multipv,
        score,
        pv,
    }))
}

fn parse_score(tokens: &[&str]) -> Result<EngineScore, AnalysisError> {
    let idx = tokens
        .iter()
        .position(|t| *t == "score")
        .ok_or_else(|| AnalysisError::ProtocolParse("missing score".into()))?;
    let kind = tokens.get(idx + 1).copied();
    let raw = tokens
        .get(idx + 2)
        .ok_or_else(|| AnalysisError::ProtocolParse("missing score value".into()))?;
    let value: i32 = raw
        .parse()
        .map_err(|_| AnalysisError::ProtocolParse(format!("bad score value '{raw}'")))?;
    match kind {
        Some("cp") => Ok(EngineScore::Centipawns(value)),
        Some("mate") => Ok(EngineScore::Mate(value)),
        other => Err(AnalysisError::ProtocolParse(format!(
            "unknown score kind {other:?}"
        ))),
    }
}

fn parse_bestmove(tokens: &[&str]) -> EngineLine {
    let best = tokens
        .get(1)
        .filter(|m| **m != "(none)" && **m != "0000")
        .map(|m| m.to_string());
    let ponder = value_after(tokens, "ponder").map(String::from);
    EngineLine::BestMove { best, ponder }
}

fn value_after<'a>(tokens: &[&'a str], key: &str) -> Option<&'a str> {
    let idx = tokens.iter().position(|t| *t == key)?;
    tokens.get(idx + 1).copied()
}

fn required_u32(tokens: &[&str], key: &str) -> Result<u32, AnalysisError> {
    let raw = value_after(tokens, key)
        .ok_or_else(|| AnalysisError::ProtocolParse(format!("missing {key}")))?;
    parse_u32(raw, key)
}

fn parse_u32(raw: &str, key: &str) -> Result<u32, AnalysisError> {
    raw.parse()
        .map_err(|_| AnalysisError::ProtocolParse(format!("bad {key} '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(line: &str) -> ProgressLine {
        match parse_line(line).unwrap() {
            EngineLine::Progress(p) => p,
            other => panic!("expected progress line, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_cp() {
        let p = progress(
            "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 nps 1200000 pv e2e4 e7e5",
        );
        assert_eq!(p.depth, 20);
        assert_eq!(p.multipv, 1);
        assert_eq!(p.score, EngineScore::Centipawns(35));
        assert_eq!(p.pv, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn test_parse_mate() {
        let p = progress("info depth 20 multipv 2 score mate -3 nodes 100000 pv g1f3");
        assert_eq!(p.multipv, 2);
        assert_eq!(p.score, EngineScore::Mate(-3));
    }

    #[test]
    fn test_missing_multipv_defaults_to_first_rank() {
        let p = progress("info depth 12 score cp 20 pv e2e4");
        assert_eq!(p.multipv, 1);
    }

    #[test]
    fn test_bound_scores_are_accepted() {
        let p = progress("info depth 18 multipv 1 score cp 41 lowerbound nodes 5 pv d2d4");
        assert_eq!(p.score, EngineScore::Centipawns(41));
    }

    #[test]
    fn test_parse_pv_stops_at_trailing_keyword() {
        let p = progress("info depth 20 score cp 35 pv e2e4 e7e5 g1f3 bmc 0.5");
        assert_eq!(p.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_malformed_progress_lines_are_errors() {
        for line in [
            "info multipv 1 score cp 20 pv e2e4",
            "info depth x multipv 1 score cp 20 pv e2e4",
            "info depth 10 multipv 1 pv e2e4",
            "info depth 10 multipv 1 score wdl 20 pv e2e4",
            "info depth 10 multipv 1 score cp abc pv e2e4",
            "info depth 10 multipv 1 score cp 10 pv",
        ] {
            assert!(
                matches!(parse_line(line), Err(AnalysisError::ProtocolParse(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn test_non_progress_lines() {
        assert_eq!(
            parse_line("info depth 5 currmove e2e4 currmovenumber 1").unwrap(),
            EngineLine::Other
        );
        assert_eq!(
            parse_line("info string NNUE evaluation using nn.nnue pv").unwrap(),
            EngineLine::Other
        );
        assert_eq!(parse_line("readyok").unwrap(), EngineLine::Other);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5").unwrap(),
            EngineLine::BestMove {
                best: Some("e2e4".into()),
                ponder: Some("e7e5".into())
            }
        );
        assert_eq!(
            parse_line("bestmove (none)").unwrap(),
            EngineLine::BestMove {
                best: None,
                ponder: None
            }
        );
    }

    #[test]
    fn test_command_formatting() {
        assert_eq!(set_option("MultiPV", 4), "setoption name MultiPV value 4");
        assert_eq!(position_fen("8/8/8/8/8/8/8/8 w - - 0 1"), "position fen 8/8/8/8/8/8/8/8 w - - 0 1");
        assert_eq!(go_depth(18), "go depth 18");
    }
}
