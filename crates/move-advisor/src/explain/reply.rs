//! Matching free-text model replies back to candidate moves.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Bullets, numbered-list markers and markdown emphasis ahead of the move.
static LEADING_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•>]+\s*|\d+[.)]\s+|[*_`#]+)+").unwrap());

/// `12.` or `12...` move numbers.
static MOVE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.(?:\.\.)?\s*").unwrap());

/// `<move> [(note)] <delimiter> <text>` where the delimiter is `:` or a
/// spaced dash.
static ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<mv>(?:[A-Za-z]|0-0)[A-Za-z0-9=+#!?\-]*)[*_`]*\s*(?:\([^)]*\))?\s*(?::|\s[-–—]\s)\s*(?P<text>.+)$",
    )
    .unwrap()
});

/// Strip check, mate and annotation suffixes (`Nf3+`, `e4!?`, `Qxf7#`) and
/// spell castling with letters (`0-0` is `O-O`).
fn bare(notation: &str) -> Cow<'_, str> {
    let trimmed = notation.trim_end_matches(['+', '#', '!', '?']);
    match trimmed {
        "0-0" | "0-0-0" => Cow::Owned(trimmed.replace('0', "O")),
        _ => Cow::Borrowed(trimmed),
    }
}

/// A move the reply is expected to talk about.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub san: &'a str,
    pub uci: &'a str,
}

/// Explanation text per candidate SAN. Lines naming a move that is not a
/// candidate are ignored; the first line for a candidate wins.
pub fn match_explanations(reply: &str, candidates: &[Candidate<'_>]) -> HashMap<String, String> {
    let mut found: HashMap<String, String> = HashMap::new();

    for raw in reply.lines() {
        let line = LEADING_NOISE.replace(raw.trim(), "");
        let line = MOVE_NUMBER.replace(&line, "");
        let Some(caps) = ENTRY.captures(&line) else {
            continue;
        };
        let named = bare(&caps["mv"]);
        let Some(candidate) = candidates
            .iter()
            .find(|c| bare(c.san) == named || c.uci == &*named)
        else {
            continue;
        };

        let text = caps["text"].trim().trim_matches(['*', '_']).trim();
        if text.is_empty() {
            continue;
        }
        found
            .entry(candidate.san.to_string())
            .or_insert_with(|| text.to_string());
    }

    found
}
