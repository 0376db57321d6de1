//! Parsing of `info` lines.

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance, from the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = engine mates, negative = engine is mated).
    Mate(i32),
}

/// Set when the score is only a bound from an aspiration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    Lower,
    Upper,
}

/// Search information from engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// 1-based line index when MultiPV > 1.
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub bound: Option<Bound>,
    pub nodes: Option<u64>,
    pub time: Option<u64>,
    /// Principal variation, UCI moves.
    pub pv: Vec<String>,
    pub string: Option<String>,
}

impl EngineInfo {
    /// Parses a UCI `info` line; `None` if the line is not an info line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().peekable();
        if parts.next() != Some("info") {
            return None;
        }

        let mut info = EngineInfo::default();
        while let Some(token) = parts.next() {
            match token {
                "depth" => info.depth = parts.next().and_then(|v| v.parse().ok()),
                "seldepth" => info.seldepth = parts.next().and_then(|v| v.parse().ok()),
                "multipv" => info.multipv = parts.next().and_then(|v| v.parse().ok()),
                "nodes" => info.nodes = parts.next().and_then(|v| v.parse().ok()),
                "time" => info.time = parts.next().and_then(|v| v.parse().ok()),
                "score" => {
                    let kind = parts.next();
                    let value = parts.next().and_then(|v| v.parse::<i32>().ok());
                    info.score = match (kind, value) {
                        (Some("cp"), Some(cp)) => Some(Score::Cp(cp)),
                        (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                        _ => None,
                    };
                    match parts.peek() {
                        Some(&"lowerbound") => {
                            info.bound = Some(Bound::Lower);
                            parts.next();
                        }
                        Some(&"upperbound") => {
                            info.bound = Some(Bound::Upper);
                            parts.next();
                        }
                        _ => {}
                    }
                }
                "pv" => {
                    while let Some(mv) = parts.next_if(|t| !is_info_keyword(t)) {
                        info.pv.push(mv.to_string());
                    }
                }
                "string" => {
                    info.string = Some(parts.by_ref().collect::<Vec<_>>().join(" "));
                }
                _ => {}
            }
        }

        Some(info)
    }

    /// True for a final (non-bound) scored line.
    pub fn is_exact(&self) -> bool {
        self.score.is_some() && self.bound.is_none()
    }
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "pv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "tbhits"
            | "string"
    )
}
