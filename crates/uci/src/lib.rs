//! UCI (Universal Chess Interface) protocol, from the controlling side.
//!
//! Commands we send:
//!
//! - `uci` / `isready` / `ucinewgame`
//! - `setoption name <id> value <x>` (Threads, Hash, MultiPV, Skill Level)
//! - `position fen <fen> [moves <move>...]`
//! - `go [depth <d>] [movetime <ms>]`
//! - `stop` / `quit`
//!
//! Replies we parse: `id`, `uciok`, `readyok`, `info ...` and
//! `bestmove <move> [ponder <move>]`.

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{Bound, EngineInfo, Score};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    Id { name: Option<String>, author: Option<String> },
    UciOk,
    ReadyOk,
    Info(EngineInfo),
    /// `mv` is `None` when the engine answers `bestmove (none)` or `0000`,
    /// which it does for checkmated and stalemated positions.
    BestMove { mv: Option<String>, ponder: Option<String> },
    /// Lines we do not act on (`option ...`, copyright banners).
    Other(String),
}

impl EngineMessage {
    /// Parses one line of engine output.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("uciok") => EngineMessage::UciOk,
            Some("readyok") => EngineMessage::ReadyOk,
            Some("info") => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Other(line.to_string()),
            },
            Some("bestmove") => {
                let mv = parts
                    .next()
                    .filter(|m| *m != "(none)" && *m != "0000")
                    .map(str::to_string);
                let ponder = match (parts.next(), parts.next()) {
                    (Some("ponder"), Some(p)) => Some(p.to_string()),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            Some("id") => {
                let rest: Vec<&str> = parts.collect();
                match rest.split_first() {
                    Some((&"name", value)) => EngineMessage::Id {
                        name: Some(value.join(" ")),
                        author: None,
                    },
                    Some((&"author", value)) => EngineMessage::Id {
                        name: None,
                        author: Some(value.join(" ")),
                    },
                    _ => EngineMessage::Other(line.to_string()),
                }
            }
            _ => EngineMessage::Other(line.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handshake() {
        assert_eq!(EngineMessage::parse("uciok"), EngineMessage::UciOk);
        assert_eq!(EngineMessage::parse("readyok\n"), EngineMessage::ReadyOk);
        assert_eq!(
            EngineMessage::parse("id name Stockfish 16.1"),
            EngineMessage::Id {
                name: Some("Stockfish 16.1".to_string()),
                author: None
            }
        );
    }

    #[test]
    fn parse_bestmove() {
        assert_eq!(
            EngineMessage::parse("bestmove e2e4 ponder e7e5"),
            EngineMessage::BestMove {
                mv: Some("e2e4".to_string()),
                ponder: Some("e7e5".to_string())
            }
        );
        assert_eq!(
            EngineMessage::parse("bestmove g1f3"),
            EngineMessage::BestMove {
                mv: Some("g1f3".to_string()),
                ponder: None
            }
        );
    }

    #[test]
    fn parse_bestmove_none() {
        assert_eq!(
            EngineMessage::parse("bestmove (none)"),
            EngineMessage::BestMove { mv: None, ponder: None }
        );
        assert_eq!(
            EngineMessage::parse("bestmove 0000"),
            EngineMessage::BestMove { mv: None, ponder: None }
        );
    }

    #[test]
    fn parse_info_and_other() {
        match EngineMessage::parse("info depth 3 score cp 12 pv e2e4") {
            EngineMessage::Info(info) => assert_eq!(info.depth, Some(3)),
            other => panic!("expected info, got {:?}", other),
        }
        assert!(matches!(
            EngineMessage::parse("option name Hash type spin default 16 min 1 max 33554432"),
            EngineMessage::Other(_)
        ));
    }
}
