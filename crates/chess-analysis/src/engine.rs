//! UCI engine boundary: the search request/response types, the trait the
//! rest of the crate talks to, and a process-backed implementation.

use crate::Evaluation;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use uci::{EngineMessage, GoOptions, GuiCommand};

/// Maximum number of lines to read before giving up on a UCI response.
pub const MAX_UCI_LINES: usize = 20_000;

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    Spawn(std::io::Error),
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),
    #[error("Engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Engine closed its output")]
    Closed,
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

/// How long the engine may think.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Depth(u32),
    MoveTime(Duration),
}

/// One search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub fen: String,
    pub limit: SearchLimit,
    /// Number of principal variations to report (MultiPV).
    pub multipv: u32,
    /// UCI "Skill Level" (0-20); `None` searches at full strength.
    pub skill_level: Option<u8>,
}

impl SearchRequest {
    pub fn new(fen: impl Into<String>, limit: SearchLimit) -> Self {
        SearchRequest {
            fen: fen.into(),
            limit,
            multipv: 1,
            skill_level: None,
        }
    }

    pub fn with_multipv(mut self, lines: u32) -> Self {
        self.multipv = lines.max(1);
        self
    }

    pub fn with_skill(mut self, level: u8) -> Self {
        self.skill_level = Some(level.min(20));
        self
    }
}

/// One principal variation, scored from the side to move.
#[derive(Debug, Clone, PartialEq)]
pub struct PvLine {
    /// 1-based rank among the reported lines.
    pub multipv: u32,
    pub depth: u32,
    pub score: Evaluation,
    pub moves: Vec<String>,
}

/// What a search produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// `None` when the engine has no move (mate or stalemate on the board).
    pub best_move: Option<String>,
    /// Final line for each MultiPV index, best first.
    pub lines: Vec<PvLine>,
}

impl SearchOutcome {
    pub fn best_line(&self) -> Option<&PvLine> {
        self.lines.first()
    }
}

/// A chess engine that can be searched synchronously.
pub trait UciEngine: Send {
    fn name(&self) -> &str;

    fn search(&mut self, request: &SearchRequest) -> Result<SearchOutcome, EngineError>;
}

/// Creates fresh engines, for the pool's initial fill and for respawns.
pub trait EngineFactory: Send + Sync {
    fn spawn(&self) -> Result<Box<dyn UciEngine>, EngineError>;
}

/// Folds engine output into a [`SearchOutcome`].
#[derive(Debug, Default)]
pub struct SearchCollector {
    lines: BTreeMap<u32, PvLine>,
}

impl SearchCollector {
    /// Feeds one message; returns the outcome once `bestmove` arrives.
    pub fn feed(&mut self, message: EngineMessage) -> Option<SearchOutcome> {
        match message {
            EngineMessage::Info(info) if info.is_exact() => {
                if let Some(score) = info.score {
                    let index = info.multipv.unwrap_or(1);
                    self.lines.insert(
                        index,
                        PvLine {
                            multipv: index,
                            depth: info.depth.unwrap_or(0),
                            score: score.into(),
                            moves: info.pv,
                        },
                    );
                }
                None
            }
            EngineMessage::BestMove { mv, .. } => Some(SearchOutcome {
                best_move: mv,
                lines: std::mem::take(&mut self.lines).into_values().collect(),
            }),
            _ => None,
        }
    }
}

/// Process settings for a Stockfish-compatible engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub path: String,
    pub threads: u32,
    pub hash_mb: u32,
    /// Upper bound on any single exchange with the engine. Move-time searches
    /// get their budget added on top.
    pub call_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: "stockfish".to_string(),
            threads: 1,
            hash_mb: 64,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// A long-lived engine child process.
///
/// Output is read on a dedicated thread and handed over a channel, so every
/// wait can be bounded by a timeout even if the engine stops responding.
pub struct EngineProcess {
    process: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    name: String,
    call_timeout: Duration,
    multipv: u32,
    skill_level: Option<u8>,
}

impl EngineProcess {
    /// Spawns the engine and completes the `uci` / `isready` handshake.
    pub fn spawn(settings: &EngineSettings) -> Result<Self, EngineError> {
        let path = std::path::Path::new(&settings.path);
        if settings.path.contains(std::path::MAIN_SEPARATOR) && !path.exists() {
            return Err(EngineError::NotFound(settings.path.clone()));
        }

        let mut process = Command::new(&settings.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::NotFound(settings.path.clone()),
                _ => EngineError::Spawn(e),
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::InitFailed("no stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::InitFailed("no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(EngineError::Spawn)?;

        let mut engine = Self {
            process,
            stdin,
            lines: rx,
            name: String::new(),
            call_timeout: settings.call_timeout,
            multipv: 1,
            skill_level: None,
        };
        engine.handshake(settings)?;
        Ok(engine)
    }

    fn handshake(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci)?;
        let deadline = Instant::now() + self.call_timeout;
        let mut name = None;
        for _ in 0..MAX_UCI_LINES {
            match self.next_message(deadline)? {
                EngineMessage::Id { name: Some(n), .. } => name = Some(n),
                EngineMessage::UciOk => {
                    self.name = name.unwrap_or_else(|| "Unknown Engine".to_string());
                    self.send(&GuiCommand::set_option("Threads", settings.threads))?;
                    self.send(&GuiCommand::set_option("Hash", settings.hash_mb))?;
                    self.sync()?;
                    debug!(engine = %self.name, "engine ready");
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(EngineError::InitFailed("no uciok".to_string()))
    }

    /// Sends `isready` and waits for `readyok`.
    fn sync(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::IsReady)?;
        let deadline = Instant::now() + self.call_timeout;
        for _ in 0..MAX_UCI_LINES {
            if self.next_message(deadline)? == EngineMessage::ReadyOk {
                return Ok(());
            }
        }
        Err(EngineError::InvalidResponse("no readyok".to_string()))
    }

    fn configure(&mut self, request: &SearchRequest) -> Result<(), EngineError> {
        let mut changed = false;
        if request.multipv != self.multipv {
            self.send(&GuiCommand::set_option("MultiPV", request.multipv))?;
            self.multipv = request.multipv;
            changed = true;
        }
        if request.skill_level != self.skill_level {
            self.send(&GuiCommand::set_option(
                "Skill Level",
                request.skill_level.unwrap_or(20),
            ))?;
            self.skill_level = request.skill_level;
            changed = true;
        }
        if changed {
            self.sync()?;
        }
        Ok(())
    }

    fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        writeln!(self.stdin, "{}", command.to_uci())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn next_message(&mut self, deadline: Instant) -> Result<EngineMessage, EngineError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(remaining) {
            Ok(line) => Ok(EngineMessage::parse(&line)),
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout(self.call_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Closed),
        }
    }
}

impl UciEngine for EngineProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchOutcome, EngineError> {
        self.configure(request)?;
        self.send(&GuiCommand::position_fen(&request.fen))?;

        let (go, budget) = match request.limit {
            SearchLimit::Depth(depth) => (GoOptions::depth(depth), self.call_timeout),
            SearchLimit::MoveTime(time) => (
                GoOptions::movetime(time.as_millis() as u64),
                self.call_timeout + time,
            ),
        };
        self.send(&GuiCommand::Go(go))?;

        let deadline = Instant::now() + budget;
        let mut collector = SearchCollector::default();
        for _ in 0..MAX_UCI_LINES {
            match self.next_message(deadline) {
                Ok(message) => {
                    if let Some(outcome) = collector.feed(message) {
                        return Ok(outcome);
                    }
                }
                Err(EngineError::Timeout(_)) => {
                    warn!(engine = %self.name, ?budget, "search timed out, sending stop");
                    let _ = self.send(&GuiCommand::Stop);
                    return Err(EngineError::Timeout(budget));
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::InvalidResponse(
            "Too many lines without bestmove".to_string(),
        ))
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.send(&GuiCommand::Quit);
        if !matches!(self.process.try_wait(), Ok(Some(_))) {
            let _ = self.process.kill();
        }
        let _ = self.process.wait();
    }
}

/// Spawns [`EngineProcess`]es with fixed settings.
#[derive(Debug, Clone)]
pub struct ProcessFactory {
    settings: EngineSettings,
}

impl ProcessFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl EngineFactory for ProcessFactory {
    fn spawn(&self) -> Result<Box<dyn UciEngine>, EngineError> {
        Ok(Box::new(EngineProcess::spawn(&self.settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> Option<SearchOutcome> {
        let mut collector = SearchCollector::default();
        lines
            .iter()
            .find_map(|line| collector.feed(EngineMessage::parse(line)))
    }

    #[test]
    fn test_engine_not_found() {
        let settings = EngineSettings {
            path: "/nonexistent/path/to/stockfish".to_string(),
            ..Default::default()
        };
        match EngineProcess::spawn(&settings) {
            Err(EngineError::NotFound(path)) => assert_eq!(path, "/nonexistent/path/to/stockfish"),
            Err(other) => panic!("Expected NotFound error, got {other}"),
            Ok(_) => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_collector_keeps_last_line_per_index() {
        let outcome = feed_all(&[
            "info depth 1 score cp 10 pv e2e4",
            "info depth 2 score cp 25 lowerbound pv d2d4",
            "info depth 2 score cp 18 pv d2d4 d7d5",
            "bestmove d2d4 ponder d7d5",
        ])
        .unwrap();
        assert_eq!(outcome.best_move.as_deref(), Some("d2d4"));
        assert_eq!(outcome.lines.len(), 1);
        let line = outcome.best_line().unwrap();
        assert_eq!(line.depth, 2);
        assert_eq!(line.score, Evaluation::Centipawns(18));
        assert_eq!(line.moves, vec!["d2d4", "d7d5"]);
    }

    #[test]
    fn test_collector_orders_multipv() {
        let outcome = feed_all(&[
            "info depth 8 multipv 2 score cp 5 pv g1f3",
            "info depth 8 multipv 1 score cp 30 pv e2e4",
            "info depth 8 multipv 3 score mate -4 pv f2f3",
            "bestmove e2e4",
        ])
        .unwrap();
        let order: Vec<u32> = outcome.lines.iter().map(|l| l.multipv).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(outcome.lines[2].score, Evaluation::Mate(-4));
    }

    #[test]
    fn test_collector_no_move() {
        let outcome = feed_all(&["info depth 0 score mate 0", "bestmove (none)"]).unwrap();
        assert_eq!(outcome.best_move, None);
        assert_eq!(outcome.best_line().unwrap().score.to_centipawns(), -crate::MATE_SCORE);
    }

    #[test]
    fn test_collector_waits_for_bestmove() {
        assert!(feed_all(&["info depth 5 score cp 1 pv a2a3", "readyok"]).is_none());
    }

    #[test]
    fn test_request_builders() {
        let request = SearchRequest::new("fen", SearchLimit::Depth(10))
            .with_multipv(0)
            .with_skill(30);
        assert_eq!(request.multipv, 1);
        assert_eq!(request.skill_level, Some(20));
    }
}
