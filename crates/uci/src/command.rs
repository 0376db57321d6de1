//! Commands sent from GUI to engine.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    /// `fen: None` means `startpos`.
    Position { fen: Option<String>, moves: Vec<String> },
    Go(GoOptions),
    Stop,
    Quit,
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
    /// Search to this depth.
    pub depth: Option<u32>,
    /// Restrict the search to these moves.
    pub searchmoves: Vec<String>,
}

impl GoOptions {
    pub fn depth(depth: u32) -> Self {
        GoOptions {
            depth: Some(depth),
            ..Default::default()
        }
    }

    pub fn movetime(ms: u64) -> Self {
        GoOptions {
            movetime: Some(ms),
            ..Default::default()
        }
    }
}

impl GuiCommand {
    pub fn set_option(name: &str, value: impl fmt::Display) -> Self {
        GuiCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn position_fen(fen: &str) -> Self {
        GuiCommand::Position {
            fen: Some(fen.to_string()),
            moves: Vec::new(),
        }
    }

    /// Formats the command as a single protocol line, without the newline.
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(fen) => format!("position fen {}", fen),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(opts) => {
                let mut line = "go".to_string();
                if let Some(depth) = opts.depth {
                    line.push_str(&format!(" depth {}", depth));
                }
                if let Some(ms) = opts.movetime {
                    line.push_str(&format!(" movetime {}", ms));
                }
                if !opts.searchmoves.is_empty() {
                    line.push_str(" searchmoves ");
                    line.push_str(&opts.searchmoves.join(" "));
                }
                line
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
        }
    }
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}
