//! Command line and replay scripts.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::parse_key_name;
use crate::error::{Error, Result};

/// shellmux - a line-editing shell inside tmux-style panes
#[derive(Debug, Parser)]
#[command(name = "shellmux")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: $SHELLMUX_CONFIG, ~/.shellmux.conf, then the
    /// platform config directory)
    #[arg(short = 'f', long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the persisted command history
    #[arg(long, value_name = "DIR", global = true)]
    pub history_dir: Option<PathBuf>,

    /// Keep command history in memory only
    #[arg(long, global = true)]
    pub no_history: bool,

    /// Terminal size as COLSxROWS
    #[arg(long, value_name = "COLSxROWS", default_value = "80x24", value_parser = parse_size, global = true)]
    pub size: (u16, u16),
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Feed a key script through the multiplexer and print the result
    Replay {
        /// Script file, or `-` for stdin
        script: String,

        /// Print the session as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the prefix key table
    ListKeys,
}

pub fn parse_size(s: &str) -> std::result::Result<(u16, u16), String> {
    let (cols, rows) = s.split_once(['x', 'X']).ok_or_else(|| format!("expected COLSxROWS, got '{s}'"))?;
    let cols: u16 = cols.trim().parse().map_err(|_| format!("bad column count '{cols}'"))?;
    let rows: u16 = rows.trim().parse().map_err(|_| format!("bad row count '{rows}'"))?;
    if cols == 0 || rows == 0 { return Err("size must be at least 1x1".into()); }
    Ok((cols, rows))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStep {
    Key(KeyEvent),
    Sleep(Duration),
}

/// Parse a replay script: key names in config syntax, `"quoted text"` typed
/// one character at a time, `sleep <ms>`, and `#` comments.
pub fn parse_script(script: &str) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    for line in script.lines() {
        let mut rest = line.trim_start();
        while !rest.is_empty() {
            if rest.starts_with('#') { break; }
            if let Some(quoted) = rest.strip_prefix('"') {
                let (text, after) = take_quoted(quoted);
                steps.extend(text.chars().map(|c| ReplayStep::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))));
                rest = after.trim_start();
                continue;
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let (token, after) = rest.split_at(end);
            rest = after.trim_start();
            if token == "sleep" {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                let (ms, after) = rest.split_at(end);
                let ms: u64 = ms.parse().map_err(|_| Error::UnknownKey(format!("sleep {ms}")))?;
                steps.push(ReplayStep::Sleep(Duration::from_millis(ms)));
                rest = after.trim_start();
                continue;
            }
            let (code, mods) = parse_key_name(token).ok_or_else(|| Error::UnknownKey(token.to_string()))?;
            steps.push(ReplayStep::Key(KeyEvent::new(code, mods)));
        }
    }
    Ok(steps)
}

/// Text up to the closing quote (`\"` and `\\` escaped) and what follows it.
fn take_quoted(s: &str) -> (String, &str) {
    let mut text = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (text, &s[i + 1..]),
            '\\' => match chars.next() {
                Some((_, e)) => text.push(e),
                None => text.push('\\'),
            },
            _ => text.push(c),
        }
    }
    (text, "")
}
