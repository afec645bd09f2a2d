//! Options and the tmux-style config file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::{debug, warn};

use crate::commands::parse_command_to_action;
use crate::error::{Error, Result};
use crate::history::DEFAULT_HISTORY_CAP;
use crate::types::*;

const MAX_SOURCE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub prefix_key: (KeyCode, KeyModifiers),
    pub prefix_timeout: Duration,
    /// Scroll-back rows kept per pane.
    pub history_limit: usize,
    pub command_history_limit: usize,
    /// Directory holding the persisted command history; `None` keeps it in memory.
    pub history_dir: Option<PathBuf>,
    pub prompt: String,
    pub default_path: String,
    pub default_window_name: String,
    pub binds: Vec<Bind>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix_key: (KeyCode::Char('b'), KeyModifiers::CONTROL),
            prefix_timeout: Duration::from_millis(2000),
            history_limit: 2000,
            command_history_limit: DEFAULT_HISTORY_CAP,
            history_dir: None,
            prompt: "$ ".to_string(),
            default_path: "/".to_string(),
            default_window_name: "shell".to_string(),
            binds: default_binds(),
        }
    }
}

impl Options {
    pub fn bind_for(&self, key: (KeyCode, KeyModifiers)) -> Option<Action> {
        let key = normalize_key_for_binding(key);
        self.binds.iter().find(|b| b.key == key).map(|b| b.action)
    }
}

pub fn default_binds() -> Vec<Bind> {
    let plain = |c: char, action: Action| Bind { key: (KeyCode::Char(c), KeyModifiers::NONE), action };
    let mut binds = vec![
        plain('%', Action::SplitVertical),
        plain('"', Action::SplitHorizontal),
        Bind { key: (KeyCode::Left, KeyModifiers::NONE), action: Action::MoveFocus(FocusDir::Left) },
        Bind { key: (KeyCode::Right, KeyModifiers::NONE), action: Action::MoveFocus(FocusDir::Right) },
        Bind { key: (KeyCode::Up, KeyModifiers::NONE), action: Action::MoveFocus(FocusDir::Up) },
        Bind { key: (KeyCode::Down, KeyModifiers::NONE), action: Action::MoveFocus(FocusDir::Down) },
        plain('c', Action::NewWindow),
        plain('n', Action::NextWindow),
        plain('p', Action::PrevWindow),
        plain('w', Action::WindowChooser),
        plain('x', Action::KillPane),
        plain('z', Action::ZoomPane),
        plain('d', Action::Detach),
    ];
    for (i, c) in ('0'..='9').enumerate() {
        binds.push(plain(c, Action::SelectWindow(i)));
    }
    binds
}

/// Config file candidates in lookup order, after any explicit path.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() { paths.push(home.join(".shellmux.conf")); }
    if let Some(dir) = dirs::config_dir() { paths.push(dir.join("shellmux").join("shellmux.conf")); }
    paths
}

/// Build options from the first config file found. An explicit path (the
/// `--config` flag, then `$SHELLMUX_CONFIG`) must exist; the default
/// locations are skipped when missing.
pub fn load_config(explicit: Option<&Path>) -> Result<Options> {
    let mut opts = Options::default();
    let explicit = explicit.map(Path::to_path_buf).or_else(|| env::var_os("SHELLMUX_CONFIG").map(PathBuf::from));
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead { path: path.clone(), source })?;
        debug!(path = %path.display(), "loading config");
        parse_config_content(&mut opts, &content);
        return Ok(opts);
    }
    for path in default_config_paths() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            debug!(path = %path.display(), "loading config");
            parse_config_content(&mut opts, &content);
            break;
        }
    }
    Ok(opts)
}

/// Apply every line, logging and collecting the ones that fail.
pub fn parse_config_content(opts: &mut Options, content: &str) -> Vec<Error> {
    parse_content_at(opts, content, 0)
}

fn parse_content_at(opts: &mut Options, content: &str, depth: usize) -> Vec<Error> {
    let mut errors = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if let Err(message) = apply_line(opts, line, depth) {
            let err = Error::Config { line: n + 1, message };
            warn!("{err}");
            errors.push(err);
        }
    }
    errors
}

pub fn parse_config_line(opts: &mut Options, line: &str) -> std::result::Result<(), String> {
    apply_line(opts, line, 0)
}

fn apply_line(opts: &mut Options, line: &str, depth: usize) -> std::result::Result<(), String> {
    let l = line.trim();
    if l.is_empty() || l.starts_with('#') { return Ok(()); }
    let l = l.trim_end_matches('\\').trim();

    let (cmd, rest) = l.split_once(char::is_whitespace).unwrap_or((l, ""));
    match cmd {
        "set" | "set-option" => parse_set_option(opts, rest),
        "bind" | "bind-key" => parse_bind_key(opts, rest),
        "unbind" | "unbind-key" => parse_unbind_key(opts, rest),
        "source" | "source-file" => source_file(opts, rest.trim(), depth),
        _ => Err(format!("unknown command '{cmd}'")),
    }
}

fn parse_set_option(opts: &mut Options, rest: &str) -> std::result::Result<(), String> {
    let mut parts = rest.split_whitespace().peekable();
    // -g is the only scope there is
    while parts.peek().is_some_and(|p| p.starts_with('-')) { parts.next(); }
    let Some(name) = parts.next() else { return Err("missing option name".into()) };
    let value = parts.collect::<Vec<_>>().join(" ");
    parse_option_value(opts, name, value.trim_matches('"').trim_matches('\''))
}

pub fn parse_option_value(opts: &mut Options, name: &str, value: &str) -> std::result::Result<(), String> {
    let number = |v: &str| v.parse::<usize>().map_err(|_| format!("{name}: not a number: '{v}'"));
    match name {
        "prefix" => opts.prefix_key = parse_key_name(value).ok_or_else(|| format!("unknown key '{value}'"))?,
        "prefix-timeout" => opts.prefix_timeout = Duration::from_millis(number(value)? as u64),
        "history-limit" => opts.history_limit = number(value)?,
        "command-history-limit" => opts.command_history_limit = number(value)?,
        "history-dir" => opts.history_dir = Some(expand_home(value)),
        "prompt" => opts.prompt = value.to_string(),
        "default-path" => opts.default_path = value.to_string(),
        "default-window-name" => opts.default_window_name = value.to_string(),
        _ => return Err(format!("unknown option '{name}'")),
    }
    Ok(())
}

pub fn parse_bind_key(opts: &mut Options, rest: &str) -> std::result::Result<(), String> {
    let mut parts = rest.split_whitespace().peekable();
    while let Some(flag) = parts.next_if(|p| p.starts_with('-') && p.len() > 1) {
        // -r (repeat) has no meaning without a repeat timer
        if flag.contains('n') || flag.contains('T') {
            return Err("only the prefix table can be bound".into());
        }
    }
    let Some(key_str) = parts.next() else { return Err("missing key".into()) };
    let command = parts.collect::<Vec<_>>().join(" ");
    let key = parse_key_name(key_str).ok_or_else(|| format!("unknown key '{key_str}'"))?;
    let action = parse_command_to_action(&command).ok_or_else(|| format!("unknown command '{command}'"))?;
    let key = normalize_key_for_binding(key);
    opts.binds.retain(|b| b.key != key);
    opts.binds.push(Bind { key, action });
    Ok(())
}

pub fn parse_unbind_key(opts: &mut Options, rest: &str) -> std::result::Result<(), String> {
    let mut parts = rest.split_whitespace().peekable();
    while let Some(flag) = parts.next_if(|p| p.starts_with('-') && p.len() > 1) {
        if flag.contains('a') {
            opts.binds.clear();
            return Ok(());
        }
    }
    let Some(key_str) = parts.next() else { return Err("missing key".into()) };
    let key = parse_key_name(key_str).ok_or_else(|| format!("unknown key '{key_str}'"))?;
    let key = normalize_key_for_binding(key);
    opts.binds.retain(|b| b.key != key);
    Ok(())
}

fn source_file(opts: &mut Options, path: &str, depth: usize) -> std::result::Result<(), String> {
    if depth >= MAX_SOURCE_DEPTH { return Err("source-file nested too deeply".into()); }
    let path = expand_home(path.trim_matches('"').trim_matches('\''));
    let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    for err in parse_content_at(opts, &content, depth + 1) {
        debug!(path = %path.display(), "{err}");
    }
    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Strips SHIFT from Char keys: the character already says whether shift was
/// held, so `%` matches whether or not the terminal reports the modifier.
pub fn normalize_key_for_binding(key: (KeyCode, KeyModifiers)) -> (KeyCode, KeyModifiers) {
    match key.0 {
        KeyCode::Char(_) => (key.0, key.1.difference(KeyModifiers::SHIFT)),
        _ => key,
    }
}

/// Parse tmux key syntax: `C-a`, `M-x`, `C-M-Left`, `^b`, `Enter`, `F5`, or a
/// single character.
pub fn parse_key_name(name: &str) -> Option<(KeyCode, KeyModifiers)> {
    let name = name.trim();
    if let Some(c) = name.strip_prefix('^').and_then(single_char) {
        return Some((KeyCode::Char(c.to_ascii_lowercase()), KeyModifiers::CONTROL));
    }
    let mut mods = KeyModifiers::NONE;
    let mut rest = name;
    while rest.len() > 2 {
        match rest.get(..2) {
            Some("C-") => mods |= KeyModifiers::CONTROL,
            Some("M-") => mods |= KeyModifiers::ALT,
            Some("S-") => mods |= KeyModifiers::SHIFT,
            _ => break,
        }
        rest = &rest[2..];
    }

    let code = match rest.to_ascii_lowercase().as_str() {
        "enter" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "btab" => KeyCode::BackTab,
        "escape" | "esc" => KeyCode::Esc,
        "space" => KeyCode::Char(' '),
        "bspace" | "backspace" => KeyCode::Backspace,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "ppage" | "pageup" | "pgup" => KeyCode::PageUp,
        "npage" | "pagedown" | "pgdn" => KeyCode::PageDown,
        "ic" | "insert" => KeyCode::Insert,
        "dc" | "delete" => KeyCode::Delete,
        lower => match lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            Some(n) if (1..=12).contains(&n) => KeyCode::F(n),
            _ => {
                let c = single_char(rest)?;
                if mods.contains(KeyModifiers::CONTROL) {
                    KeyCode::Char(c.to_ascii_lowercase())
                } else {
                    KeyCode::Char(c)
                }
            }
        },
    };
    Some((code, mods))
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Inverse of [`parse_key_name`].
pub fn format_key_binding(key: &(KeyCode, KeyModifiers)) -> String {
    let (code, mods) = key;
    let mut out = String::new();
    if mods.contains(KeyModifiers::CONTROL) { out.push_str("C-"); }
    if mods.contains(KeyModifiers::ALT) { out.push_str("M-"); }
    if mods.contains(KeyModifiers::SHIFT) { out.push_str("S-"); }
    let name = match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => "BTab".to_string(),
        KeyCode::Esc => "Escape".to_string(),
        KeyCode::Backspace => "BSpace".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PPage".to_string(),
        KeyCode::PageDown => "NPage".to_string(),
        KeyCode::Insert => "IC".to_string(),
        KeyCode::Delete => "DC".to_string(),
        KeyCode::F(n) => format!("F{n}"),
        _ => "?".to_string(),
    };
    out.push_str(&name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ctrl(c: char) -> (KeyCode, KeyModifiers) {
        (KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key_name("C-a"), Some(ctrl('a')));
        assert_eq!(parse_key_name("^B"), Some(ctrl('b')));
        assert_eq!(parse_key_name("M-x"), Some((KeyCode::Char('x'), KeyModifiers::ALT)));
        assert_eq!(parse_key_name("C-M-Left"), Some((KeyCode::Left, KeyModifiers::CONTROL | KeyModifiers::ALT)));
        assert_eq!(parse_key_name("Space"), Some((KeyCode::Char(' '), KeyModifiers::NONE)));
        assert_eq!(parse_key_name("BSpace"), Some((KeyCode::Backspace, KeyModifiers::NONE)));
        assert_eq!(parse_key_name("F12"), Some((KeyCode::F(12), KeyModifiers::NONE)));
        assert_eq!(parse_key_name("%"), Some((KeyCode::Char('%'), KeyModifiers::NONE)));
        assert_eq!(parse_key_name("F13"), None);
        assert_eq!(parse_key_name("nope"), None);
    }

    #[test]
    fn test_format_key_binding_round_trips() {
        for name in ["C-b", "M-x", "Up", "Space", "F5", "%", "C-M-Left", "Escape"] {
            let key = parse_key_name(name).unwrap();
            assert_eq!(format_key_binding(&key), name);
        }
    }

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.prefix_key, ctrl('b'));
        assert_eq!(opts.prefix_timeout, Duration::from_secs(2));
        assert_eq!(opts.bind_for((KeyCode::Char('%'), KeyModifiers::SHIFT)), Some(Action::SplitVertical));
        assert_eq!(opts.bind_for((KeyCode::Char('3'), KeyModifiers::NONE)), Some(Action::SelectWindow(3)));
        assert_eq!(opts.bind_for((KeyCode::Char('q'), KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_set_options() {
        let mut opts = Options::default();
        let errors = parse_config_content(&mut opts, "\
# comment
set -g prefix C-a
set-option history-limit 50
set prefix-timeout 500
set -g prompt \"> \"
set default-window-name work \\
set bogus 1
set history-limit lots
");
        assert_eq!(opts.prefix_key, ctrl('a'));
        assert_eq!(opts.history_limit, 50);
        assert_eq!(opts.prefix_timeout, Duration::from_millis(500));
        assert_eq!(opts.prompt, "> ");
        assert_eq!(opts.default_window_name, "work");
        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec![
            "config line 7: unknown option 'bogus'",
            "config line 8: history-limit: not a number: 'lots'",
        ]);
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut opts = Options::default();
        parse_config_line(&mut opts, "bind | split-window -h").unwrap();
        parse_config_line(&mut opts, "bind-key -r k select-pane -U").unwrap();
        parse_config_line(&mut opts, "unbind %").unwrap();
        assert_eq!(opts.bind_for((KeyCode::Char('|'), KeyModifiers::NONE)), Some(Action::SplitVertical));
        assert_eq!(opts.bind_for((KeyCode::Char('k'), KeyModifiers::NONE)), Some(Action::MoveFocus(FocusDir::Up)));
        assert_eq!(opts.bind_for((KeyCode::Char('%'), KeyModifiers::NONE)), None);
        assert!(parse_config_line(&mut opts, "bind -n M-h select-pane -L").is_err());
        assert!(parse_config_line(&mut opts, "bind y copy-mode").is_err());
        parse_config_line(&mut opts, "unbind -a").unwrap();
        assert!(opts.binds.is_empty());
    }

    #[test]
    fn test_source_file() {
        let mut inner = tempfile::NamedTempFile::new().unwrap();
        writeln!(inner, "set history-limit 7").unwrap();
        let mut opts = Options::default();
        parse_config_line(&mut opts, &format!("source-file {}", inner.path().display())).unwrap();
        assert_eq!(opts.history_limit, 7);
        assert!(parse_config_line(&mut opts, "source /definitely/not/here.conf").is_err());
    }

    #[test]
    fn test_source_loop_stops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        writeln!(file, "set history-limit 9\nsource {path}").unwrap();
        let mut opts = Options::default();
        parse_config_line(&mut opts, &format!("source {path}")).unwrap();
        assert_eq!(opts.history_limit, 9);
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "set -g prefix C-a").unwrap();
        let opts = load_config(Some(file.path())).unwrap();
        assert_eq!(opts.prefix_key, ctrl('a'));
        let err = load_config(Some(Path::new("/no/such/shellmux.conf"))).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
