//! Per-pane line editor.
//!
//! [`Shell`] consumes one character at a time and writes the echo/redraw
//! bytes for a VT-style terminal through its [`ShellHost`]. Everything is
//! synchronous: a character is fully applied before the next is read.

use tracing::trace;
use unicode_width::UnicodeWidthChar;

use crate::commands::CommandStatus;
use crate::completion::Completion;
use crate::history::SharedHistory;
use crate::terminal::TerminalWriter;

const CTRL_A: char = '\x01';
const CTRL_C: char = '\x03';
const CTRL_D: char = '\x04';
const CTRL_E: char = '\x05';
const CTRL_G: char = '\x07';
const BS: char = '\x08';
const TAB: char = '\x09';
const CTRL_K: char = '\x0b';
const CTRL_L: char = '\x0c';
const ENTER: char = '\r';
const CTRL_R: char = '\x12';
const CTRL_U: char = '\x15';
const CTRL_W: char = '\x17';
const ESC: char = '\x1b';
const DEL: char = '\x7f';

/// Longest CSI body we keep collecting before giving up on it.
const MAX_CSI_LEN: usize = 16;

/// What the line editor needs from whoever owns it.
pub trait ShellHost: TerminalWriter {
    /// Runs before every prompt is printed.
    fn before_prompt(&mut self) {}
    /// Dispatch a trimmed, non-empty line.
    fn execute(&mut self, line: &str) -> CommandStatus;
    fn complete(&mut self, before_cursor: &str) -> Completion;
    /// Host-level scroll-back clear requested by Ctrl-L.
    fn clear_scrollback(&mut self) {}
    fn on_eof(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    Normal,
    EscSeen,
    Csi(String),
    /// `ESC O`, as sent for arrows in application cursor mode.
    Ss3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search { query: String, match_index: usize },
}

pub struct Shell {
    buffer: Vec<char>,
    cursor: usize,
    parse: ParseState,
    mode: InputMode,
    /// Draft kept while browsing history.
    saved_input: Vec<char>,
    /// Line as it was when reverse search started.
    search_saved: Vec<char>,
    browsing: Option<usize>,
    history: SharedHistory,
    prompt: String,
}

fn width(chars: &[char]) -> usize {
    chars.iter().map(|c| c.width().unwrap_or(0)).sum()
}

fn left(n: usize) -> String {
    if n == 0 { String::new() } else { format!("\x1b[{n}D") }
}

fn right(n: usize) -> String {
    if n == 0 { String::new() } else { format!("\x1b[{n}C") }
}

impl Shell {
    pub fn new(history: SharedHistory, prompt: &str) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            parse: ParseState::Normal,
            mode: InputMode::Normal,
            saved_input: Vec::new(),
            search_saved: Vec::new(),
            browsing: None,
            history,
            prompt: prompt.to_string(),
        }
    }

    pub fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    pub fn is_browsing(&self) -> bool {
        self.browsing.is_some()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The text currently shown in front of the edit line.
    pub fn prompt_text(&self) -> String {
        match &self.mode {
            InputMode::Normal => self.prompt.clone(),
            InputMode::Search { query, .. } => format!("(reverse-i-search)`{query}': "),
        }
    }

    /// The history entry the current search would select, if any.
    pub fn search_match(&self) -> Option<String> {
        match &self.mode {
            InputMode::Search { query, match_index } => {
                self.history.borrow().search(query, *match_index).map(str::to_string)
            }
            InputMode::Normal => None,
        }
    }

    pub fn print_prompt(&mut self, host: &mut dyn ShellHost) {
        host.write(&self.prompt);
    }

    pub fn handle_data(&mut self, data: &str, host: &mut dyn ShellHost) {
        for c in data.chars() {
            self.handle(c, host);
        }
    }

    pub fn handle(&mut self, c: char, host: &mut dyn ShellHost) {
        match std::mem::replace(&mut self.parse, ParseState::Normal) {
            ParseState::EscSeen if c == '[' => {
                self.parse = ParseState::Csi(String::new());
            }
            ParseState::EscSeen if c == 'O' => {
                self.parse = ParseState::Ss3;
            }
            // Alt+key and other two-byte escapes are discarded whole.
            ParseState::EscSeen => trace!(?c, "dropping escape"),
            ParseState::Ss3 => match c {
                'A' | 'B' | 'C' | 'D' | 'H' | 'F' => self.handle_csi(c.encode_utf8(&mut [0; 4]), host),
                _ => trace!(?c, "ignoring ss3 sequence"),
            },
            ParseState::Csi(mut seq) => {
                seq.push(c);
                if ('\x40'..='\x7e').contains(&c) {
                    self.handle_csi(&seq, host);
                } else if seq.len() < MAX_CSI_LEN {
                    self.parse = ParseState::Csi(seq);
                } else {
                    trace!(?seq, "dropping overlong escape sequence");
                }
            }
            ParseState::Normal => self.handle_char(c, host),
        }
    }

    fn handle_char(&mut self, c: char, host: &mut dyn ShellHost) {
        if matches!(self.mode, InputMode::Search { .. }) {
            self.handle_search_char(c, host);
            return;
        }
        match c {
            ESC => self.parse = ParseState::EscSeen,
            CTRL_C => {
                host.write("^C\r\n");
                self.buffer.clear();
                self.cursor = 0;
                self.browsing = None;
                host.before_prompt();
                self.print_prompt(host);
            }
            CTRL_D => host.on_eof(),
            CTRL_L => {
                host.write("\x1b[2J\x1b[H");
                host.clear_scrollback();
                let after = width(&self.buffer[self.cursor..]);
                host.write(&format!("{}{}{}", self.prompt, self.line(), left(after)));
            }
            CTRL_A => self.move_home(host),
            CTRL_E => self.move_end(host),
            CTRL_W => self.delete_word(host),
            CTRL_K => {
                if self.cursor < self.buffer.len() {
                    self.browsing = None;
                    self.buffer.truncate(self.cursor);
                    host.write("\x1b[K");
                }
            }
            CTRL_U => {
                if self.cursor > 0 {
                    self.browsing = None;
                    let before = width(&self.buffer[..self.cursor]);
                    self.buffer.drain(..self.cursor);
                    self.cursor = 0;
                    let rest: String = self.buffer.iter().collect();
                    host.write(&format!("{}\x1b[K{}{}", left(before), rest, left(width(&self.buffer))));
                }
            }
            DEL | BS => self.backspace(host),
            TAB => self.complete(host),
            ENTER => self.submit(host),
            CTRL_R => {
                self.search_saved = self.buffer.clone();
                self.mode = InputMode::Search { query: String::new(), match_index: 0 };
                self.redraw_search(host);
            }
            c if c >= ' ' => self.insert(&[c], host),
            _ => {}
        }
    }

    fn handle_csi(&mut self, seq: &str, host: &mut dyn ShellHost) {
        match seq {
            "A" => self.history_prev(host),
            "B" => self.history_next(host),
            "C" => {
                if self.cursor < self.buffer.len() {
                    let w = width(&self.buffer[self.cursor..=self.cursor]);
                    self.cursor += 1;
                    host.write(&if w == 1 { "\x1b[C".to_string() } else { right(w) });
                }
            }
            "D" => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let w = width(&self.buffer[self.cursor..=self.cursor]);
                    host.write(&if w == 1 { "\x1b[D".to_string() } else { left(w) });
                }
            }
            "H" => self.move_home(host),
            "F" => self.move_end(host),
            "3~" => {
                if self.cursor < self.buffer.len() {
                    self.browsing = None;
                    let removed = self.buffer.remove(self.cursor);
                    let w = removed.width().unwrap_or(0);
                    let after = &self.buffer[self.cursor..];
                    let tail: String = after.iter().collect();
                    host.write(&format!("{}{}{}", tail, " ".repeat(w), left(width(after) + w)));
                }
            }
            _ => trace!(seq, "ignoring escape sequence"),
        }
    }

    fn insert(&mut self, chars: &[char], host: &mut dyn ShellHost) {
        self.browsing = None;
        for (i, c) in chars.iter().enumerate() {
            self.buffer.insert(self.cursor + i, *c);
        }
        self.cursor += chars.len();
        let after = &self.buffer[self.cursor..];
        let echo: String = chars.iter().chain(after.iter()).collect();
        host.write(&format!("{}{}", echo, left(width(after))));
    }

    fn move_home(&mut self, host: &mut dyn ShellHost) {
        if self.cursor > 0 {
            host.write(&left(width(&self.buffer[..self.cursor])));
            self.cursor = 0;
        }
    }

    fn move_end(&mut self, host: &mut dyn ShellHost) {
        if self.cursor < self.buffer.len() {
            host.write(&right(width(&self.buffer[self.cursor..])));
            self.cursor = self.buffer.len();
        }
    }

    fn backspace(&mut self, host: &mut dyn ShellHost) {
        if self.cursor == 0 { return; }
        self.browsing = None;
        self.cursor -= 1;
        let removed = self.buffer.remove(self.cursor);
        let w = removed.width().unwrap_or(0);
        let after = &self.buffer[self.cursor..];
        let tail: String = after.iter().collect();
        host.write(&format!("{}{}{}{}", "\x08".repeat(w), tail, " ".repeat(w), left(width(after) + w)));
    }

    fn delete_word(&mut self, host: &mut dyn ShellHost) {
        if self.cursor == 0 { return; }
        self.browsing = None;
        let mut pos = self.cursor;
        while pos > 0 && self.buffer[pos - 1] == ' ' { pos -= 1; }
        while pos > 0 && self.buffer[pos - 1] != ' ' { pos -= 1; }
        let deleted = width(&self.buffer[pos..self.cursor]);
        self.buffer.drain(pos..self.cursor);
        self.cursor = pos;
        let after = &self.buffer[pos..];
        let tail: String = after.iter().collect();
        host.write(&format!("{}{}{}{}", left(deleted), tail, " ".repeat(deleted), left(width(after) + deleted)));
    }

    fn complete(&mut self, host: &mut dyn ShellHost) {
        let before: String = self.buffer[..self.cursor].iter().collect();
        match host.complete(&before) {
            Completion::None => {}
            Completion::Insert(text) => {
                let chars: Vec<char> = text.chars().collect();
                if !chars.is_empty() { self.insert(&chars, host); }
            }
            Completion::List(items) => {
                let after = width(&self.buffer[self.cursor..]);
                host.write(&format!("\r\n{}\r\n{}{}{}", items.join("  "), self.prompt, self.line(), left(after)));
            }
        }
    }

    fn submit(&mut self, host: &mut dyn ShellHost) {
        host.write("\r\n");
        let line = self.line().trim().to_string();
        self.buffer.clear();
        self.cursor = 0;
        self.browsing = None;
        let mut status = CommandStatus::Continue;
        if !line.is_empty() {
            self.history.borrow_mut().push(&line);
            status = host.execute(&line);
        }
        if status == CommandStatus::Continue {
            host.before_prompt();
            self.print_prompt(host);
        }
    }

    /// Replace the whole edit line, cursor at the end.
    fn replace_line(&mut self, chars: Vec<char>, host: &mut dyn ShellHost) {
        self.buffer = chars;
        self.cursor = self.buffer.len();
        host.write(&format!("\r\x1b[K{}{}", self.prompt, self.line()));
    }

    fn history_prev(&mut self, host: &mut dyn ShellHost) {
        let len = self.history.borrow().len();
        if len == 0 { return; }
        let idx = match self.browsing {
            None => {
                self.saved_input = self.buffer.clone();
                len - 1
            }
            Some(0) => return,
            Some(i) => i - 1,
        };
        self.browsing = Some(idx);
        let entry: Vec<char> = self.history.borrow().get(idx).unwrap_or_default().chars().collect();
        self.replace_line(entry, host);
    }

    fn history_next(&mut self, host: &mut dyn ShellHost) {
        let Some(i) = self.browsing else { return };
        let len = self.history.borrow().len();
        if i + 1 < len {
            self.browsing = Some(i + 1);
            let entry: Vec<char> = self.history.borrow().get(i + 1).unwrap_or_default().chars().collect();
            self.replace_line(entry, host);
        } else {
            self.browsing = None;
            let saved = std::mem::take(&mut self.saved_input);
            self.replace_line(saved, host);
        }
    }

    fn handle_search_char(&mut self, c: char, host: &mut dyn ShellHost) {
        let InputMode::Search { query, match_index } = &mut self.mode else { return };
        match c {
            ESC => {
                self.cancel_search(host);
                self.parse = ParseState::EscSeen;
            }
            CTRL_G | CTRL_C => self.cancel_search(host),
            // Each repeat steps to the next older match and stays put on the oldest.
            CTRL_R => {
                let next = *match_index + 1;
                if self.history.borrow().search(query, next).is_some() {
                    *match_index = next;
                }
                self.redraw_search(host);
            }
            DEL | BS => {
                query.pop();
                *match_index = 0;
                self.redraw_search(host);
            }
            ENTER => match self.search_match() {
                Some(found) => {
                    self.mode = InputMode::Normal;
                    self.replace_line(found.chars().collect(), host);
                    self.submit(host);
                }
                None => self.cancel_search(host),
            },
            c if c >= ' ' => {
                query.push(c);
                *match_index = 0;
                self.redraw_search(host);
            }
            c => {
                let accepted = match self.search_match() {
                    Some(found) => {
                        self.browsing = None;
                        found.chars().collect()
                    }
                    None => std::mem::take(&mut self.search_saved),
                };
                self.mode = InputMode::Normal;
                self.replace_line(accepted, host);
                self.handle_char(c, host);
            }
        }
    }

    fn cancel_search(&mut self, host: &mut dyn ShellHost) {
        self.mode = InputMode::Normal;
        let saved = std::mem::take(&mut self.search_saved);
        self.replace_line(saved, host);
    }

    fn redraw_search(&self, host: &mut dyn ShellHost) {
        let found = self.search_match().unwrap_or_default();
        host.write(&format!("\r\x1b[K{}{}", self.prompt_text(), found));
    }
}
