//! Command tables: the builtin shell commands a pane dispatches submitted
//! lines to, and the tmux-style multiplexer commands used by key bindings.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::app::Multiplexer;
use crate::history::SharedHistory;
use crate::pane::{create_window, split_active};
use crate::terminal::TerminalWriter;
use crate::types::*;
use crate::vfs::FileSystem;
use crate::window_ops::{move_focus, next_window, prev_window, select_window, toggle_zoom};

/// Returned by a command handler. `SuppressPrompt` is for commands that hand
/// interactive control to something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Continue,
    SuppressPrompt,
}

/// Pane state a command may read or change.
pub struct CommandContext<'a> {
    pub cwd: &'a mut String,
    pub fs: &'a RefCell<dyn FileSystem + 'static>,
    pub history: &'a SharedHistory,
    pub commands: &'a CommandRegistry,
    /// Names of launchable hosted processes.
    pub programs: &'a [String],
    /// Set by a command to wipe the pane's scroll-back.
    pub clear_scrollback: bool,
}

pub type CommandHandler = Rc<dyn Fn(&[String], &mut dyn TerminalWriter, &mut CommandContext<'_>) -> CommandStatus>;

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub about: String,
    pub handler: CommandHandler,
}

/// Builtins in registration order; completion lists them in that order.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("help", "Show this message", Rc::new(cmd_help));
        reg.register("clear", "Clear the screen", Rc::new(cmd_clear));
        reg.register("echo", "Print arguments", Rc::new(cmd_echo));
        reg.register("whoami", "Display current user", Rc::new(cmd_whoami));
        reg.register("date", "Display current date", Rc::new(cmd_date));
        reg.register("pwd", "Print working directory", Rc::new(cmd_pwd));
        reg.register("cd", "Change directory", Rc::new(cmd_cd));
        reg.register("ls", "List directory contents", Rc::new(cmd_ls));
        reg.register("cat", "Print file contents", Rc::new(cmd_cat));
        reg.register("touch", "Create an empty file", Rc::new(cmd_touch));
        reg.register("history", "List command history", Rc::new(cmd_history));
        reg.register("rainbow", "Test color output", Rc::new(cmd_rainbow));
        reg
    }

    /// Register a command, replacing an existing one of the same name.
    pub fn register(&mut self, name: &str, about: &str, handler: CommandHandler) {
        let cmd = Command { name: name.to_string(), about: about.to_string(), handler };
        match self.commands.iter_mut().find(|c| c.name == name) {
            Some(slot) => *slot = cmd,
            None => self.commands.push(cmd),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }
}

fn cmd_help(_args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write("Available commands:\r\n");
    for cmd in ctx.commands.iter() {
        out.write(&format!("  {:<8} {}\r\n", cmd.name, cmd.about));
    }
    for name in ctx.programs {
        out.write(&format!("  {:<8} Run the {} program\r\n", name, name));
    }
    CommandStatus::Continue
}

fn cmd_clear(_args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write("\x1b[2J\x1b[H");
    ctx.clear_scrollback = true;
    CommandStatus::Continue
}

fn cmd_echo(args: &[String], out: &mut dyn TerminalWriter, _ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write(&format!("{}\r\n", args.join(" ")));
    CommandStatus::Continue
}

fn cmd_whoami(_args: &[String], out: &mut dyn TerminalWriter, _ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write("guest\r\n");
    CommandStatus::Continue
}

fn cmd_date(_args: &[String], out: &mut dyn TerminalWriter, _ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write(&format!("{}\r\n", chrono::Local::now().format("%a %b %e %H:%M:%S %Y")));
    CommandStatus::Continue
}

fn cmd_pwd(_args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    out.write(&format!("{}\r\n", ctx.cwd));
    CommandStatus::Continue
}

fn cmd_cd(args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    let target = args.first().map(String::as_str).unwrap_or("/");
    let fs = ctx.fs.borrow();
    let path = fs.resolve_path(ctx.cwd.as_str(), target);
    if fs.is_directory(&path) {
        *ctx.cwd = path;
    } else {
        out.write(&format!("cd: no such directory: {target}\r\n"));
    }
    CommandStatus::Continue
}

fn cmd_ls(args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    let fs = ctx.fs.borrow();
    let targets: Vec<&str> = if args.is_empty() { vec!["."] } else { args.iter().map(String::as_str).collect() };
    for (i, target) in targets.iter().enumerate() {
        let path = fs.resolve_path(ctx.cwd.as_str(), target);
        let Some(names) = fs.list_dir(&path) else {
            if fs.get_node(&path).is_some() {
                out.write(&format!("{target}\r\n"));
            } else {
                out.write(&format!("ls: cannot access '{target}': No such file or directory\r\n"));
            }
            continue;
        };
        if targets.len() > 1 {
            if i > 0 { out.write("\r\n"); }
            out.write(&format!("{target}:\r\n"));
        }
        let shown: Vec<String> = names
            .into_iter()
            .map(|n| if fs.is_directory(&fs.resolve_path(&path, &n)) { format!("{n}/") } else { n })
            .collect();
        if !shown.is_empty() {
            out.write(&format!("{}\r\n", shown.join("  ")));
        }
    }
    CommandStatus::Continue
}

fn cmd_cat(args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    if args.is_empty() {
        out.write("cat: missing file operand\r\n");
        return CommandStatus::Continue;
    }
    let fs = ctx.fs.borrow();
    for arg in args {
        let path = fs.resolve_path(ctx.cwd.as_str(), arg);
        if fs.is_directory(&path) {
            out.write(&format!("cat: {arg}: Is a directory\r\n"));
            continue;
        }
        match fs.read_file(&path) {
            Some(content) => {
                let mut text = content.replace('\n', "\r\n");
                if !text.is_empty() && !text.ends_with("\r\n") { text.push_str("\r\n"); }
                out.write(&text);
            }
            None => out.write(&format!("cat: {arg}: No such file or directory\r\n")),
        }
    }
    CommandStatus::Continue
}

fn cmd_touch(args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    if args.is_empty() {
        out.write("touch: missing file operand\r\n");
        return CommandStatus::Continue;
    }
    let mut fs = ctx.fs.borrow_mut();
    for arg in args {
        let path = fs.resolve_path(ctx.cwd.as_str(), arg);
        if fs.get_node(&path).is_some() { continue; }
        if !fs.write_file(&path, "") {
            out.write(&format!("touch: cannot touch '{arg}'\r\n"));
        }
    }
    CommandStatus::Continue
}

fn cmd_history(_args: &[String], out: &mut dyn TerminalWriter, ctx: &mut CommandContext<'_>) -> CommandStatus {
    let history = ctx.history.borrow();
    for (i, line) in history.iter().enumerate() {
        out.write(&format!("{:>5}  {}\r\n", i + 1, line));
    }
    CommandStatus::Continue
}

fn cmd_rainbow(_args: &[String], out: &mut dyn TerminalWriter, _ctx: &mut CommandContext<'_>) -> CommandStatus {
    const COLORS: [(u8, &str); 6] = [(31, "red"), (33, "yellow"), (32, "green"), (36, "cyan"), (34, "blue"), (35, "magenta")];
    let mut s = String::new();
    for (code, _) in COLORS { s.push_str(&format!("\x1b[{code}m{}\x1b[0m", "█".repeat(8))); }
    s.push_str("\r\n");
    for (code, name) in COLORS { s.push_str(&format!("\x1b[{code}m{name:<8}\x1b[0m")); }
    s.push_str("\r\n");
    for (code, _) in COLORS { s.push_str(&format!("\x1b[{code};1m{}\x1b[0m", "█".repeat(8))); }
    s.push_str("\r\n");
    for i in (196..=201).chain((202..=207).rev()) {
        s.push_str(&format!("\x1b[38;5;{i}m██\x1b[0m"));
    }
    s.push_str("\r\n");
    out.write(&s);
    CommandStatus::Continue
}

/// Split a command line on whitespace, keeping double-quoted runs together.
pub fn parse_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape_next = false;
    let mut quoted = false;

    for c in line.chars() {
        if escape_next {
            current.push(c);
            escape_next = false;
        } else if c == '\\' && in_quotes {
            escape_next = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
            quoted = true;
        } else if c.is_whitespace() && !in_quotes {
            if !current.is_empty() || quoted {
                args.push(std::mem::take(&mut current));
                quoted = false;
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

fn parse_window_target(target: &str) -> Option<usize> {
    target.trim_start_matches(':').parse().ok()
}

/// Map a tmux command string to a bindable action.
pub fn parse_command_to_action(cmd: &str) -> Option<Action> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.is_empty() { return None; }

    match parts[0] {
        "new-window" | "neww" => Some(Action::NewWindow),
        "split-window" | "splitw" => {
            if parts.iter().any(|p| *p == "-h") {
                Some(Action::SplitVertical)
            } else {
                Some(Action::SplitHorizontal)
            }
        }
        "kill-pane" | "killp" => Some(Action::KillPane),
        "next-window" | "next" => Some(Action::NextWindow),
        "previous-window" | "prev" => Some(Action::PrevWindow),
        "detach-client" | "detach" => Some(Action::Detach),
        "choose-window" | "choose-tree" => Some(Action::WindowChooser),
        "resize-pane" | "resizep" if parts.iter().any(|p| *p == "-Z") => Some(Action::ZoomPane),
        "zoom-pane" => Some(Action::ZoomPane),
        "select-pane" | "selectp" => {
            if parts.iter().any(|p| *p == "-U") {
                Some(Action::MoveFocus(FocusDir::Up))
            } else if parts.iter().any(|p| *p == "-D") {
                Some(Action::MoveFocus(FocusDir::Down))
            } else if parts.iter().any(|p| *p == "-L") {
                Some(Action::MoveFocus(FocusDir::Left))
            } else if parts.iter().any(|p| *p == "-R") {
                Some(Action::MoveFocus(FocusDir::Right))
            } else {
                None
            }
        }
        "select-window" | "selectw" => {
            let target = parts.windows(2).find(|w| w[0] == "-t").map(|w| w[1])?;
            parse_window_target(target).map(Action::SelectWindow)
        }
        _ => None,
    }
}

/// Format an Action back to a command string.
pub fn format_action(action: &Action) -> String {
    match action {
        Action::NewWindow => "new-window".to_string(),
        Action::SplitVertical => "split-window -h".to_string(),
        Action::SplitHorizontal => "split-window -v".to_string(),
        Action::KillPane => "kill-pane".to_string(),
        Action::NextWindow => "next-window".to_string(),
        Action::PrevWindow => "previous-window".to_string(),
        Action::Detach => "detach-client".to_string(),
        Action::WindowChooser => "choose-window".to_string(),
        Action::ZoomPane => "resize-pane -Z".to_string(),
        Action::SelectWindow(n) => format!("select-window -t :{}", n),
        Action::MoveFocus(dir) => {
            let flag = match dir {
                FocusDir::Up => "-U",
                FocusDir::Down => "-D",
                FocusDir::Left => "-L",
                FocusDir::Right => "-R",
            };
            format!("select-pane {}", flag)
        }
    }
}

/// Apply one prefix-table action to the multiplexer.
pub fn execute_action(mux: &mut Multiplexer, action: &Action) -> KeyAction {
    debug!(action = %format_action(action), "prefix action");
    match action {
        Action::SplitVertical => split_active(mux, LayoutKind::Vertical),
        Action::SplitHorizontal => split_active(mux, LayoutKind::Horizontal),
        Action::MoveFocus(dir) => move_focus(mux, *dir),
        Action::NewWindow => create_window(mux),
        Action::NextWindow => next_window(mux),
        Action::PrevWindow => prev_window(mux),
        Action::SelectWindow(idx) => select_window(mux, *idx),
        Action::WindowChooser => {
            let selected = mux.active_idx;
            mux.open_overlay(Overlay::WindowViewer { selected });
        }
        Action::KillPane => {
            if mux.is_last_pane() { return KeyAction::Detach; }
            mux.open_overlay(Overlay::KillPaneConfirm);
        }
        Action::ZoomPane => toggle_zoom(mux),
        Action::Detach => return KeyAction::Detach,
    }
    KeyAction::Handled
}
