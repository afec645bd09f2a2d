use std::rc::Rc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use shellmux::app::Multiplexer;
use shellmux::commands::CommandRegistry;
use shellmux::config::{parse_config_content, Options};
use shellmux::history::{CommandHistory, FileStore, SharedHistory};
use shellmux::input::dispatch_key;
use shellmux::pane::Services;
use shellmux::process::ProcessRegistry;
use shellmux::shell::InputMode;
use shellmux::terminal::row_text;
use shellmux::timer::ManualClock;
use shellmux::types::*;
use shellmux::window_ops::compute_pane_rects;

struct Session {
    mux: Multiplexer,
    clock: ManualClock,
}

impl Session {
    fn with(options: Options, services: Services) -> Self {
        let clock = ManualClock::new();
        let mux = Multiplexer::new(options, services, Rc::new(clock.clone()), (80, 24));
        Self { mux, clock }
    }

    fn new() -> Self {
        Self::with(Options::default(), Services::new(CommandHistory::new(100).shared()))
    }

    fn key(&mut self, code: KeyCode) -> KeyAction {
        self.send(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(&mut self, c: char) -> KeyAction {
        self.send(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn send(&mut self, key: KeyEvent) -> KeyAction {
        let action = dispatch_key(&mut self.mux, key);
        self.mux.pump_all();
        action
    }

    fn type_str(&mut self, s: &str) {
        for c in s.chars() { self.key(KeyCode::Char(c)); }
    }

    fn prefix(&mut self, c: char) -> KeyAction {
        assert_eq!(self.ctrl('b'), KeyAction::ActivatePrefix);
        self.key(KeyCode::Char(c))
    }

    fn line(&self) -> String {
        self.mux.active_pane().map(|p| p.input_line()).unwrap_or_default()
    }

    fn screen(&self) -> Vec<String> {
        let pane = self.mux.active_pane().unwrap();
        let mut rows: Vec<String> = pane.screen().iter().map(|r| row_text(r)).collect();
        while rows.last().is_some_and(|r| r.is_empty()) { rows.pop(); }
        rows
    }

    fn scrollback(&self) -> Vec<String> {
        self.mux.active_pane().unwrap().scrollback().iter().map(|r| row_text(r)).collect()
    }
}

fn services_with_commands(names: &[&str]) -> Services {
    let builtins = CommandRegistry::with_builtins();
    let mut commands = CommandRegistry::new();
    for name in names {
        let handler = builtins.get("echo").unwrap().handler.clone();
        commands.register(name, "test command", handler);
    }
    let mut services = Services::new(CommandHistory::new(100).shared());
    services.commands = Rc::new(commands);
    services.processes = Rc::new(ProcessRegistry::new());
    services
}

#[test]
fn test_divergent_completion_lists_candidates() {
    let mut s = Session::with(Options::default(), services_with_commands(&["ls", "ln"]));
    s.type_str("l");
    s.key(KeyCode::Tab);
    assert_eq!(s.line(), "l");
    assert_eq!(s.screen(), vec!["$ l", "ls  ln", "$ l"]);
}

#[test]
fn test_single_completion_appends_space() {
    let mut s = Session::with(Options::default(), services_with_commands(&["cat"]));
    s.type_str("ca");
    s.key(KeyCode::Tab);
    assert_eq!(s.line(), "cat ");
    s.type_str("ok");
    s.key(KeyCode::Enter);
    assert_eq!(s.scrollback(), vec!["$ cat ok", "ok"]);
}

#[test]
fn test_reverse_search_runs_match() {
    let history: SharedHistory = CommandHistory::new(100).shared();
    for line in ["ls", "echo hi", "cd /"] { history.borrow_mut().push(line); }
    let mut s = Session::with(Options::default(), Services::new(history.clone()));

    s.ctrl('r');
    s.type_str("ec");
    let shell = s.mux.active_pane().unwrap().shell();
    assert_eq!(shell.search_match().as_deref(), Some("echo hi"));
    assert!(matches!(shell.mode(), InputMode::Search { .. }));
    assert_eq!(s.screen(), vec!["(reverse-i-search)`ec': echo hi"]);

    s.key(KeyCode::Enter);
    assert_eq!(s.scrollback().last().map(String::as_str), Some("hi"));
    assert_eq!(history.borrow().len(), 4);

    s.ctrl('r');
    s.type_str("ec");
    s.key(KeyCode::Enter);
    assert_eq!(history.borrow().len(), 4);
}

#[test]
fn test_search_cancel_restores_buffer() {
    let history: SharedHistory = CommandHistory::new(100).shared();
    history.borrow_mut().push("echo one");
    let mut s = Session::with(Options::default(), Services::new(history));
    s.type_str("draft");
    s.ctrl('r');
    s.type_str("one");
    s.ctrl('g');
    assert_eq!(s.line(), "draft");
    assert_eq!(s.screen(), vec!["$ draft"]);
}

#[test]
fn test_split_navigate_and_zoom() {
    let mut s = Session::new();
    assert_eq!(s.prefix('%'), KeyAction::Handled);
    let rects = compute_pane_rects(&s.mux);
    assert_eq!(rects.len(), 2);
    assert_eq!(rects[0].1.width, rects[1].1.width);
    assert_eq!(rects[0].1.height, 1.0);
    assert_eq!(rects[0].1.x + rects[0].1.width, rects[1].1.x);

    s.type_str("pwd");
    assert_eq!(s.mux.panes[&PaneId(2)].input_line(), "pwd");
    assert_eq!(s.mux.panes[&PaneId(1)].input_line(), "");

    s.prefix('z');
    assert_eq!(compute_pane_rects(&s.mux), vec![(PaneId(2), Rect::UNIT)]);
    s.prefix('z');
    assert_eq!(compute_pane_rects(&s.mux), rects);

    s.ctrl('b');
    s.key(KeyCode::Left);
    assert_eq!(s.mux.active_pane_id(), PaneId(1));
    s.ctrl('b');
    s.key(KeyCode::Left);
    assert_eq!(s.mux.active_pane_id(), PaneId(1));
}

#[test]
fn test_prefix_times_out() {
    let mut s = Session::new();
    s.ctrl('b');
    s.clock.advance(Duration::from_millis(2100));
    s.mux.tick();
    assert_eq!(s.mux.mode, Mode::Passthrough);
    assert_eq!(s.key(KeyCode::Char('c')), KeyAction::Passthrough);
    assert_eq!(s.mux.windows.len(), 1);
    assert_eq!(s.line(), "c");
}

#[test]
fn test_kill_flow_and_detach() {
    let mut s = Session::new();
    s.prefix('"');
    s.prefix('x');
    assert_eq!(s.mux.overlay(), Some(Overlay::KillPaneConfirm));
    // overlay swallows the key; nothing reaches the pane
    s.key(KeyCode::Char('n'));
    assert_eq!(s.mux.pane_count(), 2);
    assert_eq!(s.line(), "");

    s.prefix('x');
    s.key(KeyCode::Char('y'));
    assert_eq!(s.mux.pane_count(), 1);
    assert!(s.mux.is_last_pane());
    assert_eq!(s.prefix('x'), KeyAction::Detach);
    assert_eq!(s.mux.panes.len(), 1);
}

#[test]
fn test_windows_and_viewer() {
    let mut s = Session::new();
    s.prefix('c');
    s.prefix('c');
    assert_eq!(s.mux.windows.len(), 3);
    assert_eq!(s.mux.active_idx, 2);
    s.prefix('n');
    assert_eq!(s.mux.active_idx, 0);
    s.prefix('p');
    assert_eq!(s.mux.active_idx, 2);
    s.prefix('1');
    assert_eq!(s.mux.active_idx, 1);

    s.prefix('w');
    assert_eq!(s.mux.overlay(), Some(Overlay::WindowViewer { selected: 1 }));
    s.key(KeyCode::Char('j'));
    s.key(KeyCode::Char('j'));
    s.key(KeyCode::Enter);
    assert_eq!(s.mux.active_idx, 2);
    assert_eq!(s.mux.overlay(), None);

    // killing the only pane of a window drops the window
    s.prefix('x');
    s.key(KeyCode::Char('y'));
    assert_eq!(s.mux.windows.len(), 2);
    assert_eq!(s.mux.active_idx, 1);
}

#[test]
fn test_view_process_owns_keys() {
    let mut s = Session::new();
    s.type_str("view readme.txt");
    s.key(KeyCode::Enter);
    let pane = s.mux.active_pane().unwrap();
    assert_eq!(pane.mode(), PaneMode::Process);
    assert_eq!(s.screen()[0], "Welcome to shellmux.");

    s.key(KeyCode::Char('x'));
    assert_eq!(s.line(), "");
    s.key(KeyCode::Char('q'));
    assert_eq!(s.mux.active_pane().unwrap().mode(), PaneMode::Shell);
    assert_eq!(s.screen(), vec!["$"]);
}

#[test]
fn test_config_rebinds_keys() {
    let mut opts = Options::default();
    let errors = parse_config_content(&mut opts, "set -g prefix C-a\nbind | split-window -h\nunbind %\n");
    assert!(errors.is_empty());
    let mut s = Session::with(opts, Services::new(CommandHistory::new(10).shared()));
    assert_eq!(s.ctrl('b'), KeyAction::Passthrough);
    assert_eq!(s.ctrl('a'), KeyAction::ActivatePrefix);
    s.key(KeyCode::Char('%'));
    assert_eq!(s.mux.pane_count(), 1);
    s.ctrl('a');
    s.key(KeyCode::Char('|'));
    assert_eq!(s.mux.pane_count(), 2);
}

#[test]
fn test_history_shared_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let history = CommandHistory::with_store(10, Box::new(FileStore::new(dir.path()))).shared();
    let mut s = Session::with(Options::default(), Services::new(history));
    s.type_str("echo first");
    s.key(KeyCode::Enter);
    s.prefix('%');
    // the new pane browses the same history
    s.key(KeyCode::Up);
    assert_eq!(s.line(), "echo first");

    let reloaded = CommandHistory::with_store(10, Box::new(FileStore::new(dir.path())));
    assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["echo first"]);
}
