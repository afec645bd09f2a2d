use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, warn};

use crate::app::Multiplexer;
use crate::commands::{parse_command_line, CommandContext, CommandRegistry, CommandStatus};
use crate::completion::{complete, Completion, CompletionEnv};
use crate::history::SharedHistory;
use crate::process::{self, HostedProcess, ProcessConfig, ProcessEvent, ProcessRegistry};
use crate::shell::{Shell, ShellHost};
use crate::terminal::{rows_to_capture, Cursor, Row, TerminalEngine, TerminalWriter, Vt100Engine};
use crate::tree::{first_leaf, remove_pane, replace_node, collect_pane_ids};
use crate::types::*;
use crate::vfs::{FileSystem, MemFs};

pub type EngineFactory = Rc<dyn Fn(u16, u16) -> Box<dyn TerminalEngine>>;

/// Everything a pane needs from the outside world, built once by the host
/// and cloned into every pane.
#[derive(Clone)]
pub struct Services {
    pub commands: Rc<CommandRegistry>,
    pub processes: Rc<ProcessRegistry>,
    pub fs: Rc<RefCell<dyn FileSystem>>,
    pub history: SharedHistory,
    pub engine_factory: EngineFactory,
    /// Scroll-back rows kept per pane.
    pub scrollback_limit: usize,
    pub prompt: String,
}

impl Services {
    /// Builtin commands and processes, the default in-memory tree and vt100
    /// terminals.
    pub fn new(history: SharedHistory) -> Self {
        Self {
            commands: Rc::new(CommandRegistry::with_builtins()),
            processes: Rc::new(ProcessRegistry::with_builtins()),
            fs: Rc::new(RefCell::new(MemFs::with_default_tree())),
            history,
            engine_factory: Rc::new(|cols: u16, rows: u16| -> Box<dyn TerminalEngine> { Box::new(Vt100Engine::new(cols, rows)) }),
            scrollback_limit: 2000,
            prompt: "$ ".to_string(),
        }
    }

    /// Builtin command names followed by hosted process names.
    pub fn command_names(&self) -> Vec<String> {
        let mut names = self.commands.names();
        for name in self.processes.names() {
            if !names.contains(&name) { names.push(name); }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneEvent {
    InputChanged { line: String, cursor: usize },
    ScrollbackChanged,
    ModeChanged(PaneMode),
}

/// One terminal session: a line editor over a virtual terminal, plus the
/// rows that have scrolled out of it.
pub struct Pane {
    pub id: PaneId,
    pub window: WindowId,
    mode: PaneMode,
    cwd: String,
    scrollback: Vec<Row>,
    shell: Shell,
    engine: Box<dyn TerminalEngine>,
    services: Services,
    process: Option<Box<dyn HostedProcess>>,
    process_name: Option<String>,
    process_rx: Option<Receiver<ProcessEvent>>,
    subscribers: Vec<Sender<PaneEvent>>,
}

/// Writes command output straight into the terminal engine.
struct EngineWriter<'a>(&'a mut Box<dyn TerminalEngine>);

impl TerminalWriter for EngineWriter<'_> {
    fn write(&mut self, data: &str) {
        self.0.write(data);
    }
}

/// The pane as seen by its line editor.
struct PaneHost<'a> {
    cwd: &'a mut String,
    scrollback: &'a mut Vec<Row>,
    engine: &'a mut Box<dyn TerminalEngine>,
    services: &'a Services,
    launch: Option<(String, Vec<String>)>,
    scrollback_changed: bool,
}

impl TerminalWriter for PaneHost<'_> {
    fn write(&mut self, data: &str) {
        self.engine.write(data);
    }
}

impl ShellHost for PaneHost<'_> {
    /// Move what is on screen into scroll-back and start from a clean screen.
    fn before_prompt(&mut self) {
        let captured = rows_to_capture(self.engine.as_ref());
        if !captured.is_empty() {
            self.scrollback.extend(captured);
            let excess = self.scrollback.len().saturating_sub(self.services.scrollback_limit);
            self.scrollback.drain(..excess);
            self.scrollback_changed = true;
        }
        self.engine.clear();
    }

    fn execute(&mut self, line: &str) -> CommandStatus {
        let args = parse_command_line(line);
        let Some((name, rest)) = args.split_first() else { return CommandStatus::Continue };
        if let Some(cmd) = self.services.commands.get(name) {
            let programs = self.services.processes.names();
            let mut ctx = CommandContext {
                cwd: &mut *self.cwd,
                fs: &*self.services.fs,
                history: &self.services.history,
                commands: &self.services.commands,
                programs: &programs,
                clear_scrollback: false,
            };
            let status = (cmd.handler)(rest, &mut EngineWriter(&mut *self.engine), &mut ctx);
            if ctx.clear_scrollback {
                self.clear_scrollback();
            }
            return status;
        }
        if self.services.processes.get(name).is_some() {
            self.launch = Some((name.clone(), rest.to_vec()));
            return CommandStatus::SuppressPrompt;
        }
        self.engine.write(&format!("{name}: command not found\r\n"));
        CommandStatus::Continue
    }

    fn complete(&mut self, before_cursor: &str) -> Completion {
        let names = self.services.command_names();
        let fs = self.services.fs.borrow();
        let env = CompletionEnv { command_names: &names, fs: &*fs, cwd: self.cwd.as_str() };
        complete(before_cursor, &env)
    }

    fn clear_scrollback(&mut self) {
        self.scrollback.clear();
        self.scrollback_changed = true;
    }
}

impl Pane {
    /// Create a pane and print its first prompt.
    pub fn new(id: PaneId, window: WindowId, cwd: &str, cols: u16, rows: u16, services: Services) -> Self {
        let engine = (services.engine_factory)(cols, rows);
        let shell = Shell::new(services.history.clone(), &services.prompt);
        let mut pane = Pane {
            id,
            window,
            mode: PaneMode::Shell,
            cwd: cwd.to_string(),
            scrollback: Vec::new(),
            shell,
            engine,
            services,
            process: None,
            process_name: None,
            process_rx: None,
            subscribers: Vec::new(),
        };
        let (shell, mut host) = pane.split_host();
        shell.print_prompt(&mut host);
        pane
    }

    fn split_host(&mut self) -> (&mut Shell, PaneHost<'_>) {
        let Pane { shell, engine, cwd, scrollback, services, .. } = self;
        let host = PaneHost { cwd, scrollback, engine, services, launch: None, scrollback_changed: false };
        (shell, host)
    }

    pub fn mode(&self) -> PaneMode {
        self.mode
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn scrollback(&self) -> &[Row] {
        &self.scrollback
    }

    pub fn input_line(&self) -> String {
        self.shell.line()
    }

    pub fn input_cursor(&self) -> usize {
        self.shell.cursor()
    }

    pub fn prompt_text(&self) -> String {
        self.shell.prompt_text()
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn engine(&self) -> &dyn TerminalEngine {
        self.engine.as_ref()
    }

    pub fn screen(&self) -> Vec<Row> {
        (0..self.engine.rows()).map(|r| self.engine.line(r)).collect()
    }

    pub fn cursor(&self) -> Cursor {
        self.engine.cursor()
    }

    pub fn process_name(&self) -> Option<&str> {
        self.process_name.as_deref()
    }

    /// Feed key bytes. In `process` mode the hosted process gets them all;
    /// otherwise they go through the line editor one character at a time.
    pub fn handle_key_data(&mut self, data: &str) {
        let before = (self.shell.line(), self.shell.cursor());
        let mut scrollback_changed = false;
        for (i, c) in data.char_indices() {
            if self.mode == PaneMode::Process {
                if let Some(p) = self.process.as_mut() { p.write(&data[i..]); }
                self.pump();
                break;
            }
            let (shell, mut host) = self.split_host();
            shell.handle(c, &mut host);
            let launch = host.launch.take();
            scrollback_changed |= host.scrollback_changed;
            if let Some((name, args)) = launch {
                self.run_process(&name, &args);
            }
        }
        if scrollback_changed { self.publish(PaneEvent::ScrollbackChanged); }
        let after = (self.shell.line(), self.shell.cursor());
        if after != before {
            self.publish(PaneEvent::InputChanged { line: after.0, cursor: after.1 });
        }
    }

    /// Start the hosted process `name` in this pane. On start failure the pane
    /// goes back to the shell with the error printed and a fresh prompt.
    pub fn run_process(&mut self, name: &str, args: &[String]) {
        let Some(factory) = self.services.processes.get(name) else { return };
        let mut env = BTreeMap::new();
        if let Some(first) = args.first() {
            let fs = self.services.fs.borrow();
            let resolved = fs.resolve_path(&self.cwd, first);
            if let Some(content) = fs.read_file(&resolved) {
                env.insert("FILE_CONTENT".to_string(), content);
            }
            env.insert("VFS_PATH".to_string(), resolved);
        }
        let (events, rx) = process::channel();
        let config = ProcessConfig {
            args: args.to_vec(),
            env,
            cwd: self.cwd.clone(),
            cols: self.engine.cols(),
            rows: self.engine.rows(),
        };
        let mut proc = factory(config, events);
        self.set_mode(PaneMode::Process);
        match proc.start() {
            Ok(()) => {
                debug!(pane = %self.id, name, "process started");
                self.process = Some(proc);
                self.process_name = Some(name.to_string());
                self.process_rx = Some(rx);
                self.pump();
            }
            Err(e) => {
                warn!(pane = %self.id, "{e}");
                proc.terminate();
                self.set_mode(PaneMode::Shell);
                self.engine.write(&format!("{e}\r\n"));
                self.rearm_prompt();
            }
        }
    }

    /// Drain pending process output and exit notifications. Returns true if
    /// anything arrived.
    pub fn pump(&mut self) -> bool {
        let Some(rx) = self.process_rx.as_ref() else { return false };
        let events: Vec<ProcessEvent> = rx.try_iter().collect();
        let any = !events.is_empty();
        for event in events {
            match event {
                ProcessEvent::Output(data) => self.engine.write(&data),
                ProcessEvent::Exit(code) => {
                    debug!(pane = %self.id, code, "process exited");
                    self.finish_process();
                    break;
                }
            }
        }
        any
    }

    fn finish_process(&mut self) {
        self.process = None;
        self.process_name = None;
        self.process_rx = None;
        self.set_mode(PaneMode::Shell);
        self.rearm_prompt();
    }

    fn rearm_prompt(&mut self) {
        let (shell, mut host) = self.split_host();
        host.before_prompt();
        shell.print_prompt(&mut host);
        if host.scrollback_changed { self.publish(PaneEvent::ScrollbackChanged); }
    }

    fn set_mode(&mut self, mode: PaneMode) {
        if self.mode != mode {
            self.mode = mode;
            self.publish(PaneEvent::ModeChanged(mode));
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if (self.engine.cols(), self.engine.rows()) == (cols, rows) { return; }
        self.engine.resize(cols, rows);
        if let Some(p) = self.process.as_mut() { p.resize(cols, rows); }
        self.pump();
    }

    /// Stop any hosted process and drop all subscribers.
    pub fn dispose(&mut self) {
        if let Some(mut p) = self.process.take() { p.terminate(); }
        self.process_rx = None;
        self.subscribers.clear();
    }

    pub fn subscribe(&mut self) -> Receiver<PaneEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: PaneEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn new_pane(mux: &mut Multiplexer, window: WindowId, cwd: &str) -> PaneId {
    let id = PaneId(mux.next_pane_id);
    mux.next_pane_id += 1;
    let (cols, rows) = mux.size;
    let pane = Pane::new(id, window, cwd, cols, rows, mux.services.clone());
    mux.panes.insert(id, pane);
    id
}

/// Append a window with one fresh pane and make it active.
pub fn create_window(mux: &mut Multiplexer) {
    let win_id = WindowId(mux.next_win_id);
    mux.next_win_id += 1;
    let cwd = mux.options.default_path.clone();
    let pane = new_pane(mux, win_id, &cwd);
    mux.windows.push(Window { id: win_id, name: mux.options.default_window_name.clone(), root: Node::Leaf(pane), active_pane: pane });
    mux.active_idx = mux.windows.len() - 1;
    mux.zoomed = None;
    debug!(window = %win_id, pane = %pane, "created window");
    crate::window_ops::resize_panes(mux);
}

/// Split the active pane in two. The new pane takes the second half, starts
/// in the old pane's directory, and becomes active.
pub fn split_active(mux: &mut Multiplexer, kind: LayoutKind) {
    let win_id = mux.windows[mux.active_idx].id;
    let old = mux.windows[mux.active_idx].active_pane;
    let cwd = mux.panes.get(&old).map(|p| p.cwd().to_string()).unwrap_or_else(|| mux.options.default_path.clone());
    mux.zoomed = None;
    let new = new_pane(mux, win_id, &cwd);
    let win = &mut mux.windows[mux.active_idx];
    let split = Node::split(kind, 0.5, Node::Leaf(old), Node::Leaf(new));
    win.root = replace_node(&win.root, old, &split);
    win.active_pane = new;
    debug!(?kind, from = %old, pane = %new, "split pane");
    crate::window_ops::resize_panes(mux);
}

/// Kill the active pane. The sole pane of the sole window is left alone and
/// reported as [`KillOutcome::LastPane`]; the caller decides to detach.
pub fn kill_active_pane(mux: &mut Multiplexer) -> KillOutcome {
    if mux.is_last_pane() { return KillOutcome::LastPane; }
    let idx = mux.active_idx;
    let victim = mux.windows[idx].active_pane;
    mux.zoomed = None;
    let outcome = match remove_pane(&mux.windows[idx].root, victim) {
        Some(rest) => {
            let win = &mut mux.windows[idx];
            win.active_pane = first_leaf(&rest);
            win.root = rest;
            KillOutcome::PaneRemoved
        }
        None => {
            let win = mux.windows.remove(idx);
            for id in collect_pane_ids(&win.root) {
                if let Some(mut p) = mux.panes.remove(&id) { p.dispose(); }
            }
            if mux.active_idx >= mux.windows.len() { mux.active_idx = mux.windows.len() - 1; }
            KillOutcome::WindowRemoved
        }
    };
    if let Some(mut p) = mux.panes.remove(&victim) { p.dispose(); }
    debug!(pane = %victim, ?outcome, "killed pane");
    crate::window_ops::resize_panes(mux);
    outcome
}
