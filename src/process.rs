//! Hosted processes: programs that take over a pane's input and output until
//! they exit.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::trace;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(String),
    Exit(i32),
}

/// Handle a process uses to report output and exit back to its pane.
#[derive(Debug, Clone)]
pub struct ProcessEvents {
    tx: Sender<ProcessEvent>,
}

impl ProcessEvents {
    pub fn output(&self, data: impl Into<String>) {
        // The pane may already be gone.
        let _ = self.tx.send(ProcessEvent::Output(data.into()));
    }

    pub fn exit(&self, code: i32) {
        let _ = self.tx.send(ProcessEvent::Exit(code));
    }
}

pub fn channel() -> (ProcessEvents, Receiver<ProcessEvent>) {
    let (tx, rx) = mpsc::channel();
    (ProcessEvents { tx }, rx)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessConfig {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
}

pub trait HostedProcess {
    fn start(&mut self) -> Result<()>;
    fn write(&mut self, data: &str);
    fn resize(&mut self, cols: u16, rows: u16);
    fn terminate(&mut self);
}

pub type ProcessFactory = Rc<dyn Fn(ProcessConfig, ProcessEvents) -> Box<dyn HostedProcess>>;

/// Named process factories, kept in registration order.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    factories: Vec<(String, ProcessFactory)>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("view", Pager::factory());
        reg
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: ProcessFactory) {
        match self.factories.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = factory,
            None => self.factories.push((name.to_string(), factory)),
        }
    }

    pub fn get(&self, name: &str) -> Option<ProcessFactory> {
        self.factories.iter().find(|(n, _)| n == name).map(|(_, f)| f.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|(n, _)| n.clone()).collect()
    }
}

/// `view <file>`: a read-only pager. `j`/`k`/arrows scroll a line, space
/// pages forward, `q` quits.
pub struct Pager {
    path: String,
    lines: Vec<String>,
    top: usize,
    cols: u16,
    rows: u16,
    events: ProcessEvents,
    content: Option<String>,
    running: bool,
}

impl Pager {
    pub fn new(config: ProcessConfig, events: ProcessEvents) -> Self {
        Self {
            path: config.env.get("VFS_PATH").cloned().unwrap_or_default(),
            lines: Vec::new(),
            top: 0,
            cols: config.cols.max(1),
            rows: config.rows.max(2),
            events,
            content: config.env.get("FILE_CONTENT").cloned(),
            running: false,
        }
    }

    pub fn factory() -> ProcessFactory {
        Rc::new(|config: ProcessConfig, events: ProcessEvents| -> Box<dyn HostedProcess> {
            Box::new(Pager::new(config, events))
        })
    }

    fn body_rows(&self) -> usize {
        self.rows as usize - 1
    }

    fn max_top(&self) -> usize {
        self.lines.len().saturating_sub(self.body_rows())
    }

    fn render(&self) {
        let mut out = String::from("\x1b[2J\x1b[H");
        let shown = self.lines.iter().skip(self.top).take(self.body_rows());
        for (i, line) in shown.enumerate() {
            if i > 0 { out.push_str("\r\n"); }
            out.extend(line.chars().take(self.cols as usize));
        }
        let status: String = format!("-- {} ({}/{}) q to quit --", self.path, self.top + 1, self.lines.len().max(1))
            .chars()
            .take(self.cols as usize)
            .collect();
        out.push_str(&format!("\x1b[{};1H\x1b[7m{}\x1b[0m", self.rows, status));
        self.events.output(out);
    }

    fn scroll(&mut self, delta: isize) {
        let top = (self.top as isize + delta).clamp(0, self.max_top() as isize) as usize;
        if top != self.top {
            self.top = top;
            self.render();
        }
    }

    fn quit(&mut self) {
        self.running = false;
        self.events.output("\x1b[2J\x1b[H");
        self.events.exit(0);
    }
}

impl HostedProcess for Pager {
    fn start(&mut self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::ProcessStart { name: "view".into(), reason: "missing file operand".into() });
        }
        let Some(content) = self.content.take() else {
            return Err(Error::ProcessStart { name: "view".into(), reason: format!("{}: cannot read file", self.path) });
        };
        self.lines = content.lines().map(str::to_string).collect();
        self.running = true;
        self.render();
        Ok(())
    }

    fn write(&mut self, data: &str) {
        if !self.running { return; }
        trace!(len = data.len(), "pager input");
        let page = self.body_rows() as isize;
        let mut rest = data;
        while !rest.is_empty() {
            if let Some(r) = rest.strip_prefix("\x1b[A") { self.scroll(-1); rest = r; continue; }
            if let Some(r) = rest.strip_prefix("\x1b[B") { self.scroll(1); rest = r; continue; }
            let mut chars = rest.chars();
            let Some(c) = chars.next() else { break };
            rest = chars.as_str();
            match c {
                'q' => { self.quit(); return; }
                'j' | '\r' => self.scroll(1),
                'k' => self.scroll(-1),
                ' ' => self.scroll(page),
                'b' => self.scroll(-page),
                _ => {}
            }
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols.max(1);
        self.rows = rows.max(2);
        self.top = self.top.min(self.max_top());
        if self.running { self.render(); }
    }

    fn terminate(&mut self) {
        self.running = false;
    }
}
