use std::fmt;

use crossterm::event::{KeyCode, KeyModifiers};
use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PaneId(pub u32);

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "win-{}", self.0)
    }
}

/// Axis of a split. `Vertical` puts the children left/right, `Horizontal`
/// stacks them top/bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind { Horizontal, Vertical }

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(PaneId),
    Split { kind: LayoutKind, ratio: f64, first: Box<Node>, second: Box<Node> },
}

impl Node {
    pub fn split(kind: LayoutKind, ratio: f64, first: Node, second: Node) -> Node {
        Node::Split { kind, ratio, first: Box::new(first), second: Box::new(second) }
    }
}

/// Normalized rectangle, fractions of the window area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const UNIT: Rect = Rect { x: 0.0, y: 0.0, width: 1.0, height: 1.0 };

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusDir { Left, Right, Up, Down }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneMode { Shell, Process }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Overlay {
    WindowViewer { selected: usize },
    KillPaneConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Passthrough,
    Prefix,
    Overlay(Overlay),
}

pub struct Window {
    pub id: WindowId,
    pub name: String,
    pub root: Node,
    pub active_pane: PaneId,
}

/// Commands reachable from the prefix key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Left/right split (tmux `split-window -h`).
    SplitVertical,
    /// Top/bottom split (tmux `split-window -v`).
    SplitHorizontal,
    MoveFocus(FocusDir),
    NewWindow,
    NextWindow,
    PrevWindow,
    SelectWindow(usize),
    WindowChooser,
    KillPane,
    ZoomPane,
    Detach,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bind { pub key: (KeyCode, KeyModifiers), pub action: Action }

/// What the host should do with a key after routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Forward to the active pane (or its hosted process).
    Passthrough,
    /// Host-level chord; neither the multiplexer nor the pane sees it.
    Reserved,
    Handled,
    ActivatePrefix,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    PaneRemoved,
    WindowRemoved,
    /// Sole pane of the sole window; nothing was touched.
    LastPane,
}
