//! Session snapshots as JSON or plain text.

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::app::Multiplexer;
use crate::format::{overlay_lines, status_line};
use crate::pane::Pane;
use crate::terminal::{row_text, Row};
use crate::tree::compute_rects;
use crate::types::*;
use crate::window_ops::compute_pane_rects;

#[derive(Debug, Serialize)]
pub struct SessionDump {
    pub active_window: usize,
    pub prefix: bool,
    pub overlay: Option<Overlay>,
    pub zoomed: Option<String>,
    pub windows: Vec<WindowDump>,
}

#[derive(Debug, Serialize)]
pub struct WindowDump {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub active_pane: String,
    pub layout: NodeDump,
    pub panes: Vec<PaneDump>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeDump {
    Leaf { pane: String },
    Split { direction: LayoutKind, ratio: f64, first: Box<NodeDump>, second: Box<NodeDump> },
}

#[derive(Debug, Serialize)]
pub struct PaneDump {
    pub id: String,
    pub mode: PaneMode,
    pub cwd: String,
    /// `None` while another pane of the window is zoomed.
    pub rect: Option<Rect>,
    pub cols: u16,
    pub rows: u16,
    pub input: String,
    pub cursor: usize,
    pub scrollback: Vec<String>,
    pub screen: Vec<String>,
}

fn dump_node(node: &Node) -> NodeDump {
    match node {
        Node::Leaf(id) => NodeDump::Leaf { pane: id.to_string() },
        Node::Split { kind, ratio, first, second } => NodeDump::Split {
            direction: *kind,
            ratio: *ratio,
            first: Box::new(dump_node(first)),
            second: Box::new(dump_node(second)),
        },
    }
}

fn rows_text(rows: &[Row]) -> Vec<String> {
    let mut lines: Vec<String> = rows.iter().map(|r| row_text(r)).collect();
    while lines.last().is_some_and(|l| l.is_empty()) { lines.pop(); }
    lines
}

fn dump_pane(pane: &Pane, rect: Option<Rect>) -> PaneDump {
    PaneDump {
        id: pane.id.to_string(),
        mode: pane.mode(),
        cwd: pane.cwd().to_string(),
        rect,
        cols: pane.engine().cols(),
        rows: pane.engine().rows(),
        input: pane.input_line(),
        cursor: pane.input_cursor(),
        scrollback: rows_text(pane.scrollback()),
        screen: rows_text(&pane.screen()),
    }
}

fn window_rects(mux: &Multiplexer, idx: usize) -> Vec<(PaneId, Rect)> {
    if idx == mux.active_idx { return compute_pane_rects(mux); }
    let mut rects = Vec::new();
    compute_rects(&mux.windows[idx].root, Rect::UNIT, &mut rects);
    rects
}

pub fn dump_session(mux: &Multiplexer) -> SessionDump {
    let windows = mux.windows.iter().enumerate().map(|(idx, win)| {
        let rects = window_rects(mux, idx);
        let mut ids = Vec::new();
        compute_rects(&win.root, Rect::UNIT, &mut ids);
        let panes = ids
            .iter()
            .filter_map(|(id, _)| mux.panes.get(id))
            .map(|p| dump_pane(p, rects.iter().find(|(id, _)| *id == p.id).map(|(_, r)| *r)))
            .collect();
        WindowDump {
            id: win.id.to_string(),
            name: win.name.clone(),
            active: idx == mux.active_idx,
            active_pane: win.active_pane.to_string(),
            layout: dump_node(&win.root),
            panes,
        }
    }).collect();
    SessionDump {
        active_window: mux.active_idx,
        prefix: mux.prefix_armed(),
        overlay: mux.overlay(),
        zoomed: mux.zoomed.map(|z| z.to_string()),
        windows,
    }
}

pub fn dump_layout_json(mux: &Multiplexer) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&dump_session(mux))
}

/// Human-readable snapshot: status line, open overlay, then each visible pane
/// of the active window with its scroll-back and screen.
pub fn dump_text<Tz: TimeZone>(mux: &Multiplexer, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    out.push_str(&status_line(mux, now, mux.size.0 as usize));
    out.push('\n');
    if let Some(lines) = overlay_lines(mux) {
        for line in lines { out.push_str(&format!("| {line}\n")); }
    }
    for (id, _) in compute_pane_rects(mux) {
        let Some(pane) = mux.panes.get(&id) else { continue };
        let marker = if id == mux.active_pane_id() { " (active)" } else { "" };
        out.push_str(&format!("--- {id}{marker} [{}] {}\n", pane.cwd(), mode_name(pane.mode())));
        for line in rows_text(pane.scrollback()).iter().chain(rows_text(&pane.screen()).iter()) {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn mode_name(mode: PaneMode) -> &'static str {
    match mode {
        PaneMode::Shell => "shell",
        PaneMode::Process => "process",
    }
}
