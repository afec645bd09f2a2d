//! Status line and overlay text.

use chrono::{DateTime, TimeZone};
use unicode_width::UnicodeWidthStr;

use crate::app::Multiplexer;
use crate::commands::format_action;
use crate::config::{format_key_binding, Options};
use crate::tree::count_panes;
use crate::types::*;

pub const VIEWER_HEADER: &str = "Choose window (Enter=select, q=cancel)";
pub const KILL_CONFIRM_TEXT: &str = "kill-pane? (y/n)";

/// `[0] 0:shell* 1:shell`, with ` (Z)` after the active window when zoomed.
pub fn status_left(mux: &Multiplexer) -> String {
    let mut out = String::from("[0]");
    for (i, win) in mux.windows.iter().enumerate() {
        out.push_str(&format!(" {}:{}", i, win.name));
        if i == mux.active_idx {
            out.push('*');
            if mux.zoomed.is_some() { out.push_str(" (Z)"); }
        }
    }
    out
}

pub fn status_right<Tz: TimeZone>(mux: &Multiplexer, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let time = now.format("%H:%M").to_string();
    if mux.prefix_armed() { format!("[PREFIX] {time}") } else { time }
}

/// Left and right parts padded apart to `width` columns. The left part is
/// cut when both do not fit.
pub fn status_line<Tz: TimeZone>(mux: &Multiplexer, now: &DateTime<Tz>, width: usize) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let left = status_left(mux);
    let right = status_right(mux, now);
    let room = width.saturating_sub(right.width());
    let left = truncate_to_width(&left, room);
    let gap = width.saturating_sub(left.width() + right.width());
    format!("{left}{}{right}", " ".repeat(gap))
}

fn truncate_to_width(s: &str, width: usize) -> String {
    let mut out = String::new();
    for c in s.chars() {
        let next = format!("{out}{c}");
        if next.width() > width { break; }
        out = next;
    }
    out
}

pub fn window_viewer_lines(mux: &Multiplexer, selected: usize) -> Vec<String> {
    let mut lines = vec![VIEWER_HEADER.to_string()];
    for (i, win) in mux.windows.iter().enumerate() {
        let n = count_panes(&win.root);
        lines.push(format!(
            "{} {}: {}{} ({} pane{})",
            if i == selected { '>' } else { ' ' },
            i,
            win.name,
            if i == mux.active_idx { " *" } else { "" },
            n,
            if n == 1 { "" } else { "s" },
        ));
    }
    lines
}

/// Text of the open overlay, if any.
pub fn overlay_lines(mux: &Multiplexer) -> Option<Vec<String>> {
    match mux.overlay()? {
        Overlay::WindowViewer { selected } => Some(window_viewer_lines(mux, selected)),
        Overlay::KillPaneConfirm => Some(vec![KILL_CONFIRM_TEXT.to_string()]),
    }
}

/// `bind-key -T prefix <key> <command>` for every binding, in tmux's
/// `list-keys` form.
pub fn list_keys(opts: &Options) -> Vec<String> {
    let mut lines = vec![format!("set -g prefix {}", format_key_binding(&opts.prefix_key))];
    lines.extend(opts.binds.iter().map(|b| {
        format!("bind-key -T prefix {:<6} {}", format_key_binding(&b.key), format_action(&b.action))
    }));
    lines
}
