use tracing::debug;

use crate::app::Multiplexer;
use crate::tree::{compute_rects, contains_pane, find_pane_in_direction};
use crate::types::*;

/// Zoom the active pane, or un-zoom if it is the one already zoomed.
pub fn toggle_zoom(mux: &mut Multiplexer) {
    let active = mux.active_pane_id();
    mux.zoomed = if mux.zoomed == Some(active) { None } else { Some(active) };
    debug!(zoomed = ?mux.zoomed, "toggle zoom");
    resize_panes(mux);
}

/// Layout of the active window in unit coordinates. While zoomed this is the
/// zoomed pane alone, covering everything.
pub fn compute_pane_rects(mux: &Multiplexer) -> Vec<(PaneId, Rect)> {
    let win = mux.active_window();
    match mux.zoomed {
        Some(z) if contains_pane(&win.root, z) => vec![(z, Rect::UNIT)],
        _ => {
            let mut rects = Vec::new();
            compute_rects(&win.root, Rect::UNIT, &mut rects);
            rects
        }
    }
}

pub fn move_focus(mux: &mut Multiplexer, dir: FocusDir) {
    let rects = compute_pane_rects(mux);
    let from = mux.active_pane_id();
    if let Some(target) = find_pane_in_direction(&rects, from, dir) {
        mux.windows[mux.active_idx].active_pane = target;
        debug!(?dir, pane = %target, "focus moved");
    }
}

fn switch_to(mux: &mut Multiplexer, idx: usize) {
    mux.active_idx = idx;
    mux.zoomed = None;
    debug!(window = %mux.windows[idx].id, "switched window");
    resize_panes(mux);
}

pub fn next_window(mux: &mut Multiplexer) {
    if mux.windows.len() <= 1 { return; }
    switch_to(mux, (mux.active_idx + 1) % mux.windows.len());
}

pub fn prev_window(mux: &mut Multiplexer) {
    if mux.windows.len() <= 1 { return; }
    switch_to(mux, (mux.active_idx + mux.windows.len() - 1) % mux.windows.len());
}

/// Out-of-range indexes are ignored.
pub fn select_window(mux: &mut Multiplexer, idx: usize) {
    if idx < mux.windows.len() { switch_to(mux, idx); }
}

/// Convert a unit rect to a cell size, never smaller than one cell.
pub fn cell_size(rect: &Rect, size: (u16, u16)) -> (u16, u16) {
    let cols = (rect.width * size.0 as f64).round().max(1.0) as u16;
    let rows = (rect.height * size.1 as f64).round().max(1.0) as u16;
    (cols, rows)
}

/// Give every pane the share of the terminal its layout rect describes.
pub fn resize_panes(mux: &mut Multiplexer) {
    let mut sizes = Vec::new();
    for (idx, win) in mux.windows.iter().enumerate() {
        let mut rects = Vec::new();
        match mux.zoomed {
            Some(z) if idx == mux.active_idx && contains_pane(&win.root, z) => rects.push((z, Rect::UNIT)),
            _ => compute_rects(&win.root, Rect::UNIT, &mut rects),
        }
        sizes.extend(rects.iter().map(|(id, r)| (*id, cell_size(r, mux.size))));
    }
    for (id, (cols, rows)) in sizes {
        if let Some(pane) = mux.panes.get_mut(&id) { pane.resize(cols, rows); }
    }
}
