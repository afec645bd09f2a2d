use crate::types::*;

/// Partition `area` among the leaves of `node`, appending one rect per pane in
/// depth-first (first child before second) order.
pub fn compute_rects(node: &Node, area: Rect, out: &mut Vec<(PaneId, Rect)>) {
    match node {
        Node::Leaf(id) => out.push((*id, area)),
        Node::Split { kind, ratio, first, second } => {
            let (a, b) = split_rect(*kind, *ratio, area);
            compute_rects(first, a, out);
            compute_rects(second, b, out);
        }
    }
}

/// Split a rect at `ratio`. The second half takes the remainder so the two
/// always add back up to the original extent.
pub fn split_rect(kind: LayoutKind, ratio: f64, area: Rect) -> (Rect, Rect) {
    match kind {
        LayoutKind::Vertical => {
            let w = area.width * ratio;
            (
                Rect { x: area.x, y: area.y, width: w, height: area.height },
                Rect { x: area.x + w, y: area.y, width: area.width - w, height: area.height },
            )
        }
        LayoutKind::Horizontal => {
            let h = area.height * ratio;
            (
                Rect { x: area.x, y: area.y, width: area.width, height: h },
                Rect { x: area.x, y: area.y + h, width: area.width, height: area.height - h },
            )
        }
    }
}

/// Nearest pane whose center lies strictly on the `dir` side of `from`'s
/// center, by Manhattan distance between centers. Ties keep the earlier rect.
pub fn find_pane_in_direction(rects: &[(PaneId, Rect)], from: PaneId, dir: FocusDir) -> Option<PaneId> {
    let (_, from_rect) = rects.iter().find(|(id, _)| *id == from)?;
    let (fx, fy) = from_rect.center();
    let mut best: Option<(PaneId, f64)> = None;
    for (id, r) in rects.iter() {
        if *id == from { continue; }
        let (cx, cy) = r.center();
        let valid = match dir {
            FocusDir::Left => cx < fx,
            FocusDir::Right => cx > fx,
            FocusDir::Up => cy < fy,
            FocusDir::Down => cy > fy,
        };
        if !valid { continue; }
        let dist = (cx - fx).abs() + (cy - fy).abs();
        if best.map_or(true, |(_, d)| dist < d) { best = Some((*id, dist)); }
    }
    best.map(|(id, _)| id)
}

/// Return a copy of `root` with the leaf for `target` replaced by `replacement`.
pub fn replace_node(root: &Node, target: PaneId, replacement: &Node) -> Node {
    match root {
        Node::Leaf(id) if *id == target => replacement.clone(),
        Node::Leaf(_) => root.clone(),
        Node::Split { kind, ratio, first, second } => Node::split(
            *kind,
            *ratio,
            replace_node(first, target, replacement),
            replace_node(second, target, replacement),
        ),
    }
}

/// Return a copy of `root` without `pane`. The split that held the pane
/// collapses into its other child; removing the only leaf yields `None`.
pub fn remove_pane(root: &Node, pane: PaneId) -> Option<Node> {
    match root {
        Node::Leaf(id) if *id == pane => None,
        Node::Leaf(_) => Some(root.clone()),
        Node::Split { kind, ratio, first, second } => {
            if !contains_pane(first, pane) && !contains_pane(second, pane) {
                return Some(root.clone());
            }
            match (remove_pane(first, pane), remove_pane(second, pane)) {
                (None, Some(rest)) | (Some(rest), None) => Some(rest),
                (Some(a), Some(b)) => Some(Node::split(*kind, *ratio, a, b)),
                (None, None) => None,
            }
        }
    }
}

pub fn contains_pane(node: &Node, pane: PaneId) -> bool {
    match node {
        Node::Leaf(id) => *id == pane,
        Node::Split { first, second, .. } => contains_pane(first, pane) || contains_pane(second, pane),
    }
}

/// Pane ids in depth-first order.
pub fn collect_pane_ids(node: &Node) -> Vec<PaneId> {
    fn rec(node: &Node, ids: &mut Vec<PaneId>) {
        match node {
            Node::Leaf(id) => ids.push(*id),
            Node::Split { first, second, .. } => {
                rec(first, ids);
                rec(second, ids);
            }
        }
    }
    let mut ids = Vec::new();
    rec(node, &mut ids);
    ids
}

pub fn first_leaf(node: &Node) -> PaneId {
    match node {
        Node::Leaf(id) => *id,
        Node::Split { first, .. } => first_leaf(first),
    }
}

/// Count the number of leaf (pane) nodes in a tree.
pub fn count_panes(node: &Node) -> usize {
    match node {
        Node::Leaf(_) => 1,
        Node::Split { first, second, .. } => count_panes(first) + count_panes(second),
    }
}
