//! Keybind router: decides what a key means before any pane sees it.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, trace};

use crate::app::Multiplexer;
use crate::commands::execute_action;
use crate::config::normalize_key_for_binding;
use crate::pane::kill_active_pane;
use crate::types::*;
use crate::window_ops::select_window;

/// Chords the host environment keeps for itself: anything with the super
/// key, and Ctrl+Shift combinations (copy/paste in most terminals).
pub fn is_reserved(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::SUPER)
        || key.modifiers.contains(KeyModifiers::CONTROL | KeyModifiers::SHIFT)
}

/// Route one key. Priority: reserved chords, open overlay, armed prefix, the
/// prefix chord, then passthrough to the active pane.
pub fn handle_key(mux: &mut Multiplexer, key: KeyEvent) -> KeyAction {
    mux.tick();
    if key.kind == KeyEventKind::Release { return KeyAction::Handled; }
    if is_reserved(&key) { return KeyAction::Reserved; }

    let mode = mux.mode;
    let result = match mode {
        Mode::Overlay(overlay) => handle_overlay_key(mux, overlay, &key),
        Mode::Prefix => {
            // wait for the real command key
            if matches!(key.code, KeyCode::Modifier(_)) { return KeyAction::Handled; }
            mux.clear_prefix();
            match mux.options.bind_for((key.code, key.modifiers)) {
                Some(action) => execute_action(mux, &action),
                None => {
                    trace!(code = ?key.code, "unbound prefix key");
                    KeyAction::Handled
                }
            }
        }
        Mode::Passthrough => {
            if normalize_key_for_binding((key.code, key.modifiers)) == mux.options.prefix_key {
                mux.activate_prefix();
                KeyAction::ActivatePrefix
            } else {
                return KeyAction::Passthrough;
            }
        }
    };
    mux.notify();
    result
}

fn handle_overlay_key(mux: &mut Multiplexer, overlay: Overlay, key: &KeyEvent) -> KeyAction {
    match overlay {
        Overlay::WindowViewer { selected } => {
            let last = mux.windows.len().saturating_sub(1);
            match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    mux.mode = Mode::Overlay(Overlay::WindowViewer { selected: selected.saturating_sub(1) });
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    mux.mode = Mode::Overlay(Overlay::WindowViewer { selected: (selected + 1).min(last) });
                }
                KeyCode::Enter => {
                    mux.close_overlay();
                    select_window(mux, selected);
                }
                KeyCode::Esc | KeyCode::Char('q') => mux.close_overlay(),
                _ => {}
            }
            KeyAction::Handled
        }
        Overlay::KillPaneConfirm => {
            mux.close_overlay();
            if matches!(key.code, KeyCode::Char('y' | 'Y')) {
                debug!("kill-pane confirmed");
                if kill_active_pane(mux) == KillOutcome::LastPane { return KeyAction::Detach; }
            }
            KeyAction::Handled
        }
    }
}

/// Encode a key as the bytes a pane's line editor reads.
pub fn encode_key(key: &KeyEvent) -> Option<String> {
    let s = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte = match c.to_ascii_lowercase() {
                l @ 'a'..='z' => l as u8 - b'a' + 1,
                '@' | ' ' => 0,
                '[' => 0x1b,
                '\\' => 0x1c,
                ']' => 0x1d,
                '^' => 0x1e,
                '_' => 0x1f,
                _ => return None,
            };
            let ctrl = char::from(byte).to_string();
            if key.modifiers.contains(KeyModifiers::ALT) { format!("\x1b{ctrl}") } else { ctrl }
        }
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::ALT) => format!("\x1b{c}"),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "\r".into(),
        KeyCode::Tab => "\t".into(),
        KeyCode::BackTab => "\x1b[Z".into(),
        KeyCode::Backspace => "\x7f".into(),
        KeyCode::Esc => "\x1b".into(),
        KeyCode::Left => "\x1b[D".into(),
        KeyCode::Right => "\x1b[C".into(),
        KeyCode::Up => "\x1b[A".into(),
        KeyCode::Down => "\x1b[B".into(),
        KeyCode::Home => "\x1b[H".into(),
        KeyCode::End => "\x1b[F".into(),
        KeyCode::Delete => "\x1b[3~".into(),
        KeyCode::PageUp => "\x1b[5~".into(),
        KeyCode::PageDown => "\x1b[6~".into(),
        _ => return None,
    };
    Some(s)
}

/// Route a key and, when it passes through, deliver it to the active pane.
pub fn dispatch_key(mux: &mut Multiplexer, key: KeyEvent) -> KeyAction {
    let action = handle_key(mux, key);
    if action == KeyAction::Passthrough {
        if let Some(data) = encode_key(&key) { mux.send_to_active(&data); }
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::history::CommandHistory;
    use crate::pane::{create_window, split_active, Services};
    use crate::timer::ManualClock;
    use crossterm::event::ModifierKeyCode;
    use std::rc::Rc;
    use std::time::Duration;

    fn mux() -> (Multiplexer, ManualClock) {
        let clock = ManualClock::new();
        let services = Services::new(CommandHistory::new(20).shared());
        (Multiplexer::new(Options::default(), services, Rc::new(clock.clone()), (80, 24)), clock)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ch(c: char) -> KeyEvent {
        key(KeyCode::Char(c))
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_plain_keys_pass_through() {
        let (mut m, _) = mux();
        assert_eq!(handle_key(&mut m, ch('a')), KeyAction::Passthrough);
        assert_eq!(handle_key(&mut m, ctrl('r')), KeyAction::Passthrough);
    }

    #[test]
    fn test_reserved_chords() {
        let (mut m, _) = mux();
        let copy = KeyEvent::new(KeyCode::Char('C'), KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert_eq!(handle_key(&mut m, copy), KeyAction::Reserved);
        m.open_overlay(Overlay::KillPaneConfirm);
        assert_eq!(handle_key(&mut m, KeyEvent::new(KeyCode::Char('v'), KeyModifiers::SUPER)), KeyAction::Reserved);
        assert_eq!(m.overlay(), Some(Overlay::KillPaneConfirm));
    }

    #[test]
    fn test_prefix_then_split() {
        let (mut m, _) = mux();
        assert_eq!(handle_key(&mut m, ctrl('b')), KeyAction::ActivatePrefix);
        assert!(m.prefix_armed());
        assert_eq!(handle_key(&mut m, KeyEvent::new(KeyCode::Char('%'), KeyModifiers::SHIFT)), KeyAction::Handled);
        assert!(!m.prefix_armed());
        assert_eq!(m.pane_count(), 2);
        assert_eq!(handle_key(&mut m, ch('%')), KeyAction::Passthrough);
        assert_eq!(m.pane_count(), 2);
    }

    #[test]
    fn test_unknown_prefix_key_is_swallowed() {
        let (mut m, _) = mux();
        handle_key(&mut m, ctrl('b'));
        assert_eq!(handle_key(&mut m, ch('q')), KeyAction::Handled);
        assert_eq!(m.mode, Mode::Passthrough);
        assert_eq!(m.pane_count(), 1);
    }

    #[test]
    fn test_bare_modifier_keeps_prefix() {
        let (mut m, _) = mux();
        handle_key(&mut m, ctrl('b'));
        let shift = key(KeyCode::Modifier(ModifierKeyCode::LeftShift));
        assert_eq!(handle_key(&mut m, shift), KeyAction::Handled);
        assert!(m.prefix_armed());
    }

    #[test]
    fn test_prefix_timeout_passes_next_key() {
        let (mut m, clock) = mux();
        handle_key(&mut m, ctrl('b'));
        clock.advance(Duration::from_secs(2));
        assert_eq!(handle_key(&mut m, ch('c')), KeyAction::Passthrough);
        assert_eq!(m.windows.len(), 1);
    }

    #[test]
    fn test_prefix_detach_and_last_pane_kill() {
        let (mut m, _) = mux();
        handle_key(&mut m, ctrl('b'));
        assert_eq!(handle_key(&mut m, ch('d')), KeyAction::Detach);
        handle_key(&mut m, ctrl('b'));
        assert_eq!(handle_key(&mut m, ch('x')), KeyAction::Detach);
        assert_eq!(m.mode, Mode::Passthrough);
        assert_eq!(m.panes.len(), 1);
    }

    #[test]
    fn test_kill_confirm() {
        let (mut m, _) = mux();
        split_active(&mut m, LayoutKind::Vertical);
        handle_key(&mut m, ctrl('b'));
        handle_key(&mut m, ch('x'));
        assert_eq!(m.overlay(), Some(Overlay::KillPaneConfirm));
        assert_eq!(handle_key(&mut m, ch('n')), KeyAction::Handled);
        assert_eq!(m.overlay(), None);
        assert_eq!(m.pane_count(), 2);

        handle_key(&mut m, ctrl('b'));
        handle_key(&mut m, ch('x'));
        assert_eq!(handle_key(&mut m, ch('Y')), KeyAction::Handled);
        assert_eq!(m.pane_count(), 1);
        assert_eq!(m.active_pane_id(), PaneId(1));
    }

    #[test]
    fn test_confirmed_kill_of_last_pane_detaches() {
        let (mut m, _) = mux();
        m.open_overlay(Overlay::KillPaneConfirm);
        assert_eq!(handle_key(&mut m, ch('y')), KeyAction::Detach);
        assert_eq!(m.panes.len(), 1);
    }

    #[test]
    fn test_window_viewer() {
        let (mut m, _) = mux();
        create_window(&mut m);
        create_window(&mut m);
        handle_key(&mut m, ctrl('b'));
        handle_key(&mut m, ch('w'));
        assert_eq!(m.overlay(), Some(Overlay::WindowViewer { selected: 2 }));
        handle_key(&mut m, key(KeyCode::Down));
        assert_eq!(m.overlay(), Some(Overlay::WindowViewer { selected: 2 }));
        for _ in 0..4 { handle_key(&mut m, ch('k')); }
        assert_eq!(m.overlay(), Some(Overlay::WindowViewer { selected: 0 }));
        handle_key(&mut m, ch('j'));
        assert_eq!(handle_key(&mut m, ch('x')), KeyAction::Handled);
        assert_eq!(m.windows.len(), 3);
        handle_key(&mut m, key(KeyCode::Enter));
        assert_eq!(m.overlay(), None);
        assert_eq!(m.active_idx, 1);

        handle_key(&mut m, ctrl('b'));
        handle_key(&mut m, ch('w'));
        handle_key(&mut m, key(KeyCode::Up));
        handle_key(&mut m, key(KeyCode::Esc));
        assert_eq!(m.overlay(), None);
        assert_eq!(m.active_idx, 1);
    }

    #[test]
    fn test_custom_prefix() {
        let clock = ManualClock::new();
        let mut opts = Options::default();
        opts.prefix_key = (KeyCode::Char('a'), KeyModifiers::CONTROL);
        let services = Services::new(CommandHistory::new(20).shared());
        let mut m = Multiplexer::new(opts, services, Rc::new(clock), (80, 24));
        assert_eq!(handle_key(&mut m, ctrl('b')), KeyAction::Passthrough);
        assert_eq!(handle_key(&mut m, ctrl('a')), KeyAction::ActivatePrefix);
    }

    #[test]
    fn test_dispatch_types_into_pane() {
        let (mut m, _) = mux();
        for c in "echo hi".chars() { dispatch_key(&mut m, ch(c)); }
        dispatch_key(&mut m, key(KeyCode::Left));
        dispatch_key(&mut m, ctrl('k'));
        assert_eq!(m.active_pane().map(|p| p.input_line()), Some("echo h".to_string()));
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key(&ctrl('c')).as_deref(), Some("\x03"));
        assert_eq!(encode_key(&ctrl('R')).as_deref(), Some("\x12"));
        assert_eq!(encode_key(&KeyEvent::new(KeyCode::Char('b'), KeyModifiers::ALT)).as_deref(), Some("\x1bb"));
        assert_eq!(encode_key(&key(KeyCode::Delete)).as_deref(), Some("\x1b[3~"));
        assert_eq!(encode_key(&key(KeyCode::Home)).as_deref(), Some("\x1b[H"));
        assert_eq!(encode_key(&key(KeyCode::Backspace)).as_deref(), Some("\x7f"));
        assert_eq!(encode_key(&key(KeyCode::F(1))), None);
    }
}
