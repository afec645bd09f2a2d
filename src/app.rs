use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

use crate::config::Options;
use crate::pane::{create_window, Pane, Services};
use crate::timer::{Clock, ScheduledTask, SystemClock};
use crate::tree::count_panes;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxEvent {
    /// Windows, layout, mode or zoom changed; redraw the chrome.
    Changed,
}

/// The session: ordered windows, the panes they lay out, and the prefix and
/// overlay state machine.
pub struct Multiplexer {
    pub windows: Vec<Window>,
    pub active_idx: usize,
    pub panes: BTreeMap<PaneId, Pane>,
    pub mode: Mode,
    pub zoomed: Option<PaneId>,
    pub options: Options,
    pub services: Services,
    /// Terminal size in cells, shared out to panes by layout.
    pub size: (u16, u16),
    pub next_pane_id: u32,
    pub next_win_id: u32,
    prefix_timer: ScheduledTask,
    clock: Rc<dyn Clock>,
    subscribers: Vec<Sender<MuxEvent>>,
}

impl Multiplexer {
    /// Start a session with one window holding one pane. The options' prompt
    /// and scroll-back limit override those in `services`.
    pub fn new(options: Options, mut services: Services, clock: Rc<dyn Clock>, size: (u16, u16)) -> Self {
        services.prompt = options.prompt.clone();
        services.scrollback_limit = options.history_limit;
        let mut mux = Multiplexer {
            windows: Vec::new(),
            active_idx: 0,
            panes: BTreeMap::new(),
            mode: Mode::Passthrough,
            zoomed: None,
            options,
            services,
            size: (size.0.max(1), size.1.max(1)),
            next_pane_id: 1,
            next_win_id: 1,
            prefix_timer: ScheduledTask::default(),
            clock,
            subscribers: Vec::new(),
        };
        create_window(&mut mux);
        mux
    }

    pub fn with_system_clock(options: Options, services: Services, size: (u16, u16)) -> Self {
        Self::new(options, services, Rc::new(SystemClock), size)
    }

    pub fn active_window(&self) -> &Window {
        &self.windows[self.active_idx]
    }

    pub fn active_pane_id(&self) -> PaneId {
        self.active_window().active_pane
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.panes.get(&self.active_pane_id())
    }

    pub fn active_pane_mut(&mut self) -> Option<&mut Pane> {
        let id = self.active_pane_id();
        self.panes.get_mut(&id)
    }

    pub fn pane_count(&self) -> usize {
        count_panes(&self.active_window().root)
    }

    /// Sole pane of the sole window. Killing it means detaching.
    pub fn is_last_pane(&self) -> bool {
        self.windows.len() <= 1 && self.pane_count() <= 1
    }

    pub fn prefix_armed(&self) -> bool {
        self.mode == Mode::Prefix
    }

    pub fn overlay(&self) -> Option<Overlay> {
        match self.mode {
            Mode::Overlay(o) => Some(o),
            _ => None,
        }
    }

    /// Arm the prefix. Re-arming replaces the previous deadline.
    pub fn activate_prefix(&mut self) {
        self.mode = Mode::Prefix;
        self.prefix_timer.arm(self.clock.now(), self.options.prefix_timeout);
        debug!("prefix armed");
    }

    pub fn clear_prefix(&mut self) {
        self.prefix_timer.cancel();
        if self.mode == Mode::Prefix { self.mode = Mode::Passthrough; }
    }

    /// Expire the prefix if its deadline has passed. Call before routing each
    /// key and whenever the host's idle timer fires.
    pub fn tick(&mut self) -> bool {
        if self.prefix_timer.fire_if_due(self.clock.now()) && self.mode == Mode::Prefix {
            self.mode = Mode::Passthrough;
            debug!("prefix expired");
            self.notify();
            return true;
        }
        false
    }

    pub fn open_overlay(&mut self, overlay: Overlay) {
        self.prefix_timer.cancel();
        self.mode = Mode::Overlay(overlay);
    }

    pub fn close_overlay(&mut self) {
        if matches!(self.mode, Mode::Overlay(_)) { self.mode = Mode::Passthrough; }
    }

    /// Feed already-encoded key bytes to the active pane.
    pub fn send_to_active(&mut self, data: &str) {
        if let Some(pane) = self.active_pane_mut() { pane.handle_key_data(data); }
    }

    /// Let every pane drain its hosted process. Returns true if any output
    /// arrived.
    pub fn pump_all(&mut self) -> bool {
        let mut any = false;
        for pane in self.panes.values_mut() { any |= pane.pump(); }
        any
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.size = (cols.max(1), rows.max(1));
        crate::window_ops::resize_panes(self);
        self.notify();
    }

    pub fn subscribe(&mut self) -> Receiver<MuxEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn notify(&mut self) {
        self.subscribers.retain(|tx| tx.send(MuxEvent::Changed).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CommandHistory;
    use crate::pane::kill_active_pane;
    use crate::timer::ManualClock;
    use std::time::Duration;

    fn mux_with_clock() -> (Multiplexer, ManualClock) {
        let clock = ManualClock::new();
        let services = Services::new(CommandHistory::new(20).shared());
        let mux = Multiplexer::new(Options::default(), services, Rc::new(clock.clone()), (80, 24));
        (mux, clock)
    }

    #[test]
    fn test_initial_session() {
        let (mux, _) = mux_with_clock();
        assert_eq!(mux.windows.len(), 1);
        assert_eq!(mux.active_window().name, "shell");
        assert_eq!(mux.active_window().id.to_string(), "win-1");
        assert_eq!(mux.active_pane_id().to_string(), "pane-1");
        assert_eq!(mux.active_pane().map(|p| p.cwd()), Some("/"));
        assert!(mux.is_last_pane());
        assert_eq!(mux.mode, Mode::Passthrough);
    }

    #[test]
    fn test_prefix_expires_with_clock() {
        let (mut mux, clock) = mux_with_clock();
        mux.activate_prefix();
        clock.advance(Duration::from_millis(1999));
        assert!(!mux.tick());
        assert!(mux.prefix_armed());
        clock.advance(Duration::from_millis(1));
        assert!(mux.tick());
        assert_eq!(mux.mode, Mode::Passthrough);
        assert!(!mux.tick());
    }

    #[test]
    fn test_rearming_prefix_extends_deadline() {
        let (mut mux, clock) = mux_with_clock();
        mux.activate_prefix();
        clock.advance(Duration::from_millis(1500));
        mux.activate_prefix();
        clock.advance(Duration::from_millis(1500));
        assert!(!mux.tick());
        assert!(mux.prefix_armed());
    }

    #[test]
    fn test_overlay_cancels_prefix_timer() {
        let (mut mux, clock) = mux_with_clock();
        mux.activate_prefix();
        mux.open_overlay(Overlay::KillPaneConfirm);
        clock.advance(Duration::from_secs(5));
        assert!(!mux.tick());
        assert_eq!(mux.overlay(), Some(Overlay::KillPaneConfirm));
        mux.close_overlay();
        assert_eq!(mux.mode, Mode::Passthrough);
    }

    #[test]
    fn test_last_pane_is_not_killed() {
        let (mut mux, _) = mux_with_clock();
        assert_eq!(kill_active_pane(&mut mux), KillOutcome::LastPane);
        assert_eq!(mux.windows.len(), 1);
        assert_eq!(mux.panes.len(), 1);
    }

    #[test]
    fn test_options_reach_panes() {
        let mut opts = Options::default();
        opts.prompt = "> ".into();
        let services = Services::new(CommandHistory::new(20).shared());
        let mux = Multiplexer::new(opts, services, Rc::new(ManualClock::new()), (80, 24));
        assert_eq!(mux.active_pane().map(|p| p.prompt_text()), Some("> ".to_string()));
    }

    #[test]
    fn test_subscribers_pruned() {
        let (mut mux, _) = mux_with_clock();
        let rx = mux.subscribe();
        mux.notify();
        assert_eq!(rx.try_recv(), Ok(MuxEvent::Changed));
        drop(rx);
        mux.notify();
        assert!(mux.subscribers.is_empty());
    }
}
