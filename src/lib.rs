//! A line-editing shell and a tmux-style multiplexer over virtual terminals.
//!
//! Everything runs on one thread: the host routes each key through
//! [`input::handle_key`], forwards passthrough keys to the active
//! [`pane::Pane`], and calls [`app::Multiplexer::tick`] and
//! [`app::Multiplexer::pump_all`] when idle.

pub mod app;
pub mod cli;
pub mod commands;
pub mod completion;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod input;
pub mod layout;
pub mod pane;
pub mod process;
pub mod shell;
pub mod terminal;
pub mod timer;
pub mod tree;
pub mod types;
pub mod vfs;
pub mod window_ops;

pub use error::{Error, Result};
