use std::env;
use std::io::{self, Read as _};
use std::process::ExitCode;
use std::rc::Rc;

use chrono::Local;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use shellmux::app::Multiplexer;
use shellmux::cli::{parse_script, Cli, Commands, ReplayStep};
use shellmux::config::{load_config, Options};
use shellmux::format::list_keys;
use shellmux::history::{CommandHistory, FileStore};
use shellmux::input::dispatch_key;
use shellmux::layout::{dump_layout_json, dump_text};
use shellmux::pane::Services;
use shellmux::timer::ManualClock;
use shellmux::types::{KeyAction, VERSION};
use shellmux::{Error, Result};

fn init_tracing() {
    let default = if env::var_os("SHELLMUX_DEBUG").is_some() { "shellmux=trace" } else { "shellmux=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shellmux: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut options = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.history_dir.clone() { options.history_dir = Some(dir); }
    info!(version = VERSION, "shellmux starting");

    match &cli.command {
        Commands::ListKeys => {
            for line in list_keys(&options) { println!("{line}"); }
            Ok(())
        }
        Commands::Replay { script, json } => replay(&cli, options, script, *json),
    }
}

fn open_history(cli: &Cli, options: &Options) -> CommandHistory {
    let cap = options.command_history_limit;
    if cli.no_history { return CommandHistory::new(cap); }
    let dir = options.history_dir.clone().unwrap_or_else(FileStore::default_dir);
    debug!(dir = %dir.display(), "command history");
    CommandHistory::with_store(cap, Box::new(FileStore::new(dir)))
}

fn read_script(script: &str) -> Result<String> {
    let read_err = |source| Error::ScriptRead { path: script.to_string(), source };
    if script == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map_err(read_err)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(script).map_err(read_err)
    }
}

fn replay(cli: &Cli, options: Options, script: &str, json: bool) -> Result<()> {
    let steps = parse_script(&read_script(script)?)?;
    let history = open_history(cli, &options).shared();
    let clock = ManualClock::new();
    let mut mux = Multiplexer::new(options, Services::new(history), Rc::new(clock.clone()), cli.size);

    let mut detached = false;
    for step in steps {
        match step {
            ReplayStep::Sleep(d) => {
                clock.advance(d);
                mux.tick();
            }
            ReplayStep::Key(key) => {
                if dispatch_key(&mut mux, key) == KeyAction::Detach {
                    info!("detached");
                    detached = true;
                }
            }
        }
        mux.pump_all();
        if detached { break; }
    }

    if json {
        println!("{}", dump_layout_json(&mux)?);
    } else {
        print!("{}", dump_text(&mux, &Local::now()));
        if detached { println!("[detached]"); }
    }
    Ok(())
}
