//! Dual-pane terminal file manager.
//!
//! Wires the renderer, the async input pump and the [`LayerStack`] together
//! and drives the steady-state loop described in spec §2: the backend
//! produces input events, the router forwards them to the top layer, the
//! main loop renders dirty layers, the renderer flushes the grid.

mod app;
mod config;
mod core;
mod shell;
mod storage;
mod ui;

use std::io::IsTerminal;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::app::event::{spawn_event_reader, AppEvent, SystemKind};
use crate::app::main_screen::MainScreen;
use crate::app::state::AppState;
use crate::config::AppConfig;
use crate::core::log::{LogLevel, LogSource, TracingBridge};
use crate::shell::integration;
use crate::storage::Location;
use crate::ui::layer::LayerStack;
use crate::ui::renderer::{Renderer, TerminalRenderer};

/// CLI surface of the wrapping program (spec §6) — out of the core's own
/// scope, kept minimal here since this binary *is* the wrapping program.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"), about = "Dual-pane terminal file manager")]
struct Cli {
    /// Initial directory for both panes (defaults to the current directory).
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Request the windowed backend. Absence selects the terminal backend
    /// (spec §6); this build ships only the terminal renderer (spec §1's
    /// "out of scope: the specific desktop backend implementation"), so
    /// this flag is accepted for CLI compatibility and logs a warning
    /// rather than failing.
    #[arg(long)]
    desktop: bool,

    /// Enable debug-mode logging and stack traces on event-handler panics
    /// (spec §6, §7).
    #[arg(long)]
    debug: bool,

    /// Print the bash shell function and exit (cd-on-quit integration).
    #[arg(long = "init-bash")]
    init_bash: bool,

    /// Print the zsh shell function and exit.
    #[arg(long = "init-zsh")]
    init_zsh: bool,
}

fn debug_enabled(cli: &Cli) -> bool {
    cli.debug || std::env::var("DEBUG").map(|v| v != "0" && !v.is_empty()).unwrap_or(false)
}

fn desktop_requested(cli: &Cli) -> bool {
    cli.desktop || std::env::var("TFM_DESKTOP").map(|v| v != "0" && !v.is_empty()).unwrap_or(false)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init_bash {
        print!("{}", integration::bash_function());
        return Ok(());
    }
    if cli.init_zsh {
        print!("{}", integration::zsh_function());
        return Ok(());
    }

    let debug_mode = debug_enabled(&cli);

    let config = AppConfig::load();
    let state = AppState::new(config);
    let log = std::sync::Arc::clone(&state.log);

    let filter = if debug_mode {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal());
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(TracingBridge::new(std::sync::Arc::clone(&log)))
            .try_init();
    }

    if desktop_requested(&cli) {
        log.push(
            LogSource::Main,
            LogLevel::Warning,
            "desktop backend requested but not available in this build; falling back to the terminal backend (spec §1)",
        );
    }

    let root = match cli.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("fatal: cannot resolve initial directory {}: {e}", cli.path.display());
            std::process::exit(1);
        }
    };
    let left_root = Location::Local(root.clone());
    let right_root = Location::Local(root);

    let main_screen = match MainScreen::new(state, left_root, right_root) {
        Ok(screen) => screen,
        Err(e) => {
            eprintln!("fatal: failed to initialize main screen: {e}");
            std::process::exit(1);
        }
    };

    let mut renderer = TerminalRenderer::new();
    if let Err(e) = renderer.initialize() {
        eprintln!("fatal: failed to initialize terminal renderer: {e}");
        std::process::exit(1);
    }

    let run_result = run_event_loop(&mut renderer, main_screen, debug_mode, &log);

    // Guaranteed on all exit paths (spec §4.1's "release the device;
    // guaranteed on all exit paths"), including an error from the loop body.
    let shutdown_result = renderer.shutdown();

    let (quit_dir, exit_code) = run_result?;
    shutdown_result?;

    if let Some(dir) = &quit_dir {
        integration::print_exit_payload(Some(std::path::Path::new(dir)), None);
    }

    std::process::exit(exit_code);
}

/// Drives the steady-state loop (spec §2): forward events to the top layer,
/// render dirty layers, flush. Returns the cd-on-quit target (if any) and
/// the process exit code.
fn run_event_loop(
    renderer: &mut TerminalRenderer,
    main_screen: MainScreen,
    debug_mode: bool,
    log: &std::sync::Arc<core::log::LogBuffer>,
) -> anyhow::Result<(Option<String>, i32)> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async move {
        let double_click_ms = main_screen.double_click_ms();
        let mut stack = LayerStack::new(Box::new(main_screen));
        let mut events = spawn_event_reader(Duration::from_millis(100), double_click_ms);

        // One event in, one redraw attempt out — keeps input-to-redraw
        // latency at a single tick at most.
        while let Some(event) = events.recv().await {
            dispatch_event_guarded(&mut stack, &event, debug_mode, log);

            if stack.wants_quit() {
                break;
            }

            renderer.draw(&mut |frame| {
                let area = frame.area();
                stack.render(frame, area);
            })?;

            if stack.wants_quit() {
                break;
            }
        }

        anyhow::Ok((stack.quit_payload(), 0))
    })
}

/// Wraps one dispatch in `catch_unwind` so a panic inside a layer's handler
/// never tears down the event loop (spec §4.2, §7's `Bug` taxonomy: "logged,
/// not propagated further"). System resize forces a full redraw regardless
/// of whether the event was consumed (spec §4.2).
fn dispatch_event_guarded(stack: &mut LayerStack, event: &AppEvent, debug_mode: bool, log: &core::log::LogBuffer) {
    // Spec §4.2: "A small set of global shortcuts ... are intercepted
    // first, before the layer stack." Checked against the raw key event
    // before it is ever forwarded to the top layer, so e.g. quit-
    // confirmation fires even while a dialog has focus. A panic here is
    // reported the same way as one from the layer stack and the event is
    // treated as consumed either way.
    if let AppEvent::Key(key) = event {
        let result = panic::catch_unwind(AssertUnwindSafe(|| stack.handle_global_shortcut(key)));
        match result {
            Ok(true) => return,
            Ok(false) => {}
            Err(payload) => {
                log_panic(log, debug_mode, &payload);
                return;
            }
        }
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| stack.handle_event(event)));
    if let Err(payload) = result {
        log_panic(log, debug_mode, &payload);
        // The event is considered consumed (spec §4.2): a bug in one layer
        // must not cascade into double-handling by a lower layer.
    }
    if matches!(event, AppEvent::System(SystemKind::Resize(_, _))) {
        stack.mark_all_dirty();
    }
}

/// Logs an uncaught panic from an event handler as spec §7's `Bug`
/// taxonomy: "logged, not propagated further", with a stack trace in
/// debug mode.
fn log_panic(log: &core::log::LogBuffer, debug_mode: bool, payload: &(dyn std::any::Any + Send)) {
    let message = panic_message(payload);
    if debug_mode {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log.push(LogSource::Main, LogLevel::Critical, format!("panic in event handler: {message}\n{backtrace}"));
    } else {
        log.push(LogSource::Main, LogLevel::Critical, format!("panic in event handler: {message}"));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
