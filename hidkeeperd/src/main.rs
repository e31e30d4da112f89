//! Hidkeeper Daemon - Main Entry Point
//!
//! This is the privileged system daemon responsible for:
//! - Owning the fixed-capacity device table
//! - Installing the signal-safe shutdown relay
//! - Running the transport event loop
//! - Orchestrating two-phase device teardown on exit

use hidkeeper_common::{keymap, tracing, DaemonError, UsbId};
use hidkeeperd::{
    clock, config, devnode, devtable, pidfile, preflight, shutdown, signals, transport, DaemonCtx,
};
use std::env;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config = match config::parse_args(env::args().skip(1)) {
        config::CliAction::Help => {
            print_usage();
            return Ok(());
        }
        config::CliAction::Version => {
            println!("hidkeeperd {}", VERSION);
            return Ok(());
        }
        config::CliAction::Search { id, name } => process::exit(run_search(id, &name)),
        config::CliAction::Run(config) => *config,
    };

    info!("Starting hidkeeperd {}", VERSION);

    // Single-instance and privilege invariants; both abort before any
    // device state exists
    if let Err(e) = preflight(&config, Path::new(pidfile::PID_PATH)) {
        match e {
            DaemonError::AlreadyRunning(_) => {
                error!("{}.", e);
                error!("Try `systemctl stop hidkeeperd` or `killall hidkeeperd`.");
                error!(
                    "(If you're certain the process is dead, delete {} and try again.)",
                    pidfile::PID_PATH
                );
            }
            _ => error!("{}. Try `sudo hidkeeperd`", e),
        }
        process::exit(1);
    }
    if !nix::unistd::getuid().is_root() {
        warn!("Not running as root, allowing anyway per command-line parameter...");
    }

    // Node permissions are set explicitly below
    let _ = nix::sys::stat::umask(nix::sys::stat::Mode::empty());

    // Make root controller node
    match devnode::create_root(&config.devroot, devtable::ROOT_SLOT, config.gid) {
        Ok(path) => info!("Root controller ready at {}", path.display()),
        Err(e) => warn!("Unable to create root controller node: {}", e),
    }
    if let Err(e) = pidfile::write_pid(Path::new(pidfile::PID_PATH)) {
        warn!("Unable to write pidfile: {}", e);
    }

    // Attempt to set up the signal-safe relay; on failure the daemon keeps
    // running with default termination behavior (no graceful teardown)
    let receiver = signals::install_relay();
    if let Err(e) = signals::install_wake_handler() {
        warn!("Unable to install wake handler: {}", e);
    }

    if let Err(e) = clock::init_monotonic() {
        error!("Failed to initialize monotonic clock: {}", e);
        process::exit(1);
    }

    let transport: Arc<dyn transport::Transport> = Arc::new(transport::UsbTransport::new());
    let ctx = Arc::new(DaemonCtx::new(config, transport));

    let result = match receiver {
        Some(mut receiver) => {
            // Run the transport loop on a worker thread; this thread
            // becomes the deferred signal consumer. A loop that returns on
            // its own reports through the relay so it reaches the same
            // teardown, with its exit code carried out of band.
            let loop_ctx = Arc::clone(&ctx);
            let loop_code = Arc::new(AtomicI32::new(0));
            let loop_code_tx = Arc::clone(&loop_code);
            thread::spawn(move || {
                let code = loop_ctx.transport.run_loop(&loop_ctx.table);
                loop_code_tx.store(code, Ordering::SeqCst);
                signals::notify_loop_exit();
            });

            match receiver.recv() {
                Ok(signals::LOOP_EXIT) => info!("Transport loop exited, shutting down"),
                Ok(sig) => info!("Caught signal {} ({})", sig, signals::signal_name(sig)),
                Err(e) => warn!("Signal relay read failed: {}", e),
            }
            signals::ignore_term_signals();
            shutdown::run(&ctx);
            loop_code.load(Ordering::SeqCst)
        }
        None => {
            // No relay: run the loop here and tear down on fall-through
            let code = ctx.transport.run_loop(&ctx.table);
            shutdown::run(&ctx);
            code
        }
    };

    pidfile::remove(Path::new(pidfile::PID_PATH));
    process::exit(result)
}

/// Diagnostic keymap lookup backing `--search=[<vid>:<pid>/]<name>`.
/// An empty name reports the first unassigned key id for the device.
fn run_search(id: UsbId, name: &str) -> i32 {
    let map = keymap::patched(id);
    if name.is_empty() {
        if let Some(free) = map.first_free() {
            println!("First NULL key has id {}", free);
            return 0;
        }
        println!("Key {} was not found", name);
        return 1;
    }
    match map.lookup(name) {
        Some((key_id, canonical)) => {
            println!("Key {} has id {}", canonical, key_id);
            0
        }
        None => {
            println!("Key {} was not found", name);
            1
        }
    }
}

fn print_usage() {
    println!(
        "Usage: hidkeeperd [--version] [--gid=<gid>] [--nonotify] [--nobind] [--nonroot]\n\
         Manages connected HID peripherals and reverts them to their stock protocol on exit.\n\n\
         Options:\n\
         \x20   --version\n\
         \x20       Print version string to stdout and quit.\n\
         \x20   --gid=<gid>\n\
         \x20       Restrict access to {}* nodes to users in group <gid>.\n\
         \x20       (Ordinarily they are accessible to anyone)\n\
         \x20   --nonotify\n\
         \x20       Disables key monitoring/notifications.\n\
         \x20   --nobind\n\
         \x20       Disables all key rebinding, macros, and notifications. Implies --nonotify.\n\
         \x20   --nonroot\n\
         \x20       Allows running hidkeeperd as a non root user.\n\
         \x20       This will almost certainly not work. Use only if you know what you're doing.",
        devnode::DEVICE_ROOT
    );
    #[cfg(target_os = "macos")]
    println!(
        "    --nomouseaccel\n\
         \x20       Disables mouse acceleration, even if the system preferences enable it."
    );
}
