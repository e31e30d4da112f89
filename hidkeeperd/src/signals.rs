//! Signal-safe shutdown relay.
//!
//! A termination signal may be delivered on any thread at any instruction
//! boundary, so its handler is limited to the async-signal-safe primitive
//! set: here, a single `write(2)` of the signal number into one end of a
//! pre-created socketpair. Everything that takes locks, allocates or logs
//! runs later, in ordinary thread context, once the other end of the pair
//! is read.
//!
//! Three handlers exist, all restricted to `write(2)`:
//! - the relay handler, installed for SIGTERM/SIGINT/SIGQUIT, forwards the
//!   signal number through the socketpair;
//! - the ignore handler, swapped in once shutdown has begun, only prints a
//!   diagnostic so a second signal cannot re-enter teardown;
//! - the wake handler for SIGUSR2, a no-op registered without SA_RESTART so
//!   `pthread_kill` can force a worker thread out of a blocking call.

use libc::c_int;
use nix::sys::pthread::{pthread_kill, pthread_self, Pthread};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use std::io::{self, Read};
use std::os::fd::IntoRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tracing::warn;

/// Internal wake signal used to interrupt blocking calls in worker threads.
/// Carries no external meaning.
pub const WAKE_SIGNAL: Signal = Signal::SIGUSR2;

/// Termination-class signals that trigger graceful shutdown.
const TERM_SIGNALS: [Signal; 3] = [Signal::SIGTERM, Signal::SIGINT, Signal::SIGQUIT];

/// Sentinel relayed when the transport loop returns on its own rather than
/// in response to a signal. Signal numbers start at 1, so 0 is unambiguous
/// on the channel.
pub const LOOP_EXIT: c_int = 0;

/// Sender end of the relay socketpair, reachable from the handler without
/// allocation. -1 until the relay is installed; never reclaimed afterwards.
static RELAY_TX: AtomicI32 = AtomicI32::new(-1);

/// Async-signal-safe diagnostic write; the result is deliberately dropped.
fn safe_write(msg: &str) {
    let _ = unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        )
    };
}

/// Human-readable name for the signals the daemon consumes.
pub fn signal_name(sig: i32) -> &'static str {
    match sig {
        libc::SIGTERM => "SIGTERM",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        _ => "UNKNOWN",
    }
}

/// Forward the signal number to the deferred consumer. This is the entire
/// unsafe-context side of shutdown.
extern "C" fn relay_handler(sig: c_int) {
    let fd = RELAY_TX.load(Ordering::Relaxed);
    if fd >= 0 {
        let bytes = sig.to_ne_bytes();
        let _ = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    }
}

/// Degenerate handler installed once shutdown has begun: print and return,
/// so a second signal can neither restart teardown nor re-enter locking
/// or logging code.
extern "C" fn ignore_handler(sig: c_int) {
    safe_write("\n[W] Ignoring signal ");
    safe_write(signal_name(sig));
    safe_write(" (already shutting down)\n");
}

extern "C" fn wake_handler(_sig: c_int) {
    safe_write("[I] Caught internal wake signal\n");
}

fn register(sig: Signal, handler: extern "C" fn(c_int), flags: SaFlags) -> nix::Result<()> {
    let action = SigAction::new(SigHandler::Handler(handler), flags, SigSet::empty());
    unsafe { sigaction(sig, &action) }.map(|_| ())
}

/// Receiver end of the relay: blocks in ordinary thread context until a
/// termination signal has been forwarded.
pub struct SignalReceiver {
    rx: UnixStream,
}

impl SignalReceiver {
    /// Block until the next relayed signal number arrives.
    pub fn recv(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; std::mem::size_of::<c_int>()];
        self.rx.read_exact(&mut buf)?;
        Ok(c_int::from_ne_bytes(buf))
    }

    /// Bound how long `recv` may block; `None` restores blocking reads.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.rx.set_read_timeout(timeout)
    }
}

/// Create the relay socketpair and install the termination handlers.
///
/// If the socketpair cannot be created, no handlers are installed at all and
/// the platform's default termination behavior remains in place: the daemon
/// stays available, but a termination signal will skip graceful teardown.
pub fn install_relay() -> Option<SignalReceiver> {
    let (tx, rx) = match socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::empty(),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Unable to set up signal handlers: {}", e);
            return None;
        }
    };

    // The sender fd is parked in a global for the handler and intentionally
    // never closed.
    RELAY_TX.store(tx.into_raw_fd(), Ordering::SeqCst);

    for sig in TERM_SIGNALS {
        if let Err(e) = register(sig, relay_handler, SaFlags::SA_RESTART) {
            warn!("Unable to install handler for {}: {}", sig, e);
        }
    }

    Some(SignalReceiver {
        rx: UnixStream::from(rx),
    })
}

/// Report a transport-loop exit to the relay consumer, so a loop that
/// returns on its own drives the same teardown path a signal does. No-op
/// when the relay was never installed.
pub fn notify_loop_exit() {
    let fd = RELAY_TX.load(Ordering::SeqCst);
    if fd >= 0 {
        let bytes = LOOP_EXIT.to_ne_bytes();
        let _ = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    }
}

/// Swap the termination handlers for the ignore handler. Called by the
/// deferred consumer just before it starts actual teardown.
///
/// A signal delivered after the relay write but before this swap can still
/// enqueue a duplicate message; the teardown entry guard absorbs it.
pub fn ignore_term_signals() {
    for sig in TERM_SIGNALS {
        if let Err(e) = register(sig, ignore_handler, SaFlags::SA_RESTART) {
            warn!("Unable to re-register handler for {}: {}", sig, e);
        }
    }
}

/// Install the SIGUSR2 no-op handler. SA_RESTART must stay off: the whole
/// point is that a blocking call interrupted by this signal returns EINTR
/// instead of being transparently restarted.
pub fn install_wake_handler() -> nix::Result<()> {
    register(WAKE_SIGNAL, wake_handler, SaFlags::empty())
}

/// Force a specific thread out of a blocking call. The interrupted thread
/// is responsible for observing EINTR and returning; no shared state
/// changes here.
pub fn wake_thread(thread: Pthread) -> nix::Result<()> {
    pthread_kill(thread, WAKE_SIGNAL)
}

/// Handle of the calling thread, for use as a later `wake_thread` target.
pub fn current_thread() -> Pthread {
    pthread_self()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGINT), "SIGINT");
        assert_eq!(signal_name(libc::SIGQUIT), "SIGQUIT");
        assert_eq!(signal_name(libc::SIGHUP), "UNKNOWN");
        assert_eq!(signal_name(0), "UNKNOWN");
    }

    #[test]
    fn test_loop_exit_notify_without_relay_is_noop() {
        // No relay installed in this process: the notify must not write
        // anywhere and the sentinel must stay outside the signal range
        notify_loop_exit();
        assert_eq!(RELAY_TX.load(Ordering::SeqCst), -1);
        assert_eq!(signal_name(LOOP_EXIT), "UNKNOWN");
    }

    #[test]
    fn test_term_signal_set() {
        // The relay must cover exactly the three termination-class signals
        assert!(TERM_SIGNALS.contains(&Signal::SIGTERM));
        assert!(TERM_SIGNALS.contains(&Signal::SIGINT));
        assert!(TERM_SIGNALS.contains(&Signal::SIGQUIT));
        assert_eq!(TERM_SIGNALS.len(), 3);
    }
}
