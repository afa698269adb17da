//! Interrupt handling.
//!
//! Ctrl-C only raises a flag; the suite loop checks it between phases so the
//! backing service is always released before exiting.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Install the SIGINT/SIGTERM handler. Safe to call more than once.
pub fn install_signal_handler() {
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\nInterrupted, cleaning up...");
        SHUTDOWN.store(true, Ordering::SeqCst);
    }) {
        tracing::debug!("Signal handler not installed: {}", e);
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Raise the flag as if a signal had arrived.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}
