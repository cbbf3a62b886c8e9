//! Signal handling for a clean FUSE unmount
//!
//! An environment only reaches its backing store when the mount is synced or
//! torn down. Killing the mount process with Ctrl+C would skip that, so the
//! CLI runs the session in the background and waits here for SIGINT, SIGTERM
//! or SIGHUP before dropping it.
//!
//! ```text
//!   SIGINT / SIGTERM / SIGHUP
//!              │  signal-hook
//!              ▼
//!      ShutdownSignal (atomics)
//!              │  wait_for_shutdown()
//!              ▼
//!   drop BackgroundSession → destroy() → VarFs::sync()
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ubootvar_fs::fs::signal::{install_signal_handlers, wait_for_shutdown, ShutdownSignal};
//!
//! let shutdown = Arc::new(ShutdownSignal::new());
//! install_signal_handlers(shutdown.clone())?;
//!
//! // let session = spawn_mount(fs, "/mnt/env", &options)?;
//! wait_for_shutdown(&shutdown, Duration::from_millis(200));
//! // drop(session);
//! # Ok::<(), std::io::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

/// Shutdown request shared between signal handlers and the mount loop
#[derive(Debug)]
pub struct ShutdownSignal {
    /// Whether shutdown has been requested
    signaled: AtomicBool,
    /// The signal number that triggered shutdown (0 if not triggered)
    signal_num: AtomicI32,
}

impl ShutdownSignal {
    /// Create a new shutdown signal in the non-signaled state
    pub fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            signal_num: AtomicI32::new(0),
        }
    }

    /// Check if shutdown has been signaled
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Get the signal number that triggered shutdown (0 if none)
    pub fn signal_number(&self) -> i32 {
        self.signal_num.load(Ordering::Acquire)
    }

    /// Request shutdown; `signal_num` of 0 means "not from a signal"
    pub fn trigger(&self, signal_num: i32) {
        self.signal_num.store(signal_num, Ordering::Release);
        self.signaled.store(true, Ordering::Release);
    }

    /// Get a human-readable name for the signal
    pub fn signal_name(&self) -> &'static str {
        match self.signal_num.load(Ordering::Acquire) {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            SIGHUP => "SIGHUP",
            0 => "none",
            _ => "unknown",
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Register SIGINT, SIGTERM and SIGHUP to trigger `shutdown`
pub fn install_signal_handlers(shutdown: Arc<ShutdownSignal>) -> std::io::Result<()> {
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        let shutdown = shutdown.clone();
        // SAFETY: the handler only stores to atomics, which is async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || shutdown.trigger(signal))?;
        }
    }
    Ok(())
}

/// Block until `shutdown` is triggered, checking every `poll`
pub fn wait_for_shutdown(shutdown: &ShutdownSignal, poll: Duration) {
    while !shutdown.is_signaled() {
        thread::sleep(poll);
    }
}
