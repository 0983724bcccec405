//! Cooperative shutdown
//!
//! The receive loop polls a [`StopSignal`] between datagrams. Ctrl-C sets it
//! from a small helper thread running a single-threaded tokio runtime, so the
//! loop finishes its current iteration and releases the socket and sink
//! through the normal exit path. A second Ctrl-C exits the process at once,
//! for when the loop is stuck in a blocking sink write.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Exit status used when a second interrupt forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shared flag requesting the receiver to stop
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a signal that is not yet raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What an interrupt should do given the current stop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// First interrupt: ask the loop to wind down
    Graceful,
    /// Stop was already requested: exit without waiting
    Forced,
}

/// Raise `stop`, or report a forced exit if it was already raised
pub fn on_interrupt(stop: &StopSignal) -> Interrupt {
    if stop.is_stopped() {
        Interrupt::Forced
    } else {
        stop.stop();
        Interrupt::Graceful
    }
}

/// Raise `stop` when the process receives Ctrl-C, exit on the second one
///
/// # Errors
///
/// Returns an I/O error if the runtime or the listener thread cannot be
/// created.
pub fn install_ctrl_c_handler(stop: StopSignal) -> io::Result<thread::JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::warn!("Failed to listen for Ctrl-C: {}", e);
                        return;
                    }
                    match on_interrupt(&stop) {
                        Interrupt::Graceful => {
                            log::info!("Interrupt received, stopping (Ctrl-C again to force exit)");
                        }
                        Interrupt::Forced => {
                            log::warn!("Second interrupt received, exiting immediately");
                            std::process::exit(FORCED_EXIT_CODE);
                        }
                    }
                }
            });
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stopped());

        stop.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn test_second_interrupt_forces_exit() {
        let stop = StopSignal::new();

        assert_eq!(on_interrupt(&stop), Interrupt::Graceful);
        assert!(stop.is_stopped());
        assert_eq!(on_interrupt(&stop), Interrupt::Forced);
        assert_eq!(on_interrupt(&stop), Interrupt::Forced);
    }

    #[test]
    fn test_stop_from_another_thread() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        thread::spawn(move || remote.stop()).join().unwrap();
        assert!(stop.is_stopped());
    }
}
