//! Cooperative shutdown flag, flipped by SIGTERM/SIGINT/SIGHUP (spec §5:
//! "finish the in-flight batch, then exit"). Ported from `CrawlerMain`'s
//! `_set_signal_handlers`/`_signal_handler`, using `signal-hook`'s flag
//! helper instead of hand-rolled `signal()` registration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

/// Shared "a captured signal arrived" flag. Cloning shares the same
/// underlying atomic.
#[derive(Clone)]
pub struct ShutdownFlag {
    terminate_requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Registers SIGTERM, SIGINT, and SIGHUP handlers that set the flag.
    /// Mirrors `Settings.CAPTURED_SIGNALS`.
    pub fn install() -> std::io::Result<Self> {
        let terminate_requested = Arc::new(AtomicBool::new(false));

        flag::register(SIGTERM, Arc::clone(&terminate_requested))?;
        flag::register(SIGINT, Arc::clone(&terminate_requested))?;
        flag::register(SIGHUP, Arc::clone(&terminate_requested))?;

        Ok(Self { terminate_requested })
    }

    /// `true` until a captured signal arrives, mirroring
    /// `CrawlerMain._continue_running`.
    pub fn should_continue(&self) -> bool {
        !self.terminate_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn starts_true_without_a_signal() {
        let flag = ShutdownFlag {
            terminate_requested: Arc::new(AtomicBool::new(false)),
        };
        assert!(flag.should_continue());
    }

    #[test]
    fn false_once_terminate_is_requested() {
        let flag = ShutdownFlag {
            terminate_requested: Arc::new(AtomicBool::new(true)),
        };
        assert!(!flag.should_continue());
    }
}
