use parking_lot::Mutex;
use std::sync::Arc;

type Cleanup = Box<dyn FnOnce() -> nix::Result<()> + Send + 'static>;

/// Holds the terminal-restore action for the session.
///
/// The action runs at most once: from [`TerminalGuard::restore`], from drop,
/// or from the panic hook, whichever comes first.
pub struct TerminalGuard {
    cleanup: Arc<Mutex<Option<Cleanup>>>,
}

impl TerminalGuard {
    pub fn new() -> Self {
        let guard = Self {
            cleanup: Arc::new(Mutex::new(None)),
        };
        guard.install_panic_hook();
        guard
    }

    /// Replaces any pending cleanup. A previously armed action is dropped
    /// without running.
    pub fn arm<F>(&self, cleanup: F)
    where
        F: FnOnce() -> nix::Result<()> + Send + 'static,
    {
        *self.cleanup.lock() = Some(Box::new(cleanup));
    }

    pub fn is_armed(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// Runs the cleanup if it has not run yet.
    pub fn restore(&self) -> nix::Result<()> {
        let cleanup = self.cleanup.lock().take();
        match cleanup {
            Some(cleanup) => cleanup(),
            None => Ok(()),
        }
    }

    fn install_panic_hook(&self) {
        let cleanup = Arc::clone(&self.cleanup);
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // The panic may have happened with the slot locked.
            if let Some(mut slot) = cleanup.try_lock() {
                if let Some(cleanup) = slot.take() {
                    let _ = cleanup();
                }
            }
            default_hook(info);
        }));
    }
}

impl Default for TerminalGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
