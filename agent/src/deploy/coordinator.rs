//! Deployment slot

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Grants at most one deployment permission to run at a time.
///
/// Owned by the application state and shared as `Arc<Coordinator>`; the busy flag
/// lives only in memory.
#[derive(Debug, Default)]
pub struct Coordinator {
    busy: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the slot without blocking.
    ///
    /// Returns `true` if the caller now holds the slot and must call
    /// [`Coordinator::release`] exactly once.
    pub fn request_slot(&self) -> bool {
        let acquired = self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        debug!(acquired, "Deployment slot requested");
        acquired
    }

    /// Free the slot
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
        debug!("Deployment slot released");
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
