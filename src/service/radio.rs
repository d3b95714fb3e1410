use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag serialising scans and the connection attempts they start.
#[derive(Debug, Clone, Default)]
pub(crate) struct RadioLock {
    busy: Arc<AtomicBool>,
}

impl RadioLock {
    /// Takes the radio if it is free. There is no queue.
    pub(crate) fn try_acquire(&self) -> Option<RadioLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_previous| RadioLease {
                busy: Arc::clone(&self.busy),
            })
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the radio until dropped.
#[derive(Debug)]
pub(crate) struct RadioLease {
    busy: Arc<AtomicBool>,
}

impl Drop for RadioLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
