use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative interruption flag.
///
/// Runners only check it between pages, so a page that has started is always
/// classified and repaired in full.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
