use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one export.
///
/// Clones observe the same flag. `cancel` may be called from any thread,
/// any number of times.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Export cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let handle = CancelHandle::new();
        let remote = handle.clone();
        assert!(!handle.is_cancelled());
        remote.cancel();
        remote.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let handle = CancelHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
    }
}
