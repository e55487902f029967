use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

/// Lazily opened device handle shared by every channel created from one link.
///
/// Only a weak reference is kept: the device closes once the last channel using it is dropped, and the
/// next request opens it again.
pub struct SharedHandle<T> {
    cached: Mutex<Weak<T>>,
}

impl<T> Default for SharedHandle<T> {
    fn default() -> Self {
        Self {
            cached: Mutex::new(Weak::new()),
        }
    }
}

impl<T> SharedHandle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live handle, or create one with `open`. Concurrent callers never open twice.
    pub fn get_or_open<F>(&self, open: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut cached = self.cached.lock();
        if let Some(handle) = cached.upgrade() {
            return Ok(handle);
        }

        debug!("Opening device handle");
        let handle = Arc::new(open()?);
        *cached = Arc::downgrade(&handle);
        Ok(handle)
    }

    /// True while some channel still holds the handle.
    pub fn is_open(&self) -> bool {
        self.cached.lock().strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reused_while_alive() {
        let handle = SharedHandle::new();
        let opened = AtomicUsize::new(0);
        let open = || {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        };

        let a = handle.get_or_open(open).unwrap();
        let b = handle.get_or_open(open).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        drop(a);
        drop(b);
        assert!(!handle.is_open());

        let _c = handle.get_or_open(open).unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert!(handle.is_open());
    }

    #[test]
    fn failed_open_not_cached() {
        let handle: SharedHandle<u32> = SharedHandle::new();
        assert!(handle.get_or_open(|| Err(crate::Error::NotFound)).is_err());
        assert!(!handle.is_open());
        assert_eq!(*handle.get_or_open(|| Ok(1)).unwrap(), 1);
    }
}
