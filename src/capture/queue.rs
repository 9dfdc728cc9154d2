use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

/// Unbounded FIFO shared between a sensor callback (producer) and the drain
/// (single consumer). Clones share the same buffer.
pub struct CaptureQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> CaptureQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<T>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("capture queue lock poisoned"))
    }

    pub fn push(&self, item: T) -> Result<()> {
        self.lock()?.push_back(item);
        Ok(())
    }

    /// Remove the oldest item.
    pub fn pop(&self) -> Result<Option<T>> {
        Ok(self.lock()?.pop_front())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Visit queued items oldest first without removing them.
    ///
    /// The lock is held for the whole walk, so producers block meanwhile.
    pub fn for_each(&self, mut f: impl FnMut(usize, &T)) -> Result<()> {
        let guard = self.lock()?;
        for (i, item) in guard.iter().enumerate() {
            f(i, item);
        }
        Ok(())
    }
}

impl<T> Clone for CaptureQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CaptureQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
