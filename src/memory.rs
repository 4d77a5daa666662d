// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Accounting for native handles owned by host wrappers.
//!
//! ## Why This Module Exists
//!
//! Every [`HostTensor`](crate::HostTensor) owns exactly one native handle and must
//! release it exactly once. The [`HandleTracker`] records both events so that:
//!
//! 1. **Leaks are visible**: `live_handles()` returns to zero once every wrapper is gone
//! 2. **Double releases are visible**: `releases()` never exceeds `allocations()`
//! 3. **Budgets are enforceable**: an optional byte limit makes construction fail
//!    with [`BridgeError::Allocation`] instead of exhausting device memory
//!
//! ## Design Decisions
//!
//! - **No global state**: each [`Bridge`](crate::Bridge) owns its tracker.
//! - **Atomics only**: the tracker never blocks a host thread.
//! - **Logical bytes**: a handle is charged `numel * element_size` even when the
//!   engine shares storage between views.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{BridgeError, Result};

/// Point-in-time copy of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleStats {
    /// Handles currently owned by wrappers.
    pub live_handles: usize,
    /// Logical bytes held by live handles.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
    /// Handles allocated since creation or the last reset.
    pub allocations: usize,
    /// Handles released since creation or the last reset.
    pub releases: usize,
    /// Byte limit (0 = unlimited).
    pub limit_bytes: usize,
}

/// Allocation/release ledger for native handles.
///
/// ```rust
/// use tensor_bridge::HandleTracker;
///
/// let tracker = HandleTracker::with_limit(1024);
/// tracker.allocate(512).expect("fits");
/// assert!(tracker.allocate(1024).is_err());
/// tracker.release(512);
/// assert_eq!(tracker.stats().live_handles, 0);
/// ```
#[derive(Debug, Default)]
pub struct HandleTracker {
    live_handles: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    allocations: AtomicUsize,
    releases: AtomicUsize,
    /// 0 = unlimited.
    limit: AtomicUsize,
}

impl HandleTracker {
    /// Create a tracker with no byte limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that refuses allocations beyond `limit_bytes` live bytes.
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        let tracker = Self::new();
        tracker.limit.store(limit_bytes, Ordering::SeqCst);
        tracker
    }

    /// Record a new handle of `bytes` logical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Allocation`] if the handle would exceed the limit;
    /// nothing is recorded in that case.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let reserved = self
            .live_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(bytes)?;
                (limit == 0 || next <= limit).then_some(next)
            });

        let new_live = match reserved {
            Ok(previous) => previous + bytes,
            Err(current) => {
                return Err(BridgeError::allocation(format!(
                    "handle of {bytes} bytes would exceed limit of {limit} bytes \
                     (live: {current} bytes)"
                )));
            }
        };

        self.live_handles.fetch_add(1, Ordering::SeqCst);
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.peak_bytes.fetch_max(new_live, Ordering::SeqCst);
        Ok(())
    }

    /// Record the release of a handle of `bytes` logical bytes.
    pub fn release(&self, bytes: usize) {
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    /// `true` if a handle of `bytes` would currently fit.
    #[must_use]
    pub fn would_fit(&self, bytes: usize) -> bool {
        let limit = self.limit.load(Ordering::SeqCst);
        if limit == 0 {
            return true;
        }
        self.live_bytes
            .load(Ordering::SeqCst)
            .checked_add(bytes)
            .is_some_and(|next| next <= limit)
    }

    /// Snapshot the counters.
    #[must_use]
    pub fn stats(&self) -> HandleStats {
        HandleStats {
            live_handles: self.live_handles.load(Ordering::SeqCst),
            live_bytes: self.live_bytes.load(Ordering::SeqCst),
            peak_bytes: self.peak_bytes.load(Ordering::SeqCst),
            allocations: self.allocations.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
            limit_bytes: self.limit.load(Ordering::SeqCst),
        }
    }

    /// Reset the peak and the cumulative counters. Live counts are kept, since
    /// the handles they describe are still owned.
    pub fn reset_counters(&self) {
        self.peak_bytes
            .store(self.live_bytes.load(Ordering::SeqCst), Ordering::SeqCst);
        self.allocations.store(0, Ordering::SeqCst);
        self.releases.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let tracker = HandleTracker::with_limit(1000);

        assert!(tracker.allocate(500).is_ok());
        assert!(tracker.allocate(400).is_ok());
        assert_eq!(tracker.stats().live_handles, 2);
        assert_eq!(tracker.stats().live_bytes, 900);

        // Exceeds limit
        assert!(matches!(
            tracker.allocate(200),
            Err(BridgeError::Allocation { .. })
        ));
        assert_eq!(tracker.stats().live_bytes, 900);
        assert_eq!(tracker.stats().allocations, 2);

        tracker.release(400);
        assert_eq!(tracker.stats().live_bytes, 500);
        assert!(tracker.allocate(200).is_ok());
    }

    #[test]
    fn test_peak() {
        let tracker = HandleTracker::new();

        tracker.allocate(100).unwrap();
        tracker.allocate(200).unwrap();
        tracker.release(200);
        assert_eq!(tracker.stats().peak_bytes, 300);

        tracker.allocate(300).unwrap();
        assert_eq!(tracker.stats().peak_bytes, 400);
    }

    #[test]
    fn test_zero_byte_handles_are_counted() {
        let tracker = HandleTracker::with_limit(1);
        tracker.allocate(0).unwrap();
        tracker.allocate(0).unwrap();
        assert_eq!(tracker.stats().live_handles, 2);
        tracker.release(0);
        assert_eq!(tracker.stats().live_handles, 1);
        assert_eq!(tracker.stats().releases, 1);
    }

    #[test]
    fn test_would_fit() {
        let tracker = HandleTracker::with_limit(1000);
        tracker.allocate(500).unwrap();

        assert!(tracker.would_fit(500));
        assert!(!tracker.would_fit(501));
        assert!(HandleTracker::new().would_fit(usize::MAX));
    }

    #[test]
    fn test_reset_counters_keeps_live() {
        let tracker = HandleTracker::new();
        tracker.allocate(10).unwrap();
        tracker.allocate(20).unwrap();
        tracker.release(20);
        tracker.reset_counters();

        let stats = tracker.stats();
        assert_eq!(stats.live_handles, 1);
        assert_eq!(stats.live_bytes, 10);
        assert_eq!(stats.peak_bytes, 10);
        assert_eq!(stats.allocations, 0);
        assert_eq!(stats.releases, 0);
    }
}
