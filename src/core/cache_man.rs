//! Thumbnail memory budget.
//!
//! The cache has no eviction policy of its own: entries stay until memory
//! pressure. `CacheManager` defines what pressure means by tracking decoded
//! bytes against a limit sized from system memory.

use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use sysinfo::System;

/// Decoded-image memory tracker
#[derive(Debug)]
pub struct CacheManager {
    /// Tracked usage (bytes)
    memory_usage: AtomicUsize,
    /// Limit (bytes), fixed at construction
    max_memory_bytes: usize,
}

/// Smallest budget handed out, however little memory the host reports
pub const MIN_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Usable bytes: (available - reserve) * fraction, floored at `MIN_CACHE_BYTES`
fn compute_limit(mem_fraction: f64, reserve_gb: f64) -> (usize, usize) {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    (available, limit_for(available, mem_fraction, reserve_gb))
}

fn limit_for(available: usize, mem_fraction: f64, reserve_gb: f64) -> usize {
    let reserve = (reserve_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as usize;
    let usable = available.saturating_sub(reserve);
    let limit = (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize;
    limit.max(MIN_CACHE_BYTES)
}

impl CacheManager {
    /// Create manager with limit derived from available system memory.
    ///
    /// # Arguments
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0)
    /// * `reserve_gb` - Memory left for the rest of the system (GB)
    pub fn new(mem_fraction: f64, reserve_gb: f64) -> Self {
        let (available, max_memory_bytes) = compute_limit(mem_fraction, reserve_gb);

        info!(
            "CacheManager init: available={} MB, reserve={} MB, limit={} MB ({}%)",
            available / 1024 / 1024,
            (reserve_gb * 1024.0) as usize,
            max_memory_bytes / 1024 / 1024,
            (mem_fraction * 100.0) as u32
        );

        Self::with_limit(max_memory_bytes)
    }

    /// Create manager with an explicit byte limit
    pub fn with_limit(max_memory_bytes: usize) -> Self {
        Self {
            memory_usage: AtomicUsize::new(0),
            max_memory_bytes,
        }
    }

    /// True when usage is over the limit (memory pressure)
    pub fn check_memory_limit(&self) -> bool {
        self.memory_usage.load(Ordering::Relaxed) > self.max_memory_bytes
    }

    /// (usage, limit) in bytes
    pub fn mem(&self) -> (usize, usize) {
        let usage = self.memory_usage.load(Ordering::Relaxed);
        let limit = self.max_memory_bytes;
        (usage, limit)
    }

    /// Usage as fraction of limit
    pub fn mem_usage_fraction(&self) -> f64 {
        let (usage, limit) = self.mem();
        if limit == 0 {
            0.0
        } else {
            usage as f64 / limit as f64
        }
    }

    pub fn add_memory(&self, bytes: usize) {
        let new_usage = self.memory_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.max_memory_bytes;
        if new_usage > limit {
            debug!(
                "Memory limit exceeded: {} KB / {} KB",
                new_usage / 1024,
                limit / 1024
            );
        }
    }

    /// Saturating subtraction so double-frees can't underflow
    pub fn free_memory(&self, bytes: usize) {
        let _ = self
            .memory_usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_manager_creation() {
        let manager = CacheManager::new(0.5, 1.0);
        let (usage, _limit) = manager.mem();
        assert_eq!(usage, 0);
    }

    #[test]
    fn test_memory_tracking() {
        let manager = CacheManager::with_limit(usize::MAX);

        manager.add_memory(1024 * 1024);
        assert_eq!(manager.mem().0, 1024 * 1024);

        manager.free_memory(512 * 1024);
        assert_eq!(manager.mem().0, 512 * 1024);

        // Saturates instead of wrapping
        manager.free_memory(10 * 1024 * 1024);
        assert_eq!(manager.mem().0, 0);
    }

    #[test]
    fn test_limit_check() {
        let manager = CacheManager::with_limit(100);
        manager.add_memory(100);
        assert!(!manager.check_memory_limit());
        manager.add_memory(1);
        assert!(manager.check_memory_limit());
        assert!(manager.mem_usage_fraction() > 1.0);
    }

    #[test]
    fn test_reserve_larger_than_available_keeps_floor() {
        assert_eq!(limit_for(512 * 1024 * 1024, 0.25, 2.0), MIN_CACHE_BYTES);
        assert_eq!(limit_for(0, 1.0, 0.0), MIN_CACHE_BYTES);

        let manager = CacheManager::new(0.25, 1.0e6);
        assert!(manager.mem().1 >= MIN_CACHE_BYTES);
    }

    #[test]
    fn test_limit_from_available() {
        let gb = 1024 * 1024 * 1024;
        assert_eq!(limit_for(10 * gb, 0.5, 2.0), 4 * gb);
    }

    #[test]
    fn test_zero_limit_fraction() {
        let manager = CacheManager::with_limit(0);
        assert_eq!(manager.mem_usage_fraction(), 0.0);
    }
}
