//! In-process caching of release metadata lookups.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::sources::{ChannelDetails, MilestoneDetail, MilestoneDetails};
use crate::version::Milestone;

const DEFAULT_CAPACITY: usize = 256;

/// Current channels with the time they were fetched.
struct LatestEntry {
    channels: ChannelDetails,
    fetched_at: Instant,
}

/// Caches the current-channel lookup for a fixed TTL and per-milestone
/// details in an LRU.
pub struct ReleaseCache {
    ttl: Duration,

    /// Last channel lookup.
    latest: Mutex<Option<LatestEntry>>,

    /// Milestone details by milestone.
    milestones: Mutex<LruCache<Milestone, MilestoneDetail>>,
}

impl ReleaseCache {
    /// Create a new cache. A zero capacity falls back to the default.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            ttl,
            latest: Mutex::new(None),
            milestones: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached channels, unless older than the TTL.
    pub fn latest(&self) -> Option<ChannelDetails> {
        let guard = self.latest.lock().ok()?;
        let entry = guard.as_ref()?;

        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.channels.clone())
    }

    /// Store freshly fetched channels.
    pub fn set_latest(&self, channels: ChannelDetails) {
        if let Ok(mut guard) = self.latest.lock() {
            if let Some(previous) = guard.as_ref() {
                if previous.channels.stable.mstone != channels.stable.mstone {
                    tracing::info!(
                        from = previous.channels.stable.mstone,
                        to = channels.stable.mstone,
                        "Stable milestone changed"
                    );
                }
            }

            *guard = Some(LatestEntry {
                channels,
                fetched_at: Instant::now(),
            });
        }
    }

    /// Get cached milestone details.
    pub fn milestone(&self, milestone: Milestone) -> Option<MilestoneDetail> {
        self.milestones.lock().ok()?.get(&milestone).cloned()
    }

    /// Store every detail of a range lookup.
    pub fn set_milestones(&self, details: &MilestoneDetails) {
        if let Ok(mut guard) = self.milestones.lock() {
            for (milestone, detail) in details {
                guard.put(*milestone, detail.clone());
            }
        }
    }

    /// Invalidate entire cache.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.latest.lock() {
            *guard = None;
        }

        if let Ok(mut guard) = self.milestones.lock() {
            guard.clear();
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            has_latest: self.latest.lock().map(|g| g.is_some()).unwrap_or(false),
            milestones_count: self.milestones.lock().map(|g| g.len()).unwrap_or(0),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub has_latest: bool,
    pub milestones_count: usize,
}

impl Default for ReleaseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fake::milestone_detail;

    fn channels(stable: Milestone) -> ChannelDetails {
        ChannelDetails {
            stable: milestone_detail(stable, Some("2023-05-30T00:00:00")),
            beta: None,
            dev: None,
            canary: None,
        }
    }

    #[test]
    fn test_cache_new_with_zero_capacity_uses_default() {
        let cache = ReleaseCache::new(0, Duration::from_secs(60));
        assert_eq!(cache.stats().milestones_count, 0);
    }

    #[test]
    fn test_latest_set_and_get() {
        let cache = ReleaseCache::default();
        assert!(cache.latest().is_none());

        cache.set_latest(channels(114));
        assert_eq!(cache.latest().unwrap().stable.mstone, 114);

        cache.set_latest(channels(115));
        assert_eq!(cache.latest().unwrap().stable.mstone, 115);
    }

    #[test]
    fn test_latest_expires_after_ttl() {
        let cache = ReleaseCache::new(8, Duration::ZERO);
        cache.set_latest(channels(114));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.latest().is_none());
        assert!(cache.stats().has_latest);
    }

    #[test]
    fn test_milestones_evict_least_recent() {
        let cache = ReleaseCache::new(2, Duration::from_secs(60));
        let details: MilestoneDetails = (112..=114)
            .map(|m| (m, milestone_detail(m, None)))
            .collect();
        cache.set_milestones(&details);

        assert!(cache.milestone(112).is_none());
        assert_eq!(cache.milestone(114).unwrap().mstone, 114);
        assert_eq!(cache.stats().milestones_count, 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = ReleaseCache::default();
        cache.set_latest(channels(114));
        cache.set_milestones(&[(114, milestone_detail(114, None))].into_iter().collect());

        cache.invalidate();
        assert_eq!(
            cache.stats(),
            CacheStats {
                has_latest: false,
                milestones_count: 0
            }
        );
    }
}
