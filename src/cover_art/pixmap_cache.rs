//! Byte-budgeted cache of render-ready cover variants.

use std::fmt;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use crate::protocol::{CoverSize, RenderImage};

/// Identifies one render-ready variant of one cover.
///
/// Keys are built from the content hash, never the file path, so identical
/// art in differently named files shares an entry. `(0, 0)` is the capped
/// full-size variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub hash: String,
    pub width: u32,
    pub height: u32,
}

impl CacheKey {
    pub fn new(hash: &str, target_size: Option<CoverSize>) -> Self {
        let (width, height) = target_size
            .filter(|size| !size.is_empty())
            .map(|size| (size.width, size.height))
            .unwrap_or((0, 0));
        Self {
            hash: hash.to_string(),
            width,
            height,
        }
    }

    pub fn full_size(hash: &str) -> Self {
        Self::new(hash, None)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoverArtCache_{}_{}x{}", self.hash, self.width, self.height)
    }
}

fn image_cost_bytes(image: &RenderImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height()) * 4u64
}

/// Shared pixmap cache. Clones share the same entries.
///
/// Eviction is least-recently-used by byte cost, delegated to `moka`. An
/// entry may be evicted at any time and callers must be ready to recompute it.
#[derive(Clone)]
pub struct PixmapCache {
    entries: Cache<CacheKey, RenderImage>,
    budget_bytes: u64,
}

impl PixmapCache {
    pub fn new(budget_bytes: u64) -> Self {
        let budget_bytes = budget_bytes.max(1);
        let entries = Cache::builder()
            .weigher(|_key, image: &RenderImage| {
                u32::try_from(image_cost_bytes(image)).unwrap_or(u32::MAX)
            })
            .max_capacity(budget_bytes)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            entries,
            budget_bytes,
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn get(&self, key: &CacheKey) -> Option<RenderImage> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns `false` when the image alone exceeds the budget and was not cached.
    ///
    /// Otherwise the entry is admitted, evicting the least recently used
    /// entries once maintenance runs.
    pub fn insert(&self, key: CacheKey, image: RenderImage) -> bool {
        if image_cost_bytes(&image) > self.budget_bytes {
            return false;
        }
        self.entries.insert(key, image);
        true
    }

    /// Total cost of resident entries after pending maintenance has run.
    pub fn weighted_size(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.weighted_size()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheKey, PixmapCache};
    use crate::protocol::{CoverSize, RenderImage};
    use image::{ImageBuffer, Rgba};
    use std::sync::Arc;

    fn render_image(width: u32, height: u32) -> RenderImage {
        Arc::new(ImageBuffer::from_pixel(width, height, Rgba([1, 2, 3, 255])))
    }

    #[test]
    fn test_cache_key_uses_zero_size_for_full_variant() {
        assert_eq!(CacheKey::full_size("abc").to_string(), "CoverArtCache_abc_0x0");
        assert_eq!(
            CacheKey::new("abc", Some(CoverSize::new(0, 40))),
            CacheKey::full_size("abc")
        );
        assert_eq!(
            CacheKey::new("abc", Some(CoverSize::new(40, 30))).to_string(),
            "CoverArtCache_abc_40x30"
        );
    }

    #[test]
    fn test_insert_then_get_returns_shared_image() {
        let cache = PixmapCache::new(1024 * 1024);
        let image = render_image(16, 16);
        let key = CacheKey::new("hash", Some(CoverSize::new(16, 16)));
        assert!(cache.insert(key.clone(), image.clone()));

        let cached = cache.get(&key).expect("inserted image should be cached");
        assert!(Arc::ptr_eq(&cached, &image));
        assert!(cache.contains(&key));
        assert!(cache.get(&CacheKey::full_size("hash")).is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = PixmapCache::new(1024 * 1024);
        let shared = cache.clone();
        shared.insert(CacheKey::full_size("shared"), render_image(4, 4));
        assert!(cache.contains(&CacheKey::full_size("shared")));
    }

    #[test]
    fn test_oversized_image_is_not_admitted() {
        let cache = PixmapCache::new(1024);
        let key = CacheKey::full_size("big");
        // 32 * 32 * 4 bytes exceeds the 1 KiB budget.
        assert!(!cache.insert(key.clone(), render_image(32, 32)));
        assert!(cache.get(&key).is_none());
        assert!(cache.insert(CacheKey::full_size("small"), render_image(8, 8)));
    }

    #[test]
    fn test_new_entry_evicts_least_recently_read_instead_of_being_refused() {
        // Four 1 KiB covers fill the budget exactly.
        let cache = PixmapCache::new(4 * 1024);
        for index in 0..4 {
            cache.insert(
                CacheKey::full_size(&format!("resident-{index}")),
                render_image(16, 16),
            );
        }
        cache.weighted_size();
        for _ in 0..20 {
            for index in 0..4 {
                assert!(cache
                    .get(&CacheKey::full_size(&format!("resident-{index}")))
                    .is_some());
            }
        }
        cache.weighted_size();
        // resident-0 stays the least recently read.
        for index in 1..4 {
            cache.get(&CacheKey::full_size(&format!("resident-{index}")));
        }
        cache.weighted_size();

        assert!(cache.insert(CacheKey::full_size("fresh"), render_image(16, 16)));
        assert!(cache.weighted_size() <= cache.budget_bytes());

        assert!(cache.contains(&CacheKey::full_size("fresh")));
        assert!(!cache.contains(&CacheKey::full_size("resident-0")));
        assert!(cache.contains(&CacheKey::full_size("resident-3")));
    }

    #[test]
    fn test_weighted_size_stays_within_budget() {
        let cache = PixmapCache::new(4 * 1024);
        for index in 0..16 {
            cache.insert(
                CacheKey::full_size(&format!("cover-{index}")),
                render_image(16, 16),
            );
        }
        assert!(cache.weighted_size() <= cache.budget_bytes());

        cache.insert(CacheKey::full_size("fresh"), render_image(4, 4));
        cache.clear();
        assert!(cache.get(&CacheKey::full_size("fresh")).is_none());
    }
}
