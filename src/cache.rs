//! Small bounded key-value cache with TTL expiry.
//!
//! Replaces the old pattern of a bare module-level map that only ever grew.
//! Capacity is fixed at construction; when full, the oldest entry is
//! evicted. Values past their TTL read as absent.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    stored_at: Instant,
}

pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            capacity,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, or `None` when absent or expired. Expired
    /// entries are dropped on read.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock().ok()?;
        match slots.get(key) {
            Some(slot) if slot.stored_at.elapsed() < self.ttl => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value, evicting the oldest entry when at capacity.
    pub fn put(&self, key: K, value: V) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };

        if !slots.contains_key(&key) && slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                slots.remove(&oldest);
            }
        }

        slots.insert(
            key,
            Slot {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_fresh_values() {
        let cache: BoundedCache<String, i64> = BoundedCache::new(4, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_expired_values_read_as_absent() {
        let cache: BoundedCache<String, i64> = BoundedCache::new(4, Duration::from_millis(10));
        cache.put("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache: BoundedCache<i32, i32> = BoundedCache::new(2, Duration::from_secs(60));
        cache.put(1, 10);
        std::thread::sleep(Duration::from_millis(2));
        cache.put(2, 20);
        std::thread::sleep(Duration::from_millis(2));
        cache.put(3, 30);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache: BoundedCache<i32, i32> = BoundedCache::new(2, Duration::from_secs(60));
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(1, 11);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.get(&2), Some(20));
    }
}
