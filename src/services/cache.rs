//! Availability result cache with event-driven invalidation.
//!
//! Entries are keyed by `(tenant, equipment, range, excluded booking)` and hold the
//! computed available quantity, so one entry answers any required quantity. Every
//! write touching an equipment type bumps its generation and drops its entries; a
//! result computed before the bump is refused on insert. The cache is per process
//! and is never consulted while confirming a booking.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: Uuid,
    pub equipment_id: Uuid,
    pub range: DateRange,
    pub exclude_booking_id: Option<Uuid>,
}

/// What the calculator found, independent of the required quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAvailability {
    pub equipment_name: Option<String>,
    /// `None` when the equipment does not exist
    pub available_quantity: Option<i32>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedAvailability>,
    generations: HashMap<(Uuid, Uuid), u64>,
}

#[derive(Debug)]
pub struct AvailabilityCache {
    state: RwLock<CacheState>,
    max_entries: usize,
}

impl AvailabilityCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_entries,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CachedAvailability> {
        self.state.read().await.entries.get(key).cloned()
    }

    /// Current generation of an equipment type; pass it back to [`Self::insert`]
    pub async fn generation(&self, tenant_id: Uuid, equipment_id: Uuid) -> u64 {
        self.state
            .read()
            .await
            .generations
            .get(&(tenant_id, equipment_id))
            .copied()
            .unwrap_or(0)
    }

    /// Store a result unless the equipment was written to since `generation` was read
    pub async fn insert(&self, key: CacheKey, generation: u64, value: CachedAvailability) {
        let mut state = self.state.write().await;
        let current = state
            .generations
            .get(&(key.tenant_id, key.equipment_id))
            .copied()
            .unwrap_or(0);
        if current != generation {
            return;
        }
        if state.entries.len() >= self.max_entries {
            state.entries.clear();
        }
        state.entries.insert(key, value);
    }

    /// Drop every entry for these equipment types
    pub async fn invalidate(&self, tenant_id: Uuid, equipment_ids: &[Uuid]) {
        let mut state = self.state.write().await;
        for equipment_id in equipment_ids {
            *state.generations.entry((tenant_id, *equipment_id)).or_insert(0) += 1;
        }
        state.entries.retain(|key, _| {
            !(key.tenant_id == tenant_id && equipment_ids.contains(&key.equipment_id))
        });
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(tenant_id: Uuid, equipment_id: Uuid) -> CacheKey {
        let day = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        CacheKey {
            tenant_id,
            equipment_id,
            range: DateRange::single_day(day),
            exclude_booking_id: None,
        }
    }

    fn value(quantity: i32) -> CachedAvailability {
        CachedAvailability {
            equipment_name: Some("Tent".into()),
            available_quantity: Some(quantity),
        }
    }

    #[tokio::test]
    async fn test_invalidation_is_per_equipment() {
        let cache = AvailabilityCache::new(100);
        let tenant = Uuid::new_v4();
        let (tent, chair) = (Uuid::new_v4(), Uuid::new_v4());

        cache.insert(key(tenant, tent), 0, value(3)).await;
        cache.insert(key(tenant, chair), 0, value(40)).await;
        assert_eq!(cache.len().await, 2);

        cache.invalidate(tenant, &[tent]).await;
        assert!(cache.get(&key(tenant, tent)).await.is_none());
        assert_eq!(cache.get(&key(tenant, chair)).await, Some(value(40)));
    }

    #[tokio::test]
    async fn test_stale_generation_is_refused() {
        let cache = AvailabilityCache::new(100);
        let tenant = Uuid::new_v4();
        let tent = Uuid::new_v4();

        let generation = cache.generation(tenant, tent).await;
        cache.invalidate(tenant, &[tent]).await;
        cache.insert(key(tenant, tent), generation, value(3)).await;
        assert!(cache.get(&key(tenant, tent)).await.is_none());
    }
}
