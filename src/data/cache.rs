use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Short-lived quote cache shared by concurrently handled markets.
pub struct PriceCache {
    cache: DashMap<String, CachedPrice>,
    ttl: Duration,
}

struct CachedPrice {
    price: Option<f64>,
    fetched_at: Instant,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    /// `price` of `None` caches a confirmed "no quote" answer as well
    pub fn insert(&self, coin_id: &str, price: Option<f64>) {
        self.cache.insert(coin_id.to_string(), CachedPrice {
            price,
            fetched_at: Instant::now(),
        });
    }

    /// Outer `None` = miss or expired (evicted on read)
    pub fn get(&self, coin_id: &str) -> Option<Option<f64>> {
        let entry = self.cache.get(coin_id)?;
        if entry.fetched_at.elapsed() > self.ttl {
            drop(entry); // release the shard read lock before removing
            self.cache.remove(coin_id);
            None
        } else {
            Some(entry.price)
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}
