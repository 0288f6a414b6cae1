use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    InFlight,
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimRejected {
    #[error("market already resolved by this resolver")]
    AlreadyProcessed,
    #[error("market is being handled by another trigger")]
    InFlight,
}

/// Per-market claim table. Processed entries are never removed.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    slots: DashMap<u64, Slot>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move `market_id` from unclaimed to in-flight.
    pub fn try_claim(self: &Arc<Self>, market_id: u64) -> Result<MarketClaim, ClaimRejected> {
        match self.slots.entry(market_id) {
            Entry::Occupied(slot) => Err(match slot.get() {
                Slot::Processed => ClaimRejected::AlreadyProcessed,
                Slot::InFlight => ClaimRejected::InFlight,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Slot::InFlight);
                Ok(MarketClaim {
                    guard: Arc::clone(self),
                    market_id,
                    committed: false,
                })
            }
        }
    }

    pub fn is_processed(&self, market_id: u64) -> bool {
        matches!(self.slots.get(&market_id).as_deref(), Some(Slot::Processed))
    }

    /// Start-up restore from persisted resolutions.
    pub fn mark_processed(&self, market_id: u64) {
        self.slots.insert(market_id, Slot::Processed);
    }

    pub fn processed_count(&self) -> usize {
        self.slots.iter().filter(|e| *e.value() == Slot::Processed).count()
    }
}

/// Exclusive right to handle one market. Dropping without `commit` releases it.
#[derive(Debug)]
pub struct MarketClaim {
    guard: Arc<IdempotencyGuard>,
    market_id: u64,
    committed: bool,
}

impl MarketClaim {
    pub fn market_id(&self) -> u64 {
        self.market_id
    }

    pub fn commit(mut self) {
        self.guard.slots.insert(self.market_id, Slot::Processed);
        self.committed = true;
    }
}

impl Drop for MarketClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.guard
                .slots
                .remove_if(&self.market_id, |_, slot| *slot == Slot::InFlight);
        }
    }
}
