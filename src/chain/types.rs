use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::Serialize;
use crate::resolution::types::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketState {
    Draft = 0,
    Active = 1,
    Ended = 2,
    Resolved = 3,
    Cancelled = 4,
    Refunded = 5,
}

impl MarketState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MarketState::Draft),
            1 => Some(MarketState::Active),
            2 => Some(MarketState::Ended),
            3 => Some(MarketState::Resolved),
            4 => Some(MarketState::Cancelled),
            5 => Some(MarketState::Refunded),
            _ => None,
        }
    }
}

/// Market as returned by `getMarket`. Read-only to the resolver.
#[derive(Debug, Clone)]
pub struct Market {
    pub id: u64,
    pub creator: Address,
    pub title: String,
    pub description: String,
    pub category: String,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub state: MarketState,
    pub resolution: Outcome,
    pub odds_yes: u32,
    pub odds_no: u32,
    pub total_yes_pool: U256,
    pub total_no_pool: U256,
}

/// Decoded `MarketEnded(marketId, timestamp)` log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEnded {
    pub market_id: u64,
    pub timestamp: u64,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Market #{0} does not exist")]
    MarketNotFound(u64),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("RPC call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transaction {0:?} reverted")]
    Reverted(H256),

    #[error("Transaction {0:?} not confirmed within {1:?}")]
    ConfirmationTimeout(H256, std::time::Duration),

    #[error("Transaction {0:?} dropped from mempool")]
    Dropped(H256),
}

impl ChainError {
    /// Classify a provider/middleware error message
    pub fn from_rpc(market_id: Option<u64>, message: String) -> Self {
        match market_id {
            Some(id) if message.contains("does not exist") => ChainError::MarketNotFound(id),
            _ => ChainError::Rpc(message),
        }
    }
}
