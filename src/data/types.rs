use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Evidence gathered for one resolution attempt. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalDataSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<SourceRecord>,
}

impl ExternalDataSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRecord {
    /// USD price per coin id; `None` when the feed had no quote for it
    PriceData {
        #[serde(flatten)]
        prices: BTreeMap<String, Option<f64>>,
    },
    /// Total value locked in USD per protocol slug
    TvlData {
        #[serde(flatten)]
        tvl_usd: BTreeMap<String, f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_serializes_tagged_sources() {
        let mut prices = BTreeMap::new();
        prices.insert("bitcoin".to_string(), Some(65000.5));
        prices.insert("ethereum".to_string(), None);

        let snapshot = ExternalDataSnapshot {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            sources: vec![SourceRecord::PriceData { prices }],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": 1_700_000_000_123i64,
                "sources": [{ "type": "price_data", "bitcoin": 65000.5, "ethereum": null }]
            })
        );
    }
}
