pub mod aggregator;
pub mod cache;
pub mod coingecko;
pub mod defillama;
pub mod types;
