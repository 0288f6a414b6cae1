//! OracleMarkets contract access.
//!
//! Calls are ABI-encoded by hand (selector + `ethers::abi::encode`) rather than
//! through generated bindings, so the resolver only depends on the four
//! entry points it actually uses.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::*;
use ethers::utils::keccak256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use crate::chain::types::{ChainError, Market, MarketEnded, MarketState, ResolutionReceipt};
use crate::resolution::types::Outcome;

pub const MARKET_ENDED_SIGNATURE: &str = "MarketEnded(uint256,uint256)";

#[async_trait]
pub trait OracleMarkets: Send + Sync + 'static {
    /// `getMarket(id)`; `MarketNotFound` for unallocated ids
    async fn get_market(&self, market_id: u64) -> Result<Market, ChainError>;

    /// `marketCount()`; errors when the deployed contract has no such accessor
    async fn market_count(&self) -> Result<u64, ChainError>;

    /// `resolveMarket(id, outcome, evidenceHash)`, returning once confirmed
    async fn resolve_market(
        &self,
        market_id: u64,
        outcome_code: u8,
        evidence_hash: [u8; 32],
    ) -> Result<ResolutionReceipt, ChainError>;

    async fn latest_block(&self) -> Result<u64, ChainError>;

    async fn market_ended_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketEnded>, ChainError>;
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EthersOracleMarkets {
    client: Arc<SignerClient>,
    address: Address,
    confirmations: usize,
    confirmation_timeout: Duration,
}

impl EthersOracleMarkets {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        contract_address: &str,
        chain_id: u64,
        confirmations: usize,
        confirmation_timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let provider = Provider::<Http>::try_from(rpc_url)
            .context("Invalid RPC url")?
            .interval(Duration::from_millis(1000));

        let wallet: LocalWallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid signing key")?
            .with_chain_id(chain_id);

        let address: Address = contract_address
            .parse()
            .context("Invalid OracleMarkets address")?;

        info!("Resolver account: {:?}", wallet.address());

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            address,
            confirmations: confirmations.max(1),
            confirmation_timeout,
        })
    }

    async fn call(&self, calldata: Vec<u8>, market_id: Option<u64>) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::new().to(self.address).data(calldata);
        self.client
            .call(&tx.into(), None)
            .await
            .map_err(|e| ChainError::from_rpc(market_id, e.to_string()))
    }
}

#[async_trait]
impl OracleMarkets for EthersOracleMarkets {
    async fn get_market(&self, market_id: u64) -> Result<Market, ChainError> {
        let calldata = encode_call("getMarket(uint256)", &[Token::Uint(U256::from(market_id))]);
        let output = self.call(calldata, Some(market_id)).await?;
        decode_market(market_id, &output)
    }

    async fn market_count(&self) -> Result<u64, ChainError> {
        let output = self.call(encode_call("marketCount()", &[]), None).await?;
        let tokens = abi::decode(&[ParamType::Uint(256)], &output)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        let count = tokens
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .ok_or_else(|| ChainError::Decode("marketCount returned no value".to_string()))?;
        to_u64(count, "marketCount")
    }

    async fn resolve_market(
        &self,
        market_id: u64,
        outcome_code: u8,
        evidence_hash: [u8; 32],
    ) -> Result<ResolutionReceipt, ChainError> {
        let calldata = encode_call(
            "resolveMarket(uint256,uint8,bytes32)",
            &[
                Token::Uint(U256::from(market_id)),
                Token::Uint(U256::from(outcome_code)),
                Token::FixedBytes(evidence_hash.to_vec()),
            ],
        );

        let tx = TransactionRequest::new()
            .to(self.address)
            .data(calldata)
            .from(self.client.address());

        // Estimation surfaces contract reverts (e.g. already resolved) before any gas is spent
        let gas_estimate = self.client
            .estimate_gas(&tx.clone().into(), None)
            .await
            .map_err(|e| ChainError::from_rpc(Some(market_id), e.to_string()))?;
        let tx = tx.gas(gas_estimate * 120 / 100);

        let pending = self.client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let tx_hash = pending.tx_hash();
        info!(market_id, tx_hash = ?tx_hash, "resolveMarket sent, waiting for confirmation");

        let receipt = await_confirmation(
            tx_hash,
            pending.confirmations(self.confirmations),
            self.confirmation_timeout,
        )
        .await;
        if let Err(e) = &receipt {
            warn!(market_id, tx_hash = ?tx_hash, error = %e, "resolveMarket not confirmed");
        }
        receipt
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.client
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn market_ended_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MarketEnded>, ChainError> {
        let filter = Filter::new()
            .address(self.address)
            .topic0(H256::from(keccak256(MARKET_ENDED_SIGNATURE.as_bytes())))
            .from_block(U64::from(from_block))
            .to_block(U64::from(to_block));

        let logs = self.client
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_market_ended(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "skipping undecodable MarketEnded log"),
            }
        }
        Ok(events)
    }
}

/// Wait for `confirmation` under `timeout`, then classify the receipt.
async fn await_confirmation<F, E>(
    tx_hash: H256,
    confirmation: F,
    timeout: Duration,
) -> Result<ResolutionReceipt, ChainError>
where
    F: std::future::Future<Output = Result<Option<TransactionReceipt>, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, confirmation).await {
        Ok(Ok(receipt)) => classify_receipt(tx_hash, receipt),
        Ok(Err(e)) => Err(ChainError::Rpc(e.to_string())),
        Err(_) => Err(ChainError::ConfirmationTimeout(tx_hash, timeout)),
    }
}

/// Only a mined receipt with status 1 and a block number counts as confirmed.
fn classify_receipt(
    tx_hash: H256,
    receipt: Option<TransactionReceipt>,
) -> Result<ResolutionReceipt, ChainError> {
    let receipt = receipt.ok_or(ChainError::Dropped(tx_hash))?;
    if receipt.status != Some(U64::from(1)) {
        return Err(ChainError::Reverted(tx_hash));
    }
    let block_number = receipt
        .block_number
        .ok_or_else(|| ChainError::Decode(format!("receipt for {:?} has no block number", tx_hash)))?;

    Ok(ResolutionReceipt {
        tx_hash,
        block_number: block_number.as_u64(),
    })
}

fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut calldata = keccak256(signature.as_bytes())[..4].to_vec();
    calldata.extend_from_slice(&abi::encode(args));
    calldata
}

fn market_tuple() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(256), // id
        ParamType::Address,   // creator
        ParamType::String,    // title
        ParamType::String,    // description
        ParamType::String,    // category
        ParamType::Uint(256), // endTime
        ParamType::Uint(256), // createdAt
        ParamType::Uint(8),   // state
        ParamType::Uint(8),   // resolution
        ParamType::Uint(256), // oddsYes
        ParamType::Uint(256), // oddsNo
        ParamType::Uint(256), // totalYesPool
        ParamType::Uint(256), // totalNoPool
    ])
}

pub(crate) fn decode_market(market_id: u64, output: &[u8]) -> Result<Market, ChainError> {
    let fields = abi::decode(&[market_tuple()], output)
        .map_err(|e| ChainError::Decode(e.to_string()))?
        .into_iter()
        .next()
        .and_then(Token::into_tuple)
        .ok_or_else(|| bad_field(market_id, "tuple"))?;
    let it = &mut fields.into_iter();

    let id = take(it, market_id, "id", Token::into_uint)?;
    // Solidity mappings return a zeroed struct for unknown keys
    if id.is_zero() {
        return Err(ChainError::MarketNotFound(market_id));
    }

    let creator = take(it, market_id, "creator", Token::into_address)?;
    let title = take(it, market_id, "title", Token::into_string)?;
    let description = take(it, market_id, "description", Token::into_string)?;
    let category = take(it, market_id, "category", Token::into_string)?;
    let end_time = take(it, market_id, "endTime", Token::into_uint)?;
    let created_at = take(it, market_id, "createdAt", Token::into_uint)?;
    let state = take(it, market_id, "state", Token::into_uint)?;
    let resolution = take(it, market_id, "resolution", Token::into_uint)?;
    let odds_yes = take(it, market_id, "oddsYes", Token::into_uint)?;
    let odds_no = take(it, market_id, "oddsNo", Token::into_uint)?;
    let total_yes_pool = take(it, market_id, "totalYesPool", Token::into_uint)?;
    let total_no_pool = take(it, market_id, "totalNoPool", Token::into_uint)?;

    Ok(Market {
        id: to_u64(id, "id")?,
        creator,
        title,
        description,
        category,
        end_time: to_datetime(end_time)?,
        created_at: to_datetime(created_at)?,
        state: MarketState::from_code(to_u64(state, "state")? as u8)
            .ok_or_else(|| bad_field(market_id, "state"))?,
        resolution: Outcome::from_code(to_u64(resolution, "resolution")? as u8)
            .ok_or_else(|| bad_field(market_id, "resolution"))?,
        odds_yes: to_u32(odds_yes, "oddsYes")?,
        odds_no: to_u32(odds_no, "oddsNo")?,
        total_yes_pool,
        total_no_pool,
    })
}

fn take<T>(
    it: &mut impl Iterator<Item = Token>,
    market_id: u64,
    what: &str,
    convert: fn(Token) -> Option<T>,
) -> Result<T, ChainError> {
    it.next().and_then(convert).ok_or_else(|| bad_field(market_id, what))
}

fn bad_field(market_id: u64, what: &str) -> ChainError {
    ChainError::Decode(format!("getMarket({}): bad {}", market_id, what))
}

/// Accepts both `MarketEnded(uint256 indexed marketId, uint256)` and the fully
/// non-indexed layout.
pub(crate) fn decode_market_ended(log: &Log) -> Result<MarketEnded, ChainError> {
    let data: &[u8] = log.data.as_ref();
    let word = |i: usize| -> Result<U256, ChainError> {
        data.get(i * 32..(i + 1) * 32)
            .map(U256::from_big_endian)
            .ok_or_else(|| ChainError::Decode(format!("MarketEnded data too short ({} bytes)", data.len())))
    };

    let (market_id, timestamp) = match log.topics.get(1) {
        Some(topic) => (U256::from_big_endian(topic.as_bytes()), word(0)?),
        None => (word(0)?, word(1)?),
    };

    Ok(MarketEnded {
        market_id: to_u64(market_id, "marketId")?,
        timestamp: to_u64(timestamp, "timestamp")?,
        block_number: log.block_number.map(|b| b.as_u64()),
    })
}

fn to_u64(value: U256, what: &str) -> Result<u64, ChainError> {
    if value.bits() > 64 {
        return Err(ChainError::Decode(format!("{} overflows u64: {}", what, value)));
    }
    Ok(value.low_u64())
}

fn to_u32(value: U256, what: &str) -> Result<u32, ChainError> {
    u32::try_from(to_u64(value, what)?)
        .map_err(|_| ChainError::Decode(format!("{} overflows u32: {}", what, value)))
}

fn to_datetime(secs: U256) -> Result<DateTime<Utc>, ChainError> {
    let secs = to_u64(secs, "timestamp")?;
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .ok_or_else(|| ChainError::Decode(format!("timestamp out of range: {}", secs)))
}
