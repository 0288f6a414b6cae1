use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub resolver: ResolverConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub dry_run: bool,
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_min_odds")]
    pub min_odds: u32,
    #[serde(default = "default_max_odds")]
    pub max_odds: u32,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Upper bound for the first-gap scan when the contract has no count accessor
    #[serde(default = "default_max_scan_markets")]
    pub max_scan_markets: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_event_poll_interval")]
    pub event_poll_interval_secs: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub rpc_max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_defillama_url")]
    pub defillama_url: String,
    #[serde(default = "default_price_coins")]
    pub price_coins: Vec<String>,
    #[serde(default = "default_defi_protocols")]
    pub defi_protocols: Vec<String>,
    #[serde(default = "default_data_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_price_cache_ttl")]
    pub price_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_path")]
    pub csv_log_path: String,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_min_odds() -> u32 {
    9000
}

fn default_max_odds() -> u32 {
    9500
}

fn default_scan_interval() -> u64 {
    300
}

fn default_max_scan_markets() -> u64 {
    100
}

fn default_confirmations() -> usize {
    1
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_event_poll_interval() -> u64 {
    5
}

fn default_max_block_range() -> u64 {
    2000
}

fn default_rpc_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_reasoning_timeout() -> u64 {
    60
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_defillama_url() -> String {
    "https://api.llama.fi".to_string()
}

fn default_price_coins() -> Vec<String> {
    vec!["bitcoin".to_string(), "ethereum".to_string()]
}

fn default_defi_protocols() -> Vec<String> {
    vec!["uniswap".to_string(), "aave".to_string()]
}

fn default_data_timeout() -> u64 {
    10
}

fn default_price_cache_ttl() -> u64 {
    60
}

fn default_csv_path() -> String {
    "resolutions.csv".to_string()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_url(),
            model: default_gemini_model(),
            timeout_secs: default_reasoning_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            defillama_url: default_defillama_url(),
            price_coins: default_price_coins(),
            defi_protocols: default_defi_protocols(),
            timeout_secs: default_data_timeout(),
            max_retries: default_max_retries(),
            price_cache_ttl_secs: default_price_cache_ttl(),
        }
    }
}

impl ChainConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Bound on a whole resolve: estimate, send, then confirmation
    pub fn write_timeout(&self) -> Duration {
        self.confirmation_timeout() + self.rpc_timeout() * 2
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub oracle_markets_address: String,
    pub gemini_api_key: String,
    pub chain_id: Option<u64>,
    pub coingecko_url: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub min_odds: Option<u32>,
    pub max_odds: Option<u32>,
    pub dry_run: Option<bool>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Environment values win over the file, matching how operators tune a running deployment.
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<()> {
        if let Some(chain_id) = env.chain_id {
            self.chain.chain_id = chain_id;
        }
        if let Some(url) = &env.coingecko_url {
            self.data.coingecko_url = url.clone();
        }
        if let Some(threshold) = env.confidence_threshold {
            self.resolver.confidence_threshold = threshold;
        }
        if let Some(min_odds) = env.min_odds {
            self.resolver.min_odds = min_odds;
        }
        if let Some(max_odds) = env.max_odds {
            self.resolver.max_odds = max_odds;
        }
        if let Some(dry_run) = env.dry_run {
            self.system.dry_run = dry_run;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.resolver;
        if !(0.0..=1.0).contains(&r.confidence_threshold) {
            bail!("confidence_threshold must be within [0, 1], got {}", r.confidence_threshold);
        }
        if r.min_odds > r.max_odds {
            bail!("min_odds ({}) exceeds max_odds ({})", r.min_odds, r.max_odds);
        }
        if r.max_odds > 10_000 {
            bail!("max_odds must be at most 10000 basis points, got {}", r.max_odds);
        }
        if r.scan_interval_secs == 0 || self.chain.event_poll_interval_secs == 0 {
            bail!("scan and event poll intervals must be non-zero");
        }
        if self.chain.max_block_range == 0 {
            bail!("max_block_range must be non-zero");
        }
        Ok(())
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            rpc_url: std::env::var("PUSHCHAIN_RPC")
                .context("PUSHCHAIN_RPC not set")?,
            private_key: std::env::var("PRIVATE_KEY")
                .context("PRIVATE_KEY not set")?,
            oracle_markets_address: std::env::var("ORACLE_MARKETS_ADDRESS")
                .context("ORACLE_MARKETS_ADDRESS not set")?,
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .context("GEMINI_API_KEY not set")?,
            chain_id: parse_optional("PUSHCHAIN_CHAIN_ID")?,
            coingecko_url: std::env::var("COINGECKO_API").ok(),
            confidence_threshold: parse_optional("CONFIDENCE_THRESHOLD")?,
            min_odds: parse_optional("MIN_ODDS")?,
            max_odds: parse_optional("MAX_ODDS")?,
            dry_run: parse_optional("DRY_RUN")?,
        })
    }
}

fn parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [system]
        dry_run = false
        database_path = "oracle.db"

        [resolver]
        confidence_threshold = 0.8

        [chain]
        chain_id = 42101
    "#;

    fn env() -> EnvConfig {
        EnvConfig {
            rpc_url: "http://localhost:8545".to_string(),
            private_key: "0x01".to_string(),
            oracle_markets_address: "0x0000000000000000000000000000000000000001".to_string(),
            gemini_api_key: "key".to_string(),
            chain_id: None,
            coingecko_url: None,
            confidence_threshold: None,
            min_odds: None,
            max_odds: None,
            dry_run: None,
        }
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.resolver.confidence_threshold, 0.8);
        assert_eq!(config.resolver.min_odds, 9000);
        assert_eq!(config.resolver.max_odds, 9500);
        assert_eq!(config.chain.confirmations, 1);
        assert_eq!(config.data.price_coins, vec!["bitcoin", "ethereum"]);
        assert!(!config.monitoring.csv_logging);
        assert_eq!(config.resolver.scan_interval_secs, 300);
        assert_eq!(config.chain.max_block_range, 2000);
        assert_eq!(config.monitoring.csv_log_path, "resolutions.csv");
    }

    #[test]
    fn test_write_timeout_covers_confirmation_and_rpc() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.chain.write_timeout(), Duration::from_secs(120 + 2 * 15));
    }

    #[test]
    fn test_rejects_inverted_odds_range() {
        let toml = SAMPLE.replace(
            "confidence_threshold = 0.8",
            "min_odds = 9600\nmax_odds = 9500",
        );
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_threshold_above_one() {
        let toml = SAMPLE.replace("0.8", "1.5");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        let mut env = env();
        env.confidence_threshold = Some(0.9);
        env.max_odds = Some(9800);
        env.dry_run = Some(true);

        config.apply_env(&env).unwrap();

        assert_eq!(config.resolver.confidence_threshold, 0.9);
        assert_eq!(config.resolver.max_odds, 9800);
        assert!(config.system.dry_run);
    }

    #[test]
    fn test_env_override_is_validated() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        let mut env = env();
        env.min_odds = Some(9900);

        assert!(config.apply_env(&env).is_err());
    }
}
