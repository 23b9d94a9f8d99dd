use std::time::Duration;

use crate::error::{Result, SettlementError};

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// External ledger JSON-RPC endpoint.
    pub rpc_endpoint: String,
    /// Oracle program the settlement instruction targets.
    pub oracle_program_id: Option<String>,
    /// Base58 keypair used to sign submissions.
    pub oracle_wallet_key: Option<String>,
    /// "mainnet" or "devnet".
    pub network: String,
    /// Allow deterministic placeholder references when credentials are
    /// unconfigured. Refused on mainnet.
    pub mock_submission: bool,

    /// Logical topic name for announcement events.
    pub winners_topic: String,

    /// Seconds between confirmation poll sweeps.
    pub poll_interval_secs: u64,
    /// Deadline after which an unconfirmed submission is declared failed.
    pub confirmation_timeout_secs: u64,
    /// Per-request timeout for ledger RPC calls. Must stay shorter than the
    /// confirmation deadline so one slow call cannot stall a sweep past it.
    pub rpc_timeout_secs: u64,

    /// Annual announcement date, UTC (month, day, hour).
    pub announcement_month: u32,
    pub announcement_day: u32,
    pub announcement_hour: u32,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| SettlementError::Config(format!("invalid {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| SettlementError::Config("DATABASE_URL must be set".into()))?,
            bind_address: env_or("BIND_ADDRESS", "127.0.0.1:3000"),
            rpc_endpoint: env_or("LEDGER_RPC_ENDPOINT", "https://api.mainnet-beta.solana.com"),
            oracle_program_id: std::env::var("ORACLE_PROGRAM_ID").ok().filter(|v| !v.is_empty()),
            oracle_wallet_key: std::env::var("ORACLE_WALLET_KEY").ok().filter(|v| !v.is_empty()),
            network: env_or("LEDGER_NETWORK", "mainnet"),
            mock_submission: env_parse("MOCK_SUBMISSION", false)?,
            winners_topic: env_or("WINNERS_TOPIC", "league-winners-announced"),
            poll_interval_secs: env_parse("CONFIRMATION_POLL_INTERVAL_SECS", 30)?,
            confirmation_timeout_secs: env_parse("CONFIRMATION_TIMEOUT_SECS", 300)?,
            rpc_timeout_secs: env_parse("LEDGER_RPC_TIMEOUT_SECS", 10)?,
            announcement_month: env_parse("ANNOUNCEMENT_MONTH", 6)?,
            announcement_day: env_parse("ANNOUNCEMENT_DAY", 7)?,
            announcement_hour: env_parse("ANNOUNCEMENT_HOUR", 0)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_timeout_secs >= self.confirmation_timeout_secs {
            return Err(SettlementError::Config(
                "LEDGER_RPC_TIMEOUT_SECS must be shorter than CONFIRMATION_TIMEOUT_SECS".into(),
            ));
        }
        if self.mock_submission && self.network == "mainnet" {
            return Err(SettlementError::Config(
                "MOCK_SUBMISSION is not allowed on mainnet".into(),
            ));
        }
        if !(1..=12).contains(&self.announcement_month)
            || !(1..=31).contains(&self.announcement_day)
            || self.announcement_hour > 23
        {
            return Err(SettlementError::Config("invalid announcement schedule".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn confirmation_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.confirmation_timeout_secs as i64)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
