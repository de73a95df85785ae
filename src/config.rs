use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::faucet::DisbursementPolicy;
use crate::ledger::{Address, Wei};

pub const DEFAULT_CONFIG_PATH: &str = "config/faucet.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FaucetConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub faucet: PayoutSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    pub discord: Option<DiscordSettings>,
    pub telegram: Option<TelegramSettings>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LedgerSettings {
    #[serde(default)]
    pub http_provider: String,
    #[serde(default)]
    pub sender_address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub signer_endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PayoutSettings {
    /// Whole coins per disbursement, as a decimal string.
    #[serde(default)]
    pub amount: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_submission_timeout_secs")]
    pub submission_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Deserialize, Clone)]
pub struct DiscordSettings {
    pub token: String,
    pub guild_id: Option<u64>,
}

#[derive(Deserialize, Clone)]
pub struct TelegramSettings {
    pub token: String,
}

fn default_chain_id() -> u64 {
    1
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_symbol() -> String {
    "coin".to_string()
}

fn default_cooldown_secs() -> u64 {
    60 * 60 * 24
}

fn default_submission_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> PathBuf {
    PathBuf::from("db/faucet.db")
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            http_provider: String::new(),
            sender_address: String::new(),
            chain_id: default_chain_id(),
            signer_endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PayoutSettings {
    fn default() -> Self {
        PayoutSettings {
            amount: String::new(),
            symbol: default_symbol(),
            cooldown_secs: default_cooldown_secs(),
            submission_timeout_secs: default_submission_timeout_secs(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings { path: default_database_path() }
    }
}

impl fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSettings").field("token", &"[REDACTED]").field("guild_id", &self.guild_id).finish()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings").field("token", &"[REDACTED]").finish()
    }
}

impl FaucetConfig {
    /// Reads `$FAUCET_CONFIG` (or `config/faucet.yaml` if present), applies
    /// environment overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FAUCET_CONFIG").map(PathBuf::from).ok();
        let mut config = match path {
            Some(path) => Self::from_yaml_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))?,
            None => FaucetConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Variable names match the keys of the deployment `.env` file.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("HTTP_PROVIDER") {
            self.ledger.http_provider = value;
        }
        if let Some(value) = lookup("SENDER_ADDRESS") {
            self.ledger.sender_address = value;
        }
        if let Some(value) = lookup("CHAIN_ID") {
            self.ledger.chain_id = parse_number("CHAIN_ID", &value)?;
        }
        if let Some(value) = lookup("SIGNER_ENDPOINT") {
            self.ledger.signer_endpoint = Some(value);
        }
        if let Some(value) = lookup("FAUCET_AMOUNT") {
            self.faucet.amount = value;
        }
        if let Some(value) = lookup("FAUCET_SYMBOL") {
            self.faucet.symbol = value;
        }
        if let Some(value) = lookup("FAUCET_COOLDOWN_SECS") {
            self.faucet.cooldown_secs = parse_number("FAUCET_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = lookup("FAUCET_DB_PATH") {
            self.database.path = PathBuf::from(value);
        }
        if let Some(token) = lookup("DISCORD_TOKEN") {
            let guild_id = match lookup("DISCORD_GUILD_ID") {
                Some(value) => Some(parse_number("DISCORD_GUILD_ID", &value)?),
                None => self.discord.as_ref().and_then(|discord| discord.guild_id),
            };
            self.discord = Some(DiscordSettings { token, guild_id });
        }
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram = Some(TelegramSettings { token });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.http_provider.trim().is_empty() {
            return Err(ConfigError::Missing("ledger.http_provider"));
        }
        self.sender_address()?;
        self.policy()?;
        if self.discord.is_none() && self.telegram.is_none() {
            return Err(ConfigError::Missing("discord.token or telegram.token"));
        }
        Ok(())
    }

    pub fn sender_address(&self) -> Result<Address, ConfigError> {
        if self.ledger.sender_address.trim().is_empty() {
            return Err(ConfigError::Missing("ledger.sender_address"));
        }
        self.ledger.sender_address.parse().map_err(|e: crate::ledger::AddressError| ConfigError::Invalid {
            key: "ledger.sender_address",
            reason: e.to_string(),
        })
    }

    pub fn policy(&self) -> Result<DisbursementPolicy, ConfigError> {
        if self.faucet.amount.trim().is_empty() {
            return Err(ConfigError::Missing("faucet.amount"));
        }
        let amount = Wei::from_coins(&self.faucet.amount).map_err(|e| ConfigError::Invalid { key: "faucet.amount", reason: e.to_string() })?;
        if self.faucet.cooldown_secs == 0 {
            return Err(ConfigError::Invalid { key: "faucet.cooldown_secs", reason: "must be positive".to_string() });
        }
        if self.faucet.submission_timeout_secs == 0 {
            return Err(ConfigError::Invalid { key: "faucet.submission_timeout_secs", reason: "must be positive".to_string() });
        }

        Ok(DisbursementPolicy {
            amount,
            cooldown_window: Duration::from_secs(self.faucet.cooldown_secs),
            submission_timeout: Duration::from_secs(self.faucet.submission_timeout_secs),
        })
    }

    /// `100 coin`, as shown to users.
    pub fn payout_label(&self) -> String {
        format!("{} {}", self.faucet.amount.trim(), self.faucet.symbol)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.request_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}
