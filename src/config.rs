//! Configuration: a TOML file layered over built-in network profiles.
//!
//! Precedence, highest first: explicit environment overrides (`RPC_URL`, `CONTRACT_ADDRESS`,
//! `PRIVATE_KEY`, `VERIFIER_API_KEY`, `DA_LAYER_API_KEY`, `TWITTER_BEARER_TOKEN`), file values
//! (which may be `env:VAR` references), then the profile defaults.

use crate::da_layer::{COSTON2_FIRST_VOTING_ROUND_START_TS, VOTING_EPOCH_DURATION_SECS};
use crate::error::ConfigError;
use crate::poll::PollPolicy;
use crate::social::{parse_wallet_address, TwitterApiResolver};
use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::{Address, U256};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// First Hardhat development account. Only ever used on the `hardhat` network.
pub const HARDHAT_DEV_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const COSTON2_CONTRACT: &str = "0xC14d5D0e0f16036F54842E212e65E62aA46170bF";
pub const COSTON2_FDC_HUB: &str = "0x3E52461BE1E4FEFBF1CB98C0189F14CB96608C56";
pub const COSTON2_FDC_VERIFICATION: &str = "0x07F96C4EB1FF75E0E626169A9D7C278D46655BC3";

const DEFAULT_VERIFIER_URL: &str = "https://jq-verifier-test.flare.rocks";
const DEFAULT_DA_LAYER_URL: &str = "https://ctn2-data-availability.flare.network";
const DEFAULT_FEE: &str = "0.001";
const DEFAULT_NETWORK: &str = "coston2";

pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_ATTESTATION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const PLACEHOLDER_KEYS: [&str; 2] = ["your_wallet_private_key", "0xyour_wallet_private_key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkProfile {
    pub name: &'static str,
    pub chain_id: u64,
    pub rpc_url: &'static str,
    pub explorer_url: Option<&'static str>,
    pub currency: &'static str,
    pub contract: Option<&'static str>,
}

pub const PROFILES: [NetworkProfile; 3] = [
    NetworkProfile {
        name: "hardhat",
        chain_id: 31337,
        rpc_url: "http://127.0.0.1:8545",
        explorer_url: None,
        currency: "ETH",
        contract: None,
    },
    NetworkProfile {
        name: "coston",
        chain_id: 16,
        rpc_url: "https://coston-api.flare.network/ext/C/rpc",
        explorer_url: Some("https://coston-explorer.flare.network"),
        currency: "CFLR",
        contract: None,
    },
    NetworkProfile {
        name: "coston2",
        chain_id: 114,
        rpc_url: "https://coston2-api.flare.network/ext/C/rpc",
        explorer_url: Some("https://coston2-explorer.flare.network"),
        currency: "C2FLR",
        contract: Some(COSTON2_CONTRACT),
    },
];

impl NetworkProfile {
    pub fn lookup(name: &str) -> Option<&'static NetworkProfile> {
        PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    network: RawNetwork,
    contract: RawContract,
    attestation: RawAttestation,
    wallet: RawWallet,
    twitter: RawTwitter,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawNetwork {
    name: Option<String>,
    chain_id: Option<u64>,
    rpc_url: Option<String>,
    explorer_url: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawContract {
    address: Option<String>,
    fee: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawAttestation {
    verifier_url: Option<String>,
    verifier_api_key: Option<String>,
    da_layer_url: Option<String>,
    da_layer_api_key: Option<String>,
    poll_interval_secs: Option<u64>,
    max_poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    first_voting_round_start: Option<u64>,
    voting_epoch_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawWallet {
    private_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTwitter {
    api_url: Option<String>,
    bearer_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: Option<String>,
    pub currency: String,
}

impl NetworkConfig {
    pub fn is_hardhat(&self) -> bool {
        self.name.eq_ignore_ascii_case("hardhat")
    }

    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|e| format!("{}/tx/{tx_hash}", e.trim_end_matches('/')))
    }

    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|e| format!("{}/address/{address}", e.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractConfig {
    pub address: Option<Address>,
    pub fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationConfig {
    pub verifier_url: String,
    pub verifier_api_key: Option<String>,
    pub da_layer_url: String,
    pub da_layer_api_key: Option<String>,
    pub poll: PollPolicy,
    pub first_voting_round_start: u64,
    pub voting_epoch_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterConfig {
    pub api_url: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contract: ContractConfig,
    pub attestation: AttestationConfig,
    pub twitter: TwitterConfig,
    private_key: Option<String>,
}

/// Trims, adds a missing `0x` and rejects placeholders or anything that is not 32 hex bytes.
pub fn normalize_private_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDER_KEYS.contains(&trimmed) {
        return None;
    }
    let key = if trimmed.starts_with("0x") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    };
    if key.len() != 66 || !key[2..].bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(key)
}

/// Resolves `env:VAR` references; other values pass through.
fn resolve_value<F>(value: Option<String>, env: &F) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = value else {
        return Ok(None);
    };
    let Some(var) = value.strip_prefix("env:") else {
        return Ok(Some(value));
    };
    let var = var.trim();
    if var.is_empty() || !var.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(ConfigError::InvalidEnvRef(value));
    }
    match env(var) {
        Some(v) => Ok(Some(v)),
        None => Err(ConfigError::MissingEnv {
            var: var.to_string(),
            value,
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Reads `path` (if any) and resolves it against the process environment.
    pub fn load(path: Option<&Path>, network: Option<&str>) -> Result<Self, ConfigError> {
        let text = match path {
            Some(p) => std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                path: p.display().to_string(),
                source,
            })?,
            None => String::new(),
        };
        Self::from_toml_str(&text, network, |var| std::env::var(var).ok())
    }

    pub fn from_toml_str<F>(text: &str, network: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(text)?;
        Self::resolve(raw, network, &env)
    }

    fn resolve<F>(raw: RawConfig, network: Option<&str>, env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = network
            .map(str::to_string)
            .or(raw.network.name.clone())
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string());
        let profile = NetworkProfile::lookup(&name);

        let file_rpc = resolve_value(raw.network.rpc_url, env)?;
        let rpc_url = non_empty(env("RPC_URL"))
            .or(file_rpc)
            .or(profile.map(|p| p.rpc_url.to_string()));
        let chain_id = raw.network.chain_id.or(profile.map(|p| p.chain_id));
        let (rpc_url, chain_id) = match (rpc_url, chain_id) {
            (Some(r), Some(c)) => (r, c),
            _ if profile.is_none() => return Err(ConfigError::UnknownNetwork(name)),
            _ => return Err(ConfigError::Invalid(format!("network {name} is incomplete"))),
        };
        let network = NetworkConfig {
            name: profile.map_or(name.clone(), |p| p.name.to_string()),
            chain_id,
            rpc_url,
            explorer_url: raw
                .network
                .explorer_url
                .or(profile.and_then(|p| p.explorer_url.map(str::to_string))),
            currency: raw
                .network
                .currency
                .or(profile.map(|p| p.currency.to_string()))
                .unwrap_or_else(|| "ETH".to_string()),
        };

        let address = match non_empty(env("CONTRACT_ADDRESS"))
            .or(resolve_value(raw.contract.address, env)?)
            .or(profile.and_then(|p| p.contract.map(str::to_string)))
        {
            Some(a) => Some(
                parse_wallet_address(&a)
                    .map_err(|e| ConfigError::Invalid(format!("contract address: {e}")))?,
            ),
            None => None,
        };
        let fee_text = raw.contract.fee.unwrap_or_else(|| DEFAULT_FEE.to_string());
        let fee = parse_ether(fee_text.trim())
            .map_err(|e| ConfigError::Invalid(format!("fee {fee_text:?}: {e}")))?;

        let a = raw.attestation;
        let interval = a.poll_interval_secs.unwrap_or(15);
        let poll = PollPolicy {
            interval: Duration::from_secs(interval),
            max_interval: Duration::from_secs(a.max_poll_interval_secs.unwrap_or(60).max(interval)),
            timeout: Duration::from_secs(a.timeout_secs.unwrap_or(600)),
        };
        let attestation = AttestationConfig {
            verifier_url: a
                .verifier_url
                .unwrap_or_else(|| DEFAULT_VERIFIER_URL.to_string()),
            verifier_api_key: non_empty(env("VERIFIER_API_KEY"))
                .or(resolve_value(a.verifier_api_key, env)?),
            da_layer_url: a
                .da_layer_url
                .unwrap_or_else(|| DEFAULT_DA_LAYER_URL.to_string()),
            da_layer_api_key: non_empty(env("DA_LAYER_API_KEY"))
                .or(resolve_value(a.da_layer_api_key, env)?),
            poll,
            first_voting_round_start: a
                .first_voting_round_start
                .unwrap_or(COSTON2_FIRST_VOTING_ROUND_START_TS),
            voting_epoch_secs: a.voting_epoch_secs.unwrap_or(VOTING_EPOCH_DURATION_SECS),
        };

        let twitter = TwitterConfig {
            api_url: raw
                .twitter
                .api_url
                .unwrap_or_else(|| TwitterApiResolver::DEFAULT_BASE_URL.to_string()),
            bearer_token: non_empty(env("TWITTER_BEARER_TOKEN"))
                .or(resolve_value(raw.twitter.bearer_token, env)?),
        };

        let private_key =
            non_empty(env("PRIVATE_KEY")).or(resolve_value(raw.wallet.private_key, env)?);

        let config = Self {
            network,
            contract: ContractConfig { address, fee },
            attestation,
            twitter,
            private_key,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.network.chain_id == 0 {
            return Err(ConfigError::Invalid("chain_id must be > 0".into()));
        }
        if url::Url::parse(&self.network.rpc_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "rpc_url is not a url: {}",
                self.network.rpc_url
            )));
        }
        let poll = &self.attestation.poll;
        if poll.interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if poll.max_interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "poll intervals must be <= {}s",
                MAX_POLL_INTERVAL.as_secs()
            )));
        }
        if poll.timeout.is_zero() || poll.timeout > MAX_ATTESTATION_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be between 1 and {}",
                MAX_ATTESTATION_TIMEOUT.as_secs()
            )));
        }
        if self.attestation.voting_epoch_secs == 0 {
            return Err(ConfigError::Invalid("voting_epoch_secs must be > 0".into()));
        }
        Ok(())
    }

    /// The key to sign with. Hardhat falls back to the first development account.
    pub fn signing_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.private_key.as_deref().and_then(normalize_private_key) {
            return Ok(key);
        }
        if self.network.is_hardhat() {
            warn!("no usable PRIVATE_KEY; using the hardhat development account");
            return Ok(HARDHAT_DEV_KEY.to_string());
        }
        Err(ConfigError::MissingPrivateKey(self.network.name.clone()))
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        self.contract.address.ok_or_else(|| {
            ConfigError::Invalid(format!(
                "no contract address for network {}; set CONTRACT_ADDRESS",
                self.network.name
            ))
        })
    }

    /// Resolved settings for display, with secrets masked.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        fn secret(v: &Option<String>) -> String {
            match v {
                Some(_) => "<set>".to_string(),
                None => "<unset>".to_string(),
            }
        }
        vec![
            ("network", self.network.name.clone()),
            ("chain_id", self.network.chain_id.to_string()),
            ("rpc_url", self.network.rpc_url.clone()),
            (
                "explorer_url",
                self.network.explorer_url.clone().unwrap_or_default(),
            ),
            (
                "contract",
                self.contract
                    .address
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "<unset>".into()),
            ),
            (
                "fee",
                format!("{} {}", format_ether(self.contract.fee), self.network.currency),
            ),
            ("verifier_url", self.attestation.verifier_url.clone()),
            ("verifier_api_key", secret(&self.attestation.verifier_api_key)),
            ("da_layer_url", self.attestation.da_layer_url.clone()),
            ("da_layer_api_key", secret(&self.attestation.da_layer_api_key)),
            (
                "poll",
                format!(
                    "every {:?} (max {:?}), timeout {:?}",
                    self.attestation.poll.interval,
                    self.attestation.poll.max_interval,
                    self.attestation.poll.timeout
                ),
            ),
            ("twitter_api_url", self.twitter.api_url.clone()),
            ("twitter_bearer_token", secret(&self.twitter.bearer_token)),
            ("private_key", secret(&self.private_key)),
        ]
    }
}
