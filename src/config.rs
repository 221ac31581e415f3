// src/config.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H160};
use serde::{Deserialize, Serialize};

use crate::error::PaymasterError;
use crate::signed::PriceProtocol;

/// Entry point v0.6, deployed at the same address on every supported chain.
/// `0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789`
pub const DEFAULT_ENTRY_POINT: Address = H160([
    0x5f, 0xf1, 0x37, 0xd4, 0xb0, 0xfd, 0xcd, 0x49, 0xdc, 0xa3, 0x0c, 0x7c, 0xf5, 0x7e, 0x57, 0x8a,
    0x02, 0x6d, 0x27, 0x89,
]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub oracle: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAssets {
    pub native_asset: String,
    pub native_asset_oracle: Address,
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenConfig>,
}

/// Token and oracle addresses per chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainAssets>,
}

impl ChainRegistry {
    pub fn new(chains: BTreeMap<u64, ChainAssets>) -> Self {
        Self { chains }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid chain registry")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read chain registry {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn chain(&self, chain_id: u64) -> Result<&ChainAssets, PaymasterError> {
        self.chains
            .get(&chain_id)
            .ok_or(PaymasterError::UnsupportedChain(chain_id))
    }

    pub fn token(&self, chain_id: u64, symbol: &str) -> Result<&TokenConfig, PaymasterError> {
        self.chain(chain_id)?
            .tokens
            .get(&symbol.to_ascii_uppercase())
            .ok_or_else(|| PaymasterError::UnsupportedToken {
                chain_id,
                token: symbol.to_string(),
            })
    }

    pub fn native_oracle(&self, chain_id: u64) -> Result<Address, PaymasterError> {
        Ok(self.chain(chain_id)?.native_asset_oracle)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }
}

/// Settings for one sponsoring paymaster deployment.
#[derive(Debug, Clone)]
pub struct SponsorConfig {
    pub paymaster_address: Address,
    pub chain_id: u64,
    pub entry_point: Address,
    pub price_signer_key: Option<String>,
    pub quote_valid_period: u64,
    pub protocol: PriceProtocol,
    pub chain_registry: Option<PathBuf>,
}

impl SponsorConfig {
    /// Loads settings from the process environment, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));

        let paymaster_address = required("PAYMASTER_ADDRESS")?
            .parse::<Address>()
            .context("Invalid PAYMASTER_ADDRESS")?;
        let chain_id = required("CHAIN_ID")?
            .parse::<u64>()
            .context("Invalid CHAIN_ID")?;
        let quote_valid_period = required("QUOTE_VALID_PERIOD_SECS")?
            .parse::<u64>()
            .context("Invalid QUOTE_VALID_PERIOD_SECS")?;
        if quote_valid_period == 0 {
            return Err(anyhow!("QUOTE_VALID_PERIOD_SECS must be positive"));
        }

        let entry_point = lookup("ENTRY_POINT")
            .map(|value| value.parse::<Address>())
            .transpose()
            .context("Invalid ENTRY_POINT")?
            .unwrap_or(DEFAULT_ENTRY_POINT);

        let protocol = match lookup("PRICE_PROTOCOL").as_deref() {
            None | Some("pimlico") => PriceProtocol::PIMLICO,
            Some("erc20-paymaster") => PriceProtocol::ERC20_PAYMASTER,
            Some(other) => return Err(anyhow!("Unknown PRICE_PROTOCOL {other}")),
        };

        Ok(Self {
            paymaster_address,
            chain_id,
            entry_point,
            price_signer_key: lookup("PRICE_SIGNER_KEY"),
            quote_valid_period,
            protocol,
            chain_registry: lookup("CHAIN_REGISTRY").map(PathBuf::from),
        })
    }

    /// The price signer, if this deployment signs quotes.
    pub fn price_signer(&self) -> Result<Option<LocalWallet>> {
        self.price_signer_key
            .as_deref()
            .map(|key| {
                key.parse::<LocalWallet>()
                    .map(|wallet| wallet.with_chain_id(self.chain_id))
                    .context("Invalid PRICE_SIGNER_KEY")
            })
            .transpose()
    }

    pub fn load_registry(&self) -> Result<ChainRegistry> {
        match &self.chain_registry {
            Some(path) => ChainRegistry::from_file(path),
            None => Ok(ChainRegistry::default()),
        }
    }
}
