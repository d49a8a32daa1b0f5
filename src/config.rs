//! Ledger configuration
//!
//! Nothing here is process-wide: every entity receives its hasher, encoder
//! and parameters from a [`LedgerConfig`] handed to its constructor.

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::encoding::Encoders;
use crate::error::{LedgerError, Result};
use crate::formula::{DataFormula, DefaultDiff};
use crate::hash::{Hash, Hashers};
use crate::types::{Payout, PrecisionContext};

/// Block size limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    /// Maximum approximate size of a block, in bytes
    pub block_mem_size: u64,
    /// Maximum number of transactions in a block
    pub block_length: u64,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            block_mem_size: DEFAULT_BLOCK_MEM_SIZE,
            block_length: DEFAULT_BLOCK_LENGTH,
        }
    }
}

/// Parameters fixed at ledger creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    /// Id of the hash algorithm, see [`Hashers::id`]
    pub crypter: Hash,
    pub recalc_time: u64,
    pub recalc_trigger: u64,
    pub block_params: BlockParams,
}

impl LedgerParams {
    pub fn for_hasher(hasher: Hashers) -> Self {
        Self {
            crypter: hasher.id(),
            recalc_time: DEFAULT_RECALC_TIME,
            recalc_trigger: DEFAULT_RECALC_TRIGGER,
            block_params: BlockParams::default(),
        }
    }
}

/// Reward formula inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseParams {
    pub base_incentive: Payout,
    pub time_incentive: Payout,
    pub value_incentive: Payout,
    pub dividing_threshold: u64,
    /// Milliseconds per unit of time factor
    pub time_base_millis: u64,
    pub precision: PrecisionContext,
}

impl CoinbaseParams {
    pub fn dividing_threshold_decimal(&self) -> BigDecimal {
        BigDecimal::from(self.dividing_threshold)
    }
}

impl Default for CoinbaseParams {
    fn default() -> Self {
        Self {
            base_incentive: Payout::from(DEFAULT_BASE_INCENTIVE),
            time_incentive: Payout::from(DEFAULT_TIME_INCENTIVE),
            value_incentive: Payout::from(DEFAULT_VALUE_INCENTIVE),
            dividing_threshold: DEFAULT_DIVIDING_THRESHOLD,
            time_base_millis: DEFAULT_TIME_BASE_MILLIS,
            precision: PrecisionContext::default(),
        }
    }
}

/// Serializable form of a [`LedgerConfig`]; the formula is always [`DefaultDiff`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub hasher: Hashers,
    pub encoder: Encoders,
    #[serde(default)]
    pub ledger_params: Option<LedgerParams>,
    #[serde(default)]
    pub coinbase_params: CoinbaseParams,
}

/// Everything an entity needs to hash, encode and reward
#[derive(Clone)]
pub struct LedgerConfig {
    hasher: Hashers,
    encoder: Encoders,
    ledger_params: LedgerParams,
    coinbase_params: CoinbaseParams,
    formula: Arc<dyn DataFormula>,
}

impl LedgerConfig {
    /// Configuration with default parameters for the given hasher and encoder
    pub fn new(hasher: Hashers, encoder: Encoders) -> Self {
        Self {
            hasher,
            encoder,
            ledger_params: LedgerParams::for_hasher(hasher),
            coinbase_params: CoinbaseParams::default(),
            formula: Arc::new(DefaultDiff),
        }
    }

    pub fn with_ledger_params(mut self, params: LedgerParams) -> Result<Self> {
        self.ledger_params = params;
        self.validate()?;
        Ok(self)
    }

    pub fn with_coinbase_params(mut self, params: CoinbaseParams) -> Result<Self> {
        self.coinbase_params = params;
        self.validate()?;
        Ok(self)
    }

    pub fn with_formula(mut self, formula: Arc<dyn DataFormula>) -> Self {
        self.formula = formula;
        self
    }

    pub fn from_settings(settings: LedgerSettings) -> Result<Self> {
        let ledger_params = settings
            .ledger_params
            .unwrap_or_else(|| LedgerParams::for_hasher(settings.hasher));
        LedgerConfig::new(settings.hasher, settings.encoder)
            .with_ledger_params(ledger_params)?
            .with_coinbase_params(settings.coinbase_params)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: LedgerSettings = serde_json::from_str(json)
            .map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        Self::from_settings(settings)
    }

    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            hasher: self.hasher,
            encoder: self.encoder,
            ledger_params: Some(self.ledger_params.clone()),
            coinbase_params: self.coinbase_params.clone(),
        }
    }

    /// Checks the invariants the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        let crypter = Hashers::from_id(&self.ledger_params.crypter)?;
        if crypter != self.hasher {
            return Err(LedgerError::InvalidConfig(format!(
                "crypter {} does not match hasher {}",
                crypter.name(),
                self.hasher.name()
            )));
        }
        if self.coinbase_params.dividing_threshold == 0 {
            return Err(LedgerError::InvalidConfig(
                "dividing threshold must be positive".to_string(),
            ));
        }
        if self.coinbase_params.time_base_millis == 0 {
            return Err(LedgerError::InvalidConfig(
                "time base must be positive".to_string(),
            ));
        }
        if self.coinbase_params.precision.precision == 0 {
            return Err(LedgerError::InvalidConfig(
                "precision must be positive".to_string(),
            ));
        }
        let block = &self.ledger_params.block_params;
        if block.block_length == 0 || block.block_mem_size == 0 {
            return Err(LedgerError::InvalidConfig(
                "block limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hasher(&self) -> Hashers {
        self.hasher
    }

    pub fn encoder(&self) -> Encoders {
        self.encoder
    }

    pub fn ledger_params(&self) -> &LedgerParams {
        &self.ledger_params
    }

    pub fn coinbase_params(&self) -> &CoinbaseParams {
        &self.coinbase_params
    }

    pub fn formula(&self) -> &Arc<dyn DataFormula> {
        &self.formula
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("hasher", &self.hasher)
            .field("encoder", &self.encoder)
            .field("ledger_params", &self.ledger_params)
            .field("coinbase_params", &self.coinbase_params)
            .field("formula", &self.formula.id())
            .finish()
    }
}
