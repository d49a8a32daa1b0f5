//! Reward formulas: how much a contribution is worth
//!
//! A formula only sees already-derived factors. Deriving the factors from
//! readings happens in [`first_payout`] and [`calculate_payout`].

use std::fmt::Debug;
use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::config::CoinbaseParams;
use crate::data::PhysicalData;
use crate::error::{LedgerError, Result};
use crate::hash::{Hash, Hasher, Hashers};
use crate::types::{DataConstant, Payout, PrecisionContext};

/// Inputs to a reward formula
#[derive(Debug, Clone)]
pub struct FormulaInputs<'a> {
    pub base_incentive: &'a Payout,
    pub time_incentive: &'a Payout,
    pub time_factor: BigDecimal,
    pub value_incentive: &'a Payout,
    pub value_factor: BigDecimal,
    pub data_constant: &'a DataConstant,
    pub dividing_threshold: BigDecimal,
    pub precision: PrecisionContext,
}

pub trait DataFormula: Debug + Send + Sync {
    /// Stable name of the formula
    fn id(&self) -> &'static str;

    fn calculate(&self, inputs: &FormulaInputs<'_>) -> Result<Payout>;

    /// Identity persisted in place of the formula itself
    fn digest(&self) -> Hash {
        Hashers::Sha3_512.apply_hash(self.id().as_bytes())
    }
}

/// DefaultDiff: payout = b + (tᵢ·t + vᵢ·v) · c / d
///
/// Where:
/// - b = base incentive
/// - tᵢ, t = time incentive and time factor
/// - vᵢ, v = value incentive and value factor
/// - c = data constant of the reading
/// - d = dividing threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDiff;

impl DataFormula for DefaultDiff {
    fn id(&self) -> &'static str {
        "DefaultDiff"
    }

    fn calculate(&self, inputs: &FormulaInputs<'_>) -> Result<Payout> {
        let time = inputs.time_incentive.as_decimal() * &inputs.time_factor;
        let value = inputs.value_incentive.as_decimal() * &inputs.value_factor;
        let weighted = (time + value) * inputs.data_constant.as_decimal();
        let scaled = inputs
            .precision
            .divide(&weighted, &inputs.dividing_threshold)
            .ok_or_else(|| LedgerError::InvalidConfig("dividing threshold is zero".to_string()))?;
        let payout = inputs.base_incentive.as_decimal() + &scaled;
        Ok(Payout::new(inputs.precision.round(&payout)))
    }
}

/// Resolves a persisted formula digest back to a formula
pub fn resolve_formula(digest: &Hash) -> Result<Arc<dyn DataFormula>> {
    if *digest == DefaultDiff.digest() {
        Ok(Arc::new(DefaultDiff))
    } else {
        Err(LedgerError::UnknownFormula(digest.to_hex()))
    }
}

/// Payout for a participant's first contribution: unit time and value factors
pub fn first_payout(
    new: &PhysicalData,
    formula: &dyn DataFormula,
    params: &CoinbaseParams,
) -> Result<Payout> {
    formula.calculate(&FormulaInputs {
        base_incentive: &params.base_incentive,
        time_incentive: &params.time_incentive,
        time_factor: BigDecimal::from(1),
        value_incentive: &params.value_incentive,
        value_factor: BigDecimal::from(1),
        data_constant: &new.data_constant,
        dividing_threshold: params.dividing_threshold_decimal(),
        precision: params.precision,
    })
}

/// CalculatePayout: 𝒟 × 𝒟 × ℱ × 𝒞 → 𝒫
///
/// 1. Time factor = elapsed milliseconds / time base (never negative)
/// 2. Value factor = |diff(new, previous)|
/// 3. Apply the formula with the new reading's data constant
pub fn calculate_payout(
    new: &PhysicalData,
    previous: &PhysicalData,
    formula: &dyn DataFormula,
    params: &CoinbaseParams,
) -> Result<Payout> {
    let elapsed = BigDecimal::from(new.elapsed_millis_since(previous));
    let time_factor = params
        .precision
        .divide(&elapsed, &BigDecimal::from(params.time_base_millis))
        .ok_or_else(|| LedgerError::InvalidConfig("time base is zero".to_string()))?;
    let value_factor = new.data.calculate_diff(&previous.data, params.precision)?.abs();

    formula.calculate(&FormulaInputs {
        base_incentive: &params.base_incentive,
        time_incentive: &params.time_incentive,
        time_factor,
        value_incentive: &params.value_incentive,
        value_factor,
        data_constant: &new.data_constant,
        dividing_threshold: params.dividing_threshold_decimal(),
        precision: params.precision,
    })
}

/// Serializes a formula as its digest
pub(crate) mod digest_serde {
    use std::sync::Arc;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{resolve_formula, DataFormula};
    use crate::hash::Hash;

    pub fn serialize<S: Serializer>(
        formula: &Arc<dyn DataFormula>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        formula.digest().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Arc<dyn DataFormula>, D::Error> {
        let digest = Hash::deserialize(deserializer)?;
        resolve_formula(&digest).map_err(serde::de::Error::custom)
    }
}
