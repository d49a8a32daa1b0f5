//! Sensor readings carried by transactions
//!
//! Every reading supplies a digest and a relative diff against a previous
//! reading of the same kind. Diffs across kinds are refused.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::GRAMS_PER_KILOGRAM;
use crate::error::{LedgerError, Result};
use crate::hash::{Hash, Hasher, Hashers};
use crate::types::{DataConstant, Measurement, PrecisionContext};

/// Humidity units: absolute (g/kg, kg/kg) or relative (percentage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HUnit {
    GramsByKilogram,
    KilogramsByKilogram,
    Relative,
}

/// Luminosity units: ambient light in lux or emitted lumens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LUnit {
    Lux,
    Lumens,
}

/// Noise units: decibels of sound pressure level or root mean square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NUnit {
    Dbspl,
    Rms,
}

macro_rules! unit_ordinals {
    ($unit:ident { $($variant:ident = $ordinal:expr),+ $(,)? }) => {
        impl $unit {
            /// Discriminant used by storage
            pub fn ordinal(&self) -> u8 {
                match self {
                    $($unit::$variant => $ordinal,)+
                }
            }

            pub fn from_ordinal(ordinal: i64) -> Option<$unit> {
                match ordinal {
                    $(o if o == $ordinal as i64 => Some($unit::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

unit_ordinals!(HUnit { GramsByKilogram = 0, KilogramsByKilogram = 1, Relative = 2 });
unit_ordinals!(LUnit { Lux = 0, Lumens = 1 });
unit_ordinals!(NUnit { Dbspl = 0, Rms = 1 });

impl HUnit {
    /// Converts an absolute humidity to kg/kg; relative values pass through
    pub fn to_kg_by_kg(&self, value: &BigDecimal) -> BigDecimal {
        match self {
            HUnit::GramsByKilogram => value / &BigDecimal::from(GRAMS_PER_KILOGRAM),
            HUnit::KilogramsByKilogram | HUnit::Relative => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumidityData {
    pub hum: Measurement,
    pub unit: HUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuminosityData {
    pub lum: Measurement,
    pub unit: LUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseData {
    pub noise_level: Measurement,
    pub peak_or_base: Measurement,
    pub unit: NUnit,
}

/// Closed catalog of readings a transaction may carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerData {
    Humidity(HumidityData),
    Luminosity(LuminosityData),
    Noise(NoiseData),
}

impl LedgerData {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerData::Humidity(_) => "HumidityData",
            LedgerData::Luminosity(_) => "LuminosityData",
            LedgerData::Noise(_) => "NoiseData",
        }
    }

    /// Digest over a kind tag, the normalized measurements and the unit
    pub fn digest(&self, hasher: Hashers) -> Hash {
        let mut bytes = Vec::new();
        match self {
            LedgerData::Humidity(h) => {
                bytes.push(0x00);
                push_measurement(&mut bytes, &h.hum);
                bytes.push(h.unit.ordinal());
            }
            LedgerData::Luminosity(l) => {
                bytes.push(0x01);
                push_measurement(&mut bytes, &l.lum);
                bytes.push(l.unit.ordinal());
            }
            LedgerData::Noise(n) => {
                bytes.push(0x02);
                push_measurement(&mut bytes, &n.noise_level);
                push_measurement(&mut bytes, &n.peak_or_base);
                bytes.push(n.unit.ordinal());
            }
        }
        hasher.apply_hash(&bytes)
    }

    /// Relative change (new - old) / old against a reading of the same kind
    pub fn calculate_diff(&self, previous: &LedgerData, ctx: PrecisionContext) -> Result<BigDecimal> {
        match (self, previous) {
            (LedgerData::Humidity(new), LedgerData::Humidity(old)) => humidity_diff(new, old, ctx),
            (LedgerData::Luminosity(new), LedgerData::Luminosity(old)) => {
                relative_diff(new.lum.as_decimal(), old.lum.as_decimal(), ctx, self.kind())
            }
            (LedgerData::Noise(new), LedgerData::Noise(old)) => relative_diff(
                new.noise_level.as_decimal(),
                old.noise_level.as_decimal(),
                ctx,
                self.kind(),
            ),
            _ => Err(LedgerError::IncompatibleDiff {
                expected: self.kind().to_string(),
                found: previous.kind().to_string(),
            }),
        }
    }
}

fn push_measurement(bytes: &mut Vec<u8>, value: &Measurement) {
    let text = value.as_decimal().normalized().to_string();
    bytes.extend_from_slice(&(text.len() as u32).to_le_bytes());
    bytes.extend_from_slice(text.as_bytes());
}

fn humidity_diff(new: &HumidityData, old: &HumidityData, ctx: PrecisionContext) -> Result<BigDecimal> {
    let new_relative = new.unit == HUnit::Relative;
    let old_relative = old.unit == HUnit::Relative;
    if new_relative != old_relative {
        return Err(LedgerError::IncompatibleDiff {
            expected: format!("HumidityData({:?})", new.unit),
            found: format!("HumidityData({:?})", old.unit),
        });
    }
    let new_h = new.unit.to_kg_by_kg(new.hum.as_decimal());
    let old_h = old.unit.to_kg_by_kg(old.hum.as_decimal());
    relative_diff(&new_h, &old_h, ctx, "HumidityData")
}

fn relative_diff(new: &BigDecimal, old: &BigDecimal, ctx: PrecisionContext, kind: &str) -> Result<BigDecimal> {
    ctx.divide(&(new - old), old)
        .ok_or_else(|| LedgerError::ZeroBaseline(kind.to_string()))
}

/// Timestamped reading with the weight the reward formula applies to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalData {
    pub instant: DateTime<Utc>,
    pub data: LedgerData,
    pub data_constant: DataConstant,
}

impl PhysicalData {
    pub fn new(instant: DateTime<Utc>, data: LedgerData, data_constant: DataConstant) -> Self {
        Self { instant, data, data_constant }
    }

    pub fn digest(&self, hasher: Hashers) -> Hash {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.instant.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&self.instant.timestamp_subsec_nanos().to_le_bytes());
        bytes.extend_from_slice(self.data.digest(hasher).as_bytes());
        bytes.extend_from_slice(self.data_constant.as_decimal().normalized().to_string().as_bytes());
        hasher.apply_hash(&bytes)
    }

    /// Milliseconds from `previous` to this reading, clamped at zero
    pub fn elapsed_millis_since(&self, previous: &PhysicalData) -> u64 {
        (self.instant - previous.instant).num_milliseconds().max(0) as u64
    }
}
