//! Ledger defaults

/// Significant decimal digits used for payout and diff arithmetic (decimal128)
pub const DEFAULT_PRECISION: u64 = 34;

/// Incentive paid for every contribution, independent of its content
pub const DEFAULT_BASE_INCENTIVE: i64 = 3;

/// Weight of the elapsed time between two readings
pub const DEFAULT_TIME_INCENTIVE: i64 = 5;

/// Weight of the relative change between two readings
pub const DEFAULT_VALUE_INCENTIVE: i64 = 2;

/// Divisor applied to the weighted incentives
pub const DEFAULT_DIVIDING_THRESHOLD: u64 = 100_000;

/// Milliseconds that make up one unit of time factor
pub const DEFAULT_TIME_BASE_MILLIS: u64 = 1_000;

/// Time between difficulty recalculations, in milliseconds
pub const DEFAULT_RECALC_TIME: u64 = 1_228_800_000;

/// Number of blocks that triggers a difficulty recalculation
pub const DEFAULT_RECALC_TRIGGER: u64 = 2048;

/// Maximum approximate block size: 2MB
pub const DEFAULT_BLOCK_MEM_SIZE: u64 = 2 * 1024 * 1024;

/// Maximum number of transactions per block
pub const DEFAULT_BLOCK_LENGTH: u64 = 512;

/// Grams per kilogram, used by humidity unit conversion
pub const GRAMS_PER_KILOGRAM: i64 = 1_000;
