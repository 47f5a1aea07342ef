use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::LedgerResult;

/// All monetary values, held in whole minor currency units (cents).
/// Never f64.
pub type Money = Decimal;

/// Rates expressed as decimals (0.30 = 30%). Never as percentages.
pub type Rate = Decimal;

pub type LoanId = Uuid;

pub type RequestId = Uuid;

/// Days between two consecutive installments (bi-weekly).
pub const PERIOD_DAYS: u64 = 14;

/// Quantise an amount to whole minor units.
pub fn to_minor_units(amount: Decimal, strategy: RoundingStrategy) -> Money {
    amount.round_dp_with_strategy(0, strategy)
}

pub fn is_whole_units(amount: Money) -> bool {
    amount.fract().is_zero()
}

/// A payroll period, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> LedgerResult<Self> {
        if end < start {
            return Err(LedgerError::InvalidInput {
                field: "pay_period".into(),
                reason: format!("Period end {end} is before its start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "minor_units_decimal128".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_rounding() {
        assert_eq!(to_minor_units(dec!(12.5), RoundingStrategy::MidpointAwayFromZero), dec!(13));
        assert_eq!(to_minor_units(dec!(12.5), RoundingStrategy::MidpointNearestEven), dec!(12));
        assert_eq!(to_minor_units(dec!(12.9), RoundingStrategy::ToZero), dec!(12));
        assert!(is_whole_units(dec!(1325)));
        assert!(!is_whole_units(dec!(1325.5)));
    }

    #[test]
    fn test_pay_period_bounds() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let period = PayPeriod::new(start, end).unwrap();
        assert!(period.contains(start));
        assert!(period.contains(end));
        assert!(!period.contains(end.succ_opt().unwrap()));
        assert!(PayPeriod::new(end, start).is_err());
    }
}
