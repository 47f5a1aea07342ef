//! Engine configuration, sourced once by the calling application.

use serde::{Deserialize, Serialize};

use crate::ledger::DefaultFeeRule;
use crate::pricing::FeeConfig;
use crate::LedgerResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fees: FeeConfig,
    pub default_fee: DefaultFeeRule,
    /// Days the oldest arrears must persist before an operator may write a loan off.
    pub write_off_grace_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fees: FeeConfig::default(),
            default_fee: DefaultFeeRule::default(),
            write_off_grace_days: 90,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        self.fees.validate()?;
        self.default_fee.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"write_off_grace_days": 60}"#).unwrap();
        assert_eq!(cfg.write_off_grace_days, 60);
        assert_eq!(cfg.fees.insurance_rate, dec!(0.02));
        assert_eq!(cfg.fees.documentation_fee, dec!(50));
        assert_eq!(cfg.default_fee, DefaultFeeRule::Fixed { amount: dec!(100) });
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_fees_rejected() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"fees": {"documentation_fee": "-1"}}"#).unwrap();
        assert!(cfg.validate().is_err());
    }
}
