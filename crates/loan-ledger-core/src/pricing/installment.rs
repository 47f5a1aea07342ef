//! Installment calculator.
//!
//! The single path from a requested principal and term to the amounts a
//! borrower owes. Interest is a flat add-on charged once on the original
//! principal; insurance is a percentage of principal and the documentation
//! fee is a fixed amount. Every output is in whole minor units.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::LedgerError;
use crate::pricing::rate_table::{rate_for, LoanTerm};
use crate::types::{is_whole_units, to_minor_units, with_metadata, ComputationOutput, Money, Rate};
use crate::LedgerResult;

// ---------------------------------------------------------------------------
// Fee configuration
// ---------------------------------------------------------------------------

/// Rounding applied when a percentage charge lands between minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountRounding {
    #[default]
    HalfUp,
    HalfEven,
    Down,
}

impl AmountRounding {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            AmountRounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            AmountRounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            AmountRounding::Down => RoundingStrategy::ToZero,
        }
    }
}

/// Insurance and documentation charges added on top of principal and interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Insurance premium as a fraction of principal.
    pub insurance_rate: Rate,
    /// Fixed documentation fee in minor units.
    pub documentation_fee: Money,
    pub rounding: AmountRounding,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            insurance_rate: dec!(0.02),
            documentation_fee: dec!(50),
            rounding: AmountRounding::HalfUp,
        }
    }
}

impl FeeConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.insurance_rate < Decimal::ZERO || self.insurance_rate >= Decimal::ONE {
            return Err(LedgerError::InvalidInput {
                field: "insurance_rate".into(),
                reason: "Insurance rate must be in [0, 1)".into(),
            });
        }
        if self.documentation_fee < Decimal::ZERO {
            return Err(LedgerError::InvalidInput {
                field: "documentation_fee".into(),
                reason: "Documentation fee cannot be negative".into(),
            });
        }
        if !is_whole_units(self.documentation_fee) {
            return Err(LedgerError::InvalidInput {
                field: "documentation_fee".into(),
                reason: "Documentation fee must be a whole number of minor units".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything a borrower owes on a loan, split by component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentBreakdown {
    pub principal: Money,
    pub term: LoanTerm,
    pub interest_rate: Rate,
    pub interest: Money,
    pub insurance_rate: Rate,
    pub insurance: Money,
    pub documentation_fee: Money,
    /// principal + interest + insurance + documentation fee.
    pub gross_repayable: Money,
    /// Base amount due each period.
    pub installment: Money,
    /// Amount due on the last period; absorbs the division remainder.
    pub final_installment: Money,
}

impl InstallmentBreakdown {
    /// Amount due for the 1-based `sequence` of the schedule.
    pub fn amount_for(&self, sequence: u32) -> Money {
        if sequence == self.term.periods() {
            self.final_installment
        } else {
            self.installment
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute interest, insurance, fee, gross repayable and periodic installment.
pub fn compute_installment(
    principal: Money,
    term_periods: u32,
    fees: &FeeConfig,
) -> LedgerResult<ComputationOutput<InstallmentBreakdown>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_principal(principal)?;
    fees.validate()?;
    let term = LoanTerm::new(term_periods)?;
    let interest_rate = rate_for(term)?;
    let strategy = fees.rounding.strategy();

    let interest = principal
        .checked_mul(interest_rate)
        .map(|v| to_minor_units(v, strategy))
        .ok_or_else(|| too_large(principal))?;
    let insurance = principal
        .checked_mul(fees.insurance_rate)
        .map(|v| to_minor_units(v, strategy))
        .ok_or_else(|| too_large(principal))?;
    let documentation_fee = fees.documentation_fee;
    let gross_repayable = principal
        .checked_add(interest)
        .and_then(|v| v.checked_add(insurance))
        .and_then(|v| v.checked_add(documentation_fee))
        .ok_or_else(|| too_large(principal))?;

    // Truncating keeps the final installment >= the base one, never negative.
    let periods = Decimal::from(term.periods());
    let installment = (gross_repayable / periods).trunc();
    let final_installment = gross_repayable - installment * (periods - Decimal::ONE);

    if final_installment != installment {
        warnings.push(format!(
            "Final installment {} absorbs a rounding remainder of {}",
            final_installment,
            final_installment - installment
        ));
    }

    debug!(
        %principal,
        term = term.periods(),
        %interest,
        %gross_repayable,
        %installment,
        "computed installment breakdown"
    );

    let breakdown = InstallmentBreakdown {
        principal,
        term,
        interest_rate,
        interest,
        insurance_rate: fees.insurance_rate,
        insurance,
        documentation_fee,
        gross_repayable,
        installment,
        final_installment,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Flat add-on interest, fixed bi-weekly installments, remainder in final period",
        &serde_json::json!({
            "principal": principal.to_string(),
            "term_periods": term.periods(),
            "interest_rate": interest_rate.to_string(),
            "insurance_rate": fees.insurance_rate.to_string(),
            "documentation_fee": documentation_fee.to_string(),
        }),
        warnings,
        elapsed,
        breakdown,
    ))
}

fn too_large(principal: Money) -> LedgerError {
    LedgerError::InvalidPrincipal {
        principal,
        reason: "Repayable amount exceeds the representable range".into(),
    }
}

fn validate_principal(principal: Money) -> LedgerResult<()> {
    if principal <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrincipal {
            principal,
            reason: "Principal must be positive".into(),
        });
    }
    if !is_whole_units(principal) {
        return Err(LedgerError::InvalidPrincipal {
            principal,
            reason: "Principal must be a whole number of minor units".into(),
        });
    }
    Ok(())
}
