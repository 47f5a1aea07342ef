//! Arrears scanning and default-fee accrual.
//!
//! A scan marks every unpaid installment whose due date has passed as
//! missed, charges each such installment its default fee exactly once and
//! re-derives the loan status. Running the same scan twice changes nothing.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger::account::{Loan, LoanAccount};
use crate::ledger::status::{derive_status, LoanStatus};
use crate::schedule::{EntryStatus, ScheduleEntry};
use crate::types::{is_whole_units, to_minor_units, LoanId, Money, Rate};
use crate::LedgerResult;

/// Decides the default fee charged on an installment that went unpaid past its due date.
pub trait DefaultFeePolicy: Send + Sync {
    fn fee_for(&self, loan: &Loan, entry: &ScheduleEntry) -> Money;
}

impl<F> DefaultFeePolicy for F
where
    F: Fn(&Loan, &ScheduleEntry) -> Money + Send + Sync,
{
    fn fee_for(&self, loan: &Loan, entry: &ScheduleEntry) -> Money {
        self(loan, entry)
    }
}

/// Configurable default-fee rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultFeeRule {
    None,
    /// Same fixed amount for every missed installment.
    Fixed { amount: Money },
    /// Fraction of the installment's expected amount.
    PercentOfInstallment { rate: Rate },
    /// Fraction of what is still unpaid on the installment.
    PercentOfShortfall { rate: Rate },
}

impl Default for DefaultFeeRule {
    fn default() -> Self {
        DefaultFeeRule::Fixed { amount: dec!(100) }
    }
}

impl DefaultFeeRule {
    pub fn validate(&self) -> LedgerResult<()> {
        let invalid = |reason: &str| LedgerError::InvalidInput {
            field: "default_fee".into(),
            reason: reason.into(),
        };
        match self {
            DefaultFeeRule::None => Ok(()),
            DefaultFeeRule::Fixed { amount } => {
                if *amount < Decimal::ZERO || !is_whole_units(*amount) {
                    Err(invalid("Fixed fee must be a non-negative whole number of minor units"))
                } else {
                    Ok(())
                }
            }
            DefaultFeeRule::PercentOfInstallment { rate } | DefaultFeeRule::PercentOfShortfall { rate } => {
                if *rate < Decimal::ZERO || *rate > Decimal::ONE {
                    Err(invalid("Fee rate must be in [0, 1]"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl DefaultFeePolicy for DefaultFeeRule {
    fn fee_for(&self, _loan: &Loan, entry: &ScheduleEntry) -> Money {
        let half_up = RoundingStrategy::MidpointAwayFromZero;
        match self {
            DefaultFeeRule::None => Decimal::ZERO,
            DefaultFeeRule::Fixed { amount } => *amount,
            DefaultFeeRule::PercentOfInstallment { rate } => {
                to_minor_units(entry.expected_amount * rate, half_up)
            }
            DefaultFeeRule::PercentOfShortfall { rate } => to_minor_units(entry.outstanding() * rate, half_up),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrearsResult {
    pub loan_id: LoanId,
    pub as_of: NaiveDate,
    /// Outstanding amount on installments due before `as_of`.
    pub arrears: Money,
    /// Fees charged by this scan only.
    pub default_fee_accrued: Money,
    pub total_default_fees: Money,
    /// Sequences that moved from scheduled to missed in this scan.
    pub newly_missed: Vec<u32>,
    pub overdue_entries: u32,
    pub previous_status: LoanStatus,
    pub status: LoanStatus,
}

impl ArrearsResult {
    pub fn changed(&self) -> bool {
        !self.newly_missed.is_empty()
            || !self.default_fee_accrued.is_zero()
            || self.previous_status != self.status
    }
}

/// Scan `account` as of `as_of`, charging default fees through `policy`.
pub fn scan_arrears(
    account: &mut LoanAccount,
    as_of: NaiveDate,
    policy: &dyn DefaultFeePolicy,
) -> LedgerResult<ArrearsResult> {
    let previous_status = account.loan.status;
    let mut newly_missed = Vec::new();
    let mut fee_accrued = Decimal::ZERO;
    let mut overdue_entries = 0u32;

    // Terminal loans are reported but no longer accrue.
    let accrue = !previous_status.is_terminal();

    // Work on a copy so a rejected fee leaves the account untouched.
    let loan = &account.loan;
    let mut entries = account.entries.clone();
    for entry in entries.iter_mut() {
        if !entry.is_past_due(as_of) {
            continue;
        }
        overdue_entries += 1;
        if !accrue {
            continue;
        }
        if entry.status == EntryStatus::Scheduled {
            entry.status = EntryStatus::Missed;
            newly_missed.push(entry.sequence);
        }
        if !entry.fee_charged {
            let fee = policy.fee_for(loan, entry);
            if fee < Decimal::ZERO || !is_whole_units(fee) {
                return Err(LedgerError::InvalidInput {
                    field: "default_fee".into(),
                    reason: format!(
                        "Policy produced fee {fee} for entry {} of loan {}",
                        entry.sequence, loan.id
                    ),
                });
            }
            let overflow = || LedgerError::InvalidInput {
                field: "default_fee".into(),
                reason: format!("Fee {fee} overflows the accrued fees of loan {}", loan.id),
            };
            entry.default_fee_accrued = entry.default_fee_accrued.checked_add(fee).ok_or_else(overflow)?;
            entry.fee_charged = true;
            fee_accrued = fee_accrued.checked_add(fee).ok_or_else(overflow)?;
        }
    }
    // Loan-level total must fit too.
    entries
        .iter()
        .try_fold(Decimal::ZERO, |acc, e| acc.checked_add(e.default_fee_accrued))
        .ok_or_else(|| LedgerError::InvalidInput {
            field: "default_fee".into(),
            reason: format!("Accrued default fees of loan {} overflow", loan.id),
        })?;

    account.entries = entries;
    account.recompute_aggregates();
    account.loan.status = derive_status(&account.entries, as_of, previous_status);

    let result = ArrearsResult {
        loan_id: account.loan.id,
        as_of,
        arrears: account.arrears_as_of(as_of),
        default_fee_accrued: fee_accrued,
        total_default_fees: account.loan.default_fees_accrued,
        newly_missed,
        overdue_entries,
        previous_status,
        status: account.loan.status,
    };

    if result.changed() {
        account.touch();
        info!(
            loan_id = %result.loan_id,
            %as_of,
            arrears = %result.arrears,
            fees = %result.default_fee_accrued,
            missed = result.newly_missed.len(),
            status = %result.status,
            "arrears scan updated loan"
        );
    } else {
        debug!(loan_id = %result.loan_id, %as_of, "arrears scan: no change");
    }

    Ok(result)
}
