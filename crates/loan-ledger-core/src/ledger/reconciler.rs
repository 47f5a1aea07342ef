//! Repayment reconciliation.
//!
//! A payment settles the earliest open installment first (by due date, then
//! sequence) and cascades any remainder forward. Money left after the last
//! installment is kept as a credit balance on the loan.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::ledger::account::{LoanAccount, LoanSummary, Payment};
use crate::ledger::status::{derive_status, LoanStatus};
use crate::schedule::EntryStatus;
use crate::types::{is_whole_units, LoanId, Money};
use crate::LedgerResult;

/// Portion of a payment credited to one schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    /// Entry status after the allocation.
    pub entry_status: EntryStatus,
    pub entry_outstanding: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub loan_id: LoanId,
    pub external_id: String,
    /// True when the payment had already been applied; nothing changed.
    pub duplicate: bool,
    pub allocations: Vec<Allocation>,
    /// Amount added to the loan's credit balance by this payment.
    pub credit_added: Money,
    pub previous_status: LoanStatus,
    pub summary: LoanSummary,
}

/// Apply `payment` to `account`. Re-applying a known payment is a logged no-op.
pub fn apply_payment(account: &mut LoanAccount, payment: &Payment) -> LedgerResult<ReconciliationResult> {
    validate_payment(account, payment)?;

    if account.applied_payments.contains(&payment.external_id) {
        warn!(
            loan_id = %account.loan.id,
            external_id = %payment.external_id,
            "payment already applied, ignoring"
        );
        return Ok(ReconciliationResult {
            loan_id: account.loan.id,
            external_id: payment.external_id.clone(),
            duplicate: true,
            allocations: Vec::new(),
            credit_added: Decimal::ZERO,
            previous_status: account.loan.status,
            summary: account.summary(),
        });
    }

    let previous_status = account.loan.status;
    let mut remaining = payment.amount;
    let mut allocations = Vec::new();

    // Allocate on a copy; nothing is committed until the credit balance is known to fit.
    let mut entries = account.entries.clone();
    for idx in account.open_entries_in_order() {
        if remaining.is_zero() {
            break;
        }
        let entry = &mut entries[idx];
        let applied = remaining.min(entry.outstanding());
        if applied.is_zero() {
            continue;
        }
        entry.amount_received += applied;
        entry.status = if entry.amount_received >= entry.expected_amount {
            EntryStatus::Paid
        } else {
            EntryStatus::Partial
        };
        remaining -= applied;
        allocations.push(Allocation {
            sequence: entry.sequence,
            due_date: entry.due_date,
            amount: applied,
            entry_status: entry.status,
            entry_outstanding: entry.outstanding(),
        });
    }

    let credit_balance = account
        .loan
        .credit_balance
        .checked_add(remaining)
        .ok_or_else(|| LedgerError::InvalidInput {
            field: "amount".into(),
            reason: format!(
                "Payment {} would overflow the credit balance of loan {}",
                payment.external_id, account.loan.id
            ),
        })?;

    account.entries = entries;
    account.loan.credit_balance = credit_balance;
    if remaining > Decimal::ZERO {
        info!(
            loan_id = %account.loan.id,
            external_id = %payment.external_id,
            credit = %remaining,
            "overpayment recorded as credit"
        );
    }

    account.applied_payments.insert(payment.external_id.clone());
    account.recompute_aggregates();
    account.loan.status = derive_status(&account.entries, payment.paid_on, previous_status);
    account.touch();

    info!(
        loan_id = %account.loan.id,
        external_id = %payment.external_id,
        amount = %payment.amount,
        entries = allocations.len(),
        outstanding = %account.loan.outstanding_balance,
        status = %account.loan.status,
        "payment applied"
    );

    Ok(ReconciliationResult {
        loan_id: account.loan.id,
        external_id: payment.external_id.clone(),
        duplicate: false,
        allocations,
        credit_added: remaining,
        previous_status,
        summary: account.summary(),
    })
}

/// Like [`apply_payment`], but reports a re-delivered payment as
/// [`LedgerError::DuplicatePayment`] instead of swallowing it.
pub fn apply_payment_strict(account: &mut LoanAccount, payment: &Payment) -> LedgerResult<ReconciliationResult> {
    if account.applied_payments.contains(&payment.external_id) {
        return Err(LedgerError::DuplicatePayment {
            loan_id: account.loan.id,
            external_id: payment.external_id.clone(),
        });
    }
    apply_payment(account, payment)
}

fn validate_payment(account: &LoanAccount, payment: &Payment) -> LedgerResult<()> {
    if payment.loan_id != account.loan.id {
        return Err(LedgerError::UnknownLoan(payment.loan_id));
    }
    if payment.external_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput {
            field: "external_id".into(),
            reason: "Payments need an external identifier".into(),
        });
    }
    if payment.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput {
            field: "amount".into(),
            reason: "Payment amount must be positive".into(),
        });
    }
    if !is_whole_units(payment.amount) {
        return Err(LedgerError::InvalidInput {
            field: "amount".into(),
            reason: "Payment amount must be a whole number of minor units".into(),
        });
    }
    Ok(())
}
