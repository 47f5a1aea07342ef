//! Loan records and the per-loan aggregate the engine mutates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::LedgerError;
use crate::ledger::status::LoanStatus;
use crate::pricing::{InstallmentBreakdown, LoanTerm};
use crate::schedule::{EntryStatus, ScheduleEntry};
use crate::types::{LoanId, Money, Rate};
use crate::LedgerResult;

/// Scale kept on `completion_percentage`.
const COMPLETION_DP: u32 = 6;

/// A disbursed loan. Pricing fields are fixed at creation; only the status
/// and the derived aggregates change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower_id: String,
    pub principal: Money,
    pub term: LoanTerm,
    pub interest_rate: Rate,
    pub interest_amount: Money,
    pub insurance_amount: Money,
    pub documentation_fee: Money,
    pub gross_repayable: Money,
    pub installment_amount: Money,
    pub start_date: NaiveDate,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,

    // Derived from schedule entries
    pub total_received: Money,
    pub outstanding_balance: Money,
    /// total_received / gross_repayable, as a fraction.
    pub completion_percentage: Rate,
    pub missed_count: u32,
    pub partial_count: u32,
    pub default_fees_accrued: Money,

    /// Payments received beyond the last installment.
    pub credit_balance: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_off_on: Option<NaiveDate>,
    /// Incremented on every mutation.
    pub version: u64,
}

impl Loan {
    pub fn from_breakdown(
        id: LoanId,
        borrower_id: impl Into<String>,
        breakdown: &InstallmentBreakdown,
        start_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            borrower_id: borrower_id.into(),
            principal: breakdown.principal,
            term: breakdown.term,
            interest_rate: breakdown.interest_rate,
            interest_amount: breakdown.interest,
            insurance_amount: breakdown.insurance,
            documentation_fee: breakdown.documentation_fee,
            gross_repayable: breakdown.gross_repayable,
            installment_amount: breakdown.installment,
            start_date,
            status: LoanStatus::Active,
            created_at,
            total_received: Decimal::ZERO,
            outstanding_balance: breakdown.gross_repayable,
            completion_percentage: Decimal::ZERO,
            missed_count: 0,
            partial_count: 0,
            default_fees_accrued: Decimal::ZERO,
            credit_balance: Decimal::ZERO,
            written_off_on: None,
            version: 0,
        }
    }
}

/// An incoming repayment. Applied at most once per `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub external_id: String,
    pub loan_id: LoanId,
    pub amount: Money,
    pub paid_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Aggregate figures reported after each ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: LoanId,
    pub status: LoanStatus,
    pub gross_repayable: Money,
    pub total_received: Money,
    pub outstanding_balance: Money,
    pub completion_percentage: Rate,
    pub missed_count: u32,
    pub partial_count: u32,
    pub default_fees_accrued: Money,
    pub credit_balance: Money,
    pub version: u64,
}

/// A loan together with its schedule: the unit of exclusive update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAccount {
    pub loan: Loan,
    pub entries: Vec<ScheduleEntry>,
    /// External ids of every payment already applied.
    #[serde(default)]
    pub applied_payments: BTreeSet<String>,
}

impl LoanAccount {
    /// Pair a freshly created loan with its generated schedule.
    pub fn open(loan: Loan, entries: Vec<ScheduleEntry>) -> LedgerResult<Self> {
        let mut account = Self {
            loan,
            entries,
            applied_payments: BTreeSet::new(),
        };
        account.validate()?;
        account.recompute_aggregates();
        Ok(account)
    }

    /// Structural checks on a loaded or freshly built account.
    pub fn validate(&self) -> LedgerResult<()> {
        let loan_id = self.loan.id;
        let invariant = |reason: String| LedgerError::ScheduleInvariant { loan_id, reason };

        if self.entries.len() as u32 != self.loan.term.periods() {
            return Err(invariant(format!(
                "Expected {} entries, found {}",
                self.loan.term.periods(),
                self.entries.len()
            )));
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.loan_id != loan_id {
                return Err(invariant(format!(
                    "Entry {} belongs to loan {}",
                    entry.sequence, entry.loan_id
                )));
            }
            if entry.sequence as usize != idx + 1 {
                return Err(invariant(format!(
                    "Entry at position {} has sequence {}",
                    idx + 1,
                    entry.sequence
                )));
            }
            if entry.amount_received > entry.expected_amount {
                return Err(invariant(format!(
                    "Entry {} received {} of {}",
                    entry.sequence, entry.amount_received, entry.expected_amount
                )));
            }
        }
        let total: Money = self.entries.iter().map(|e| e.expected_amount).sum();
        if total != self.loan.gross_repayable {
            return Err(invariant(format!(
                "Entries sum to {total} but gross repayable is {}",
                self.loan.gross_repayable
            )));
        }
        Ok(())
    }

    /// Rebuild every derived aggregate from entry state.
    pub fn recompute_aggregates(&mut self) {
        let total_received: Money = self.entries.iter().map(|e| e.amount_received).sum();
        let loan = &mut self.loan;
        loan.total_received = total_received;
        loan.outstanding_balance = (loan.gross_repayable - total_received).max(Decimal::ZERO);
        loan.completion_percentage = if loan.gross_repayable.is_zero() {
            Decimal::ZERO
        } else {
            (total_received / loan.gross_repayable).round_dp(COMPLETION_DP)
        };
        loan.missed_count = count_status(&self.entries, EntryStatus::Missed);
        loan.partial_count = count_status(&self.entries, EntryStatus::Partial);
        loan.default_fees_accrued = self.entries.iter().map(|e| e.default_fee_accrued).sum();
    }

    /// Indices of open entries, earliest due first, ties by sequence.
    pub fn open_entries_in_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].is_open())
            .collect();
        order.sort_by_key(|&i| (self.entries[i].due_date, self.entries[i].sequence));
        order
    }

    /// Outstanding amount on entries due strictly before `as_of`.
    pub fn arrears_as_of(&self, as_of: NaiveDate) -> Money {
        self.entries
            .iter()
            .filter(|e| e.is_past_due(as_of))
            .map(|e| e.outstanding())
            .sum()
    }

    pub fn oldest_overdue_date(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        self.entries
            .iter()
            .filter(|e| e.is_past_due(as_of))
            .map(|e| e.due_date)
            .min()
    }

    /// Earliest open entry due on or after `as_of`.
    pub fn next_due(&self, as_of: NaiveDate) -> Option<&ScheduleEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_open() && e.due_date >= as_of)
            .min_by_key(|e| (e.due_date, e.sequence))
    }

    pub fn has_missed_or_partial(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.status, EntryStatus::Missed | EntryStatus::Partial))
    }

    pub fn summary(&self) -> LoanSummary {
        let loan = &self.loan;
        LoanSummary {
            loan_id: loan.id,
            status: loan.status,
            gross_repayable: loan.gross_repayable,
            total_received: loan.total_received,
            outstanding_balance: loan.outstanding_balance,
            completion_percentage: loan.completion_percentage,
            missed_count: loan.missed_count,
            partial_count: loan.partial_count,
            default_fees_accrued: loan.default_fees_accrued,
            credit_balance: loan.credit_balance,
            version: loan.version,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.loan.version += 1;
    }
}

fn count_status(entries: &[ScheduleEntry], status: EntryStatus) -> u32 {
    entries.iter().filter(|e| e.status == status).count() as u32
}
