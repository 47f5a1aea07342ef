use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{LoanId, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Scheduled,
    Paid,
    Partial,
    Missed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Scheduled => "scheduled",
            EntryStatus::Paid => "paid",
            EntryStatus::Partial => "partial",
            EntryStatus::Missed => "missed",
        };
        f.write_str(s)
    }
}

/// One installment of a loan's repayment schedule, keyed by `(loan_id, sequence)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub loan_id: LoanId,
    /// 1-based position in the schedule.
    pub sequence: u32,
    pub due_date: NaiveDate,
    pub expected_amount: Money,
    /// Accumulates across partial payments.
    pub amount_received: Money,
    pub status: EntryStatus,
    pub default_fee_accrued: Money,
    /// Set once the default fee for this entry has been charged.
    pub fee_charged: bool,
}

impl ScheduleEntry {
    pub fn new(loan_id: LoanId, sequence: u32, due_date: NaiveDate, expected_amount: Money) -> Self {
        Self {
            loan_id,
            sequence,
            due_date,
            expected_amount,
            amount_received: Decimal::ZERO,
            status: EntryStatus::Scheduled,
            default_fee_accrued: Decimal::ZERO,
            fee_charged: false,
        }
    }

    pub fn outstanding(&self) -> Money {
        (self.expected_amount - self.amount_received).max(Decimal::ZERO)
    }

    /// Still expecting money: scheduled, partial or missed.
    pub fn is_open(&self) -> bool {
        self.status != EntryStatus::Paid
    }

    /// Due strictly before `as_of` and not fully paid.
    pub fn is_past_due(&self, as_of: NaiveDate) -> bool {
        self.is_open() && self.due_date < as_of
    }
}
