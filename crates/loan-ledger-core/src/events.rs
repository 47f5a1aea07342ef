//! Notifications emitted by [`crate::LoanBook`] after each state change.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::LoanStatus;
use crate::types::{LoanId, Money, RequestId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    LoanOpened {
        loan_id: LoanId,
        borrower_id: String,
        gross_repayable: Money,
    },
    PaymentApplied {
        loan_id: LoanId,
        external_id: String,
        amount: Money,
        outstanding_balance: Money,
    },
    DuplicatePaymentIgnored {
        loan_id: LoanId,
        external_id: String,
    },
    EntriesMissed {
        loan_id: LoanId,
        sequences: Vec<u32>,
        as_of: NaiveDate,
    },
    StatusChanged {
        loan_id: LoanId,
        from: LoanStatus,
        to: LoanStatus,
    },
    LoanWrittenOff {
        loan_id: LoanId,
        as_of: NaiveDate,
    },
    DeductionRequestCreated {
        request_id: RequestId,
        organization: String,
        total_clients: usize,
        total_amount: Money,
    },
    DeductionRequestTransitioned {
        request_id: RequestId,
        from: String,
        to: String,
    },
}

/// Receives ledger events. Closures taking `&LedgerEvent` implement it.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent);
}

impl<F> EventSink for F
where
    F: Fn(&LedgerEvent) + Send + Sync,
{
    fn publish(&self, event: &LedgerEvent) {
        self(event)
    }
}
