//! Loan status state machine.
//!
//! ```text
//! Active ──> Overdue ──> WrittenOff (operator only, terminal)
//!   │  <──────┘ │
//!   └──────> Settled <┘ (terminal)
//! ```
//!
//! Status is always derived from schedule entries; the only transition set
//! directly is the operator write-off.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::LedgerError;
use crate::ledger::account::LoanAccount;
use crate::schedule::{EntryStatus, ScheduleEntry};
use crate::LedgerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Overdue,
    Settled,
    WrittenOff,
}

impl LoanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Settled | LoanStatus::WrittenOff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Settled => "settled",
            LoanStatus::WrittenOff => "written_off",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status implied by the entries as of `as_of`.
///
/// Entries a scan has already defaulted keep the loan overdue even when
/// `as_of` precedes their due date, so back-dated payments and re-scans
/// cannot clear arrears that are still owed.
pub fn derive_status(entries: &[ScheduleEntry], as_of: NaiveDate, current: LoanStatus) -> LoanStatus {
    if current.is_terminal() {
        return current;
    }
    if entries.iter().all(|e| e.status == EntryStatus::Paid) {
        return LoanStatus::Settled;
    }
    if entries.iter().any(|e| e.is_past_due(as_of) || is_defaulted(e)) {
        LoanStatus::Overdue
    } else {
        LoanStatus::Active
    }
}

/// Marked missed by a scan and not yet paid off.
fn is_defaulted(entry: &ScheduleEntry) -> bool {
    match entry.status {
        EntryStatus::Missed => true,
        EntryStatus::Partial => entry.fee_charged,
        EntryStatus::Scheduled | EntryStatus::Paid => false,
    }
}

/// Operator write-off of an overdue loan whose oldest arrears exceed the grace horizon.
///
/// Returns the status the loan was written off from, derived as of `as_of`.
pub fn write_off(account: &mut LoanAccount, as_of: NaiveDate, grace_days: u32) -> LedgerResult<LoanStatus> {
    let from = derive_status(&account.entries, as_of, account.loan.status);
    let reject = |reason: String| LedgerError::InvalidTransition {
        entity: format!("loan {}", account.loan.id),
        from: from.to_string(),
        to: LoanStatus::WrittenOff.to_string(),
        reason,
    };

    if from != LoanStatus::Overdue {
        return Err(reject("Only overdue loans can be written off".into()));
    }

    let oldest = account
        .oldest_overdue_date(as_of)
        .ok_or_else(|| reject("Loan has no past-due entries".into()))?;
    let eligible_from = oldest
        .checked_add_days(Days::new(u64::from(grace_days)))
        .ok_or_else(|| LedgerError::DateError(format!("Grace horizon from {oldest} is out of range")))?;
    if as_of < eligible_from {
        return Err(reject(format!(
            "Arrears since {oldest} are within the {grace_days}-day grace horizon (eligible from {eligible_from})"
        )));
    }

    account.loan.status = LoanStatus::WrittenOff;
    account.loan.written_off_on = Some(as_of);
    account.touch();
    info!(loan_id = %account.loan.id, %as_of, %oldest, %from, "loan written off");
    Ok(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn entries() -> Vec<ScheduleEntry> {
        let id = Uuid::new_v4();
        vec![
            ScheduleEntry::new(id, 1, date(1, 5), dec!(100)),
            ScheduleEntry::new(id, 2, date(1, 19), dec!(100)),
        ]
    }

    #[test]
    fn test_active_before_first_due_date() {
        assert_eq!(derive_status(&entries(), date(1, 5), LoanStatus::Active), LoanStatus::Active);
    }

    #[test]
    fn test_overdue_after_due_date_passes() {
        assert_eq!(derive_status(&entries(), date(1, 6), LoanStatus::Active), LoanStatus::Overdue);
    }

    #[test]
    fn test_settled_when_all_paid() {
        let mut e = entries();
        for entry in &mut e {
            entry.amount_received = entry.expected_amount;
            entry.status = EntryStatus::Paid;
        }
        assert_eq!(derive_status(&e, date(3, 1), LoanStatus::Overdue), LoanStatus::Settled);
        assert_eq!(derive_status(&e, date(1, 1), LoanStatus::Active), LoanStatus::Settled);
    }

    #[test]
    fn test_overdue_returns_to_active_once_caught_up() {
        let mut e = entries();
        e[0].amount_received = dec!(100);
        e[0].status = EntryStatus::Paid;
        assert_eq!(derive_status(&e, date(1, 10), LoanStatus::Overdue), LoanStatus::Active);
    }

    #[test]
    fn test_missed_entries_stay_overdue_for_earlier_dates() {
        let mut e = entries();
        e[0].status = EntryStatus::Missed;
        e[0].fee_charged = true;
        assert_eq!(derive_status(&e, date(1, 2), LoanStatus::Overdue), LoanStatus::Overdue);

        // Partly paid after the scan: still in arrears.
        e[0].amount_received = dec!(40);
        e[0].status = EntryStatus::Partial;
        assert_eq!(derive_status(&e, date(1, 2), LoanStatus::Overdue), LoanStatus::Overdue);

        e[0].amount_received = dec!(100);
        e[0].status = EntryStatus::Paid;
        assert_eq!(derive_status(&e, date(1, 2), LoanStatus::Overdue), LoanStatus::Active);
    }

    #[test]
    fn test_unscanned_partial_is_not_overdue_before_due_date() {
        let mut e = entries();
        e[0].amount_received = dec!(40);
        e[0].status = EntryStatus::Partial;
        assert_eq!(derive_status(&e, date(1, 5), LoanStatus::Active), LoanStatus::Active);
    }

    #[test]
    fn test_write_off_reports_derived_from_status() {
        use crate::ledger::account::Loan;
        use crate::pricing::{compute_installment, FeeConfig};
        use crate::schedule::generate_schedule;
        use chrono::{TimeZone, Utc};

        let b = compute_installment(dec!(10000), 10, &FeeConfig::default())
            .unwrap()
            .result;
        let id = Uuid::new_v4();
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let entries = generate_schedule(id, &b, date(1, 5)).unwrap();
        let mut account = LoanAccount::open(Loan::from_breakdown(id, "B-1", &b, date(1, 5), created), entries).unwrap();
        assert_eq!(account.loan.status, LoanStatus::Active);

        let from = write_off(&mut account, date(4, 5), 90).unwrap();
        assert_eq!(from, LoanStatus::Overdue);
        assert_eq!(account.loan.status, LoanStatus::WrittenOff);
        assert_eq!(account.loan.written_off_on, Some(date(4, 5)));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert_eq!(
            derive_status(&entries(), date(1, 2), LoanStatus::WrittenOff),
            LoanStatus::WrittenOff
        );
        assert_eq!(
            derive_status(&entries(), date(6, 1), LoanStatus::Settled),
            LoanStatus::Settled
        );
    }
}
