//! Repayment schedule generation.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::LedgerError;
use crate::pricing::InstallmentBreakdown;
use crate::schedule::entry::ScheduleEntry;
use crate::types::{LoanId, Money, PERIOD_DAYS};
use crate::LedgerResult;

/// Due date of the 1-based `sequence`; the first installment falls on `start_date`.
pub fn due_date_for(start_date: NaiveDate, sequence: u32) -> LedgerResult<NaiveDate> {
    if sequence == 0 {
        return Err(LedgerError::InvalidInput {
            field: "sequence".into(),
            reason: "Schedule sequences start at 1".into(),
        });
    }
    let offset = PERIOD_DAYS * u64::from(sequence - 1);
    start_date
        .checked_add_days(Days::new(offset))
        .ok_or_else(|| {
            LedgerError::DateError(format!(
                "Due date for installment {sequence} from {start_date} is out of range"
            ))
        })
}

/// Build the full schedule for a loan from its breakdown.
///
/// Produces exactly `term` entries spaced [`PERIOD_DAYS`] apart. Every entry
/// expects the base installment except the last, which expects the remainder,
/// so the entries always sum to the gross repayable amount.
pub fn generate_schedule(
    loan_id: LoanId,
    breakdown: &InstallmentBreakdown,
    start_date: NaiveDate,
) -> LedgerResult<Vec<ScheduleEntry>> {
    let periods = breakdown.term.periods();
    let mut entries = Vec::with_capacity(periods as usize);

    for sequence in 1..=periods {
        let due_date = due_date_for(start_date, sequence)?;
        entries.push(ScheduleEntry::new(
            loan_id,
            sequence,
            due_date,
            breakdown.amount_for(sequence),
        ));
    }

    let total: Money = entries.iter().map(|e| e.expected_amount).sum();
    if total != breakdown.gross_repayable {
        return Err(LedgerError::ScheduleInvariant {
            loan_id,
            reason: format!(
                "Entries sum to {total} but gross repayable is {}",
                breakdown.gross_repayable
            ),
        });
    }
    if entries.iter().any(|e| e.expected_amount <= Decimal::ZERO) {
        return Err(LedgerError::ScheduleInvariant {
            loan_id,
            reason: "Every installment must be positive".into(),
        });
    }

    debug!(%loan_id, periods, %start_date, "generated repayment schedule");
    Ok(entries)
}
