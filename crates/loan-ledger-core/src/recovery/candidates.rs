use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::ledger::{Borrower, LoanAccount, LoanStatus};
use crate::types::{LoanId, Money, PayPeriod};

/// Which loans to consider for recovery, and as of when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryFilter {
    pub as_of: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_period: Option<PayPeriod>,
}

impl RecoveryFilter {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            organization: None,
            pay_period: None,
        }
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn pay_period(mut self, period: PayPeriod) -> Self {
        self.pay_period = Some(period);
        self
    }
}

/// Point-in-time view of one client's arrears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub loan_id: LoanId,
    pub borrower_id: String,
    pub borrower_name: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    pub loan_status: LoanStatus,
    pub arrears_amount: Money,
    pub default_fees: Money,
    /// arrears_amount + default_fees.
    pub amount_due: Money,
    pub outstanding_balance: Money,
    pub installment_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_overdue_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_period: Option<PayPeriod>,
    pub as_of: NaiveDate,
}

/// Aggregation key for candidates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub organization: String,
    pub pay_period: Option<PayPeriod>,
}

/// Overdue, or carrying a missed/partial installment, and not yet closed.
pub fn is_recovery_candidate(account: &LoanAccount, as_of: NaiveDate) -> bool {
    if account.loan.status.is_terminal() {
        return false;
    }
    account.loan.status == LoanStatus::Overdue
        || account.has_missed_or_partial()
        || account.arrears_as_of(as_of) > rust_decimal::Decimal::ZERO
}

fn in_pay_period(account: &LoanAccount, period: &PayPeriod) -> bool {
    account
        .entries
        .iter()
        .any(|e| e.is_open() && e.due_date <= period.end)
}

fn snapshot(account: &LoanAccount, borrower: &Borrower, filter: &RecoveryFilter) -> RecoveryRecord {
    let loan = &account.loan;
    let arrears_amount = account.arrears_as_of(filter.as_of);
    RecoveryRecord {
        loan_id: loan.id,
        borrower_id: borrower.id.clone(),
        borrower_name: borrower.name.clone(),
        organization: borrower.organization.clone(),
        employee_number: borrower.employee_number.clone(),
        loan_status: loan.status,
        arrears_amount,
        default_fees: loan.default_fees_accrued,
        amount_due: arrears_amount + loan.default_fees_accrued,
        outstanding_balance: loan.outstanding_balance,
        installment_amount: loan.installment_amount,
        oldest_overdue_date: account.oldest_overdue_date(filter.as_of),
        pay_period: filter.pay_period,
        as_of: filter.as_of,
    }
}

/// Select recovery candidates and snapshot their arrears. Read-only.
///
/// Loans whose borrower is unknown are skipped with a warning rather than
/// failing the whole selection.
pub fn build_candidates<'a>(
    accounts: impl IntoIterator<Item = &'a LoanAccount>,
    borrowers: &HashMap<String, Borrower>,
    filter: &RecoveryFilter,
) -> Vec<RecoveryRecord> {
    let mut records: Vec<RecoveryRecord> = accounts
        .into_iter()
        .filter(|acct| is_recovery_candidate(acct, filter.as_of))
        .filter(|acct| {
            filter
                .pay_period
                .as_ref()
                .map_or(true, |period| in_pay_period(acct, period))
        })
        .filter_map(|acct| match borrowers.get(&acct.loan.borrower_id) {
            Some(borrower) => Some((acct, borrower)),
            None => {
                warn!(
                    loan_id = %acct.loan.id,
                    borrower_id = %acct.loan.borrower_id,
                    "recovery candidate has no borrower record, skipping"
                );
                None
            }
        })
        .filter(|(_, borrower)| {
            filter
                .organization
                .as_deref()
                .map_or(true, |org| borrower.organization == org)
        })
        .map(|(acct, borrower)| snapshot(acct, borrower, filter))
        .collect();

    records.sort_by(|a, b| {
        (&a.organization, &a.borrower_name, a.loan_id).cmp(&(&b.organization, &b.borrower_name, b.loan_id))
    });
    records
}

/// Bucket candidates by `(organization, pay_period)`.
pub fn group_candidates(records: &[RecoveryRecord]) -> BTreeMap<GroupKey, Vec<RecoveryRecord>> {
    let mut groups: BTreeMap<GroupKey, Vec<RecoveryRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(GroupKey {
                organization: record.organization.clone(),
                pay_period: record.pay_period,
            })
            .or_default()
            .push(record.clone());
    }
    groups
}
