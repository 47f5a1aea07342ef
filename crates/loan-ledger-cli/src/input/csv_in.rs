use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use uuid::Uuid;

use loan_ledger_core::book::NewLoan;
use loan_ledger_core::ledger::{Borrower, LoanAccount, Payment};
use loan_ledger_core::LoanId;

/// One line of a loans CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoanRow {
    pub borrower_id: String,
    pub borrower_name: String,
    pub organization: String,
    #[serde(default)]
    pub employee_number: Option<String>,
    pub principal: Decimal,
    pub term: u32,
    pub start_date: NaiveDate,
}

impl LoanRow {
    pub fn borrower(&self) -> Borrower {
        Borrower {
            id: self.borrower_id.clone(),
            name: self.borrower_name.clone(),
            organization: self.organization.clone(),
            employee_number: self.employee_number.clone(),
            payroll_officer_id: None,
        }
    }

    pub fn new_loan(&self) -> NewLoan {
        NewLoan {
            loan_id: None,
            borrower_id: self.borrower_id.clone(),
            principal: self.principal,
            term: self.term,
            start_date: self.start_date,
        }
    }
}

/// One line of a repayments CSV. Either `loan_id` or `borrower_id` identifies the loan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentRow {
    pub external_id: String,
    #[serde(default)]
    pub loan_id: Option<Uuid>,
    #[serde(default)]
    pub borrower_id: Option<String>,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
}

impl PaymentRow {
    /// Resolve the target loan. A bare `borrower_id` maps to that borrower's
    /// oldest loan that is still open.
    pub fn into_payment(self, accounts: &[LoanAccount]) -> Result<Payment, String> {
        let loan_id: LoanId = match (self.loan_id, self.borrower_id.as_deref()) {
            (Some(id), _) => id,
            (None, Some(borrower_id)) => accounts
                .iter()
                .filter(|a| a.loan.borrower_id == borrower_id && !a.loan.status.is_terminal())
                .min_by_key(|a| (a.loan.start_date, a.loan.created_at))
                .map(|a| a.loan.id)
                .ok_or_else(|| format!("Borrower {borrower_id} has no open loan"))?,
            (None, None) => return Err("Row needs a loan_id or a borrower_id".into()),
        };
        Ok(Payment {
            external_id: self.external_id,
            loan_id,
            amount: self.amount,
            paid_on: self.paid_on,
            note: self.note,
        })
    }
}

/// Failure attached to a CSV line (1-based, header is line 1).
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub file: String,
    pub line: usize,
    pub error: String,
}

/// Deserialise every row, keeping per-row parse errors instead of aborting.
pub fn read_rows<T, R>(reader: R) -> Vec<(usize, Result<T, String>)>
where
    T: DeserializeOwned,
    R: io::Read,
{
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    rdr.deserialize::<T>()
        .enumerate()
        .map(|(i, row)| (i + 2, row.map_err(|e| e.to_string())))
        .collect()
}

/// Open `path` and read its rows.
pub fn read_rows_from_path<T: DeserializeOwned>(
    path: &str,
) -> Result<Vec<(usize, Result<T, String>)>, Box<dyn std::error::Error>> {
    let canonical = super::file::resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to open '{}': {}", canonical.display(), e))?;
    Ok(read_rows(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_loan_rows_parse_with_optional_employee_number() {
        let csv = "borrower_id,borrower_name,organization,employee_number,principal,term,start_date\n\
                   B-1, Ama Mensah ,MoH,EMP-1,10000,10,2026-01-05\n\
                   B-2,Kofi Boateng,MoH,,5000,12,2026-01-19\n";
        let rows: Vec<(usize, Result<LoanRow, String>)> = read_rows(csv.as_bytes());
        assert_eq!(rows.len(), 2);

        let (line, first) = &rows[0];
        let first = first.as_ref().unwrap();
        assert_eq!(*line, 2);
        assert_eq!(first.borrower_name, "Ama Mensah");
        assert_eq!(first.principal, dec!(10000));
        assert_eq!(first.new_loan().term, 10);

        let second = rows[1].1.as_ref().unwrap();
        assert_eq!(second.employee_number, None);
        assert_eq!(second.borrower().organization, "MoH");
    }

    #[test]
    fn test_bad_row_reported_without_losing_others() {
        let csv = "borrower_id,borrower_name,organization,employee_number,principal,term,start_date\n\
                   B-1,Ama,MoH,,10000,10,not-a-date\n\
                   B-2,Kofi,MoH,,5000,12,2026-01-19\n";
        let rows: Vec<(usize, Result<LoanRow, String>)> = read_rows(csv.as_bytes());
        assert!(rows[0].1.is_err());
        assert_eq!(rows[0].0, 2);
        assert!(rows[1].1.is_ok());
    }

    #[test]
    fn test_payment_row_needs_a_target() {
        let csv = "external_id,borrower_id,amount,paid_on,note\nTX-1,,500,2026-01-05,\n";
        let rows: Vec<(usize, Result<PaymentRow, String>)> = read_rows(csv.as_bytes());
        let row = rows[0].1.clone().unwrap();
        assert!(row.into_payment(&[]).is_err());
    }
}
