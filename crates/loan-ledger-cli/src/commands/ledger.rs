use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use loan_ledger_core::{EngineConfig, LoanBook, LoanId, Money};

use crate::commands::as_of_or_today;
use crate::input::csv_in::{self, LoanRow, PaymentRow, RowFailure};
use crate::state;

/// Arguments for CSV bulk import
#[derive(Args)]
pub struct ImportArgs {
    /// Loans CSV: borrower_id,borrower_name,organization,employee_number,principal,term,start_date
    #[arg(long)]
    pub loans: Option<String>,

    /// Repayments CSV: external_id,loan_id|borrower_id,amount,paid_on,note
    #[arg(long)]
    pub payments: Option<String>,

    /// JSON state file (created if missing)
    #[arg(long)]
    pub state: String,
}

/// Arguments for a batch arrears scan
#[derive(Args)]
pub struct ScanArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,

    /// Scan date (YYYY-MM-DD, default today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

/// Arguments for an operator write-off
#[derive(Args)]
pub struct WriteOffArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,

    /// Loan to write off
    #[arg(long)]
    pub loan_id: Uuid,

    /// Write-off date (YYYY-MM-DD, default today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Default, Serialize)]
struct ImportReport {
    loans_opened: usize,
    opened_loan_ids: Vec<LoanId>,
    payments_applied: usize,
    amount_applied: Money,
    duplicates_ignored: usize,
    failures: Vec<RowFailure>,
}

fn import_loans(book: &LoanBook, path: &str, report: &mut ImportReport) -> Result<(), Box<dyn std::error::Error>> {
    for (line, row) in csv_in::read_rows_from_path::<LoanRow>(path)? {
        let opened = row.and_then(|row| {
            book.register_borrower(row.borrower()).map_err(|e| e.to_string())?;
            book.open_loan(row.new_loan(), Utc::now()).map_err(|e| e.to_string())
        });
        match opened {
            Ok(account) => {
                report.loans_opened += 1;
                report.opened_loan_ids.push(account.loan.id);
            }
            Err(error) => {
                warn!(file = path, line, %error, "loan row rejected");
                report.failures.push(RowFailure {
                    file: path.to_string(),
                    line,
                    error,
                });
            }
        }
    }
    Ok(())
}

fn import_payments(book: &LoanBook, path: &str, report: &mut ImportReport) -> Result<(), Box<dyn std::error::Error>> {
    for (line, row) in csv_in::read_rows_from_path::<PaymentRow>(path)? {
        let applied = row.and_then(|row| {
            let accounts = book.loans().map_err(|e| e.to_string())?;
            let payment = row.into_payment(&accounts)?;
            book.apply_payment(&payment).map_err(|e| e.to_string())
        });
        match applied {
            Ok(result) if result.duplicate => report.duplicates_ignored += 1,
            Ok(result) => {
                report.payments_applied += 1;
                report.amount_applied += result.allocations.iter().map(|a| a.amount).sum::<Money>()
                    + result.credit_added;
            }
            Err(error) => {
                warn!(file = path, line, %error, "payment row rejected");
                report.failures.push(RowFailure {
                    file: path.to_string(),
                    line,
                    error,
                });
            }
        }
    }
    Ok(())
}

pub fn run_import(args: ImportArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    if args.loans.is_none() && args.payments.is_none() {
        return Err("--loans and/or --payments is required".into());
    }
    let book = state::load_or_create_book(&args.state, config)?;
    let mut report = ImportReport::default();

    if let Some(ref path) = args.loans {
        import_loans(&book, path, &mut report)?;
    }
    if let Some(ref path) = args.payments {
        import_payments(&book, path, &mut report)?;
    }

    state::save_book(&args.state, &book)?;
    Ok(serde_json::to_value(report)?)
}

pub fn run_scan(args: ScanArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let book = state::load_book(&args.state, config)?;
    let report = book.scan_all(as_of_or_today(args.as_of))?;
    state::save_book(&args.state, &book)?;
    Ok(serde_json::to_value(report)?)
}

pub fn run_write_off(args: WriteOffArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let book = state::load_book(&args.state, config)?;
    let account = book.write_off(args.loan_id, as_of_or_today(args.as_of))?;
    state::save_book(&args.state, &book)?;
    Ok(serde_json::to_value(account.summary())?)
}
