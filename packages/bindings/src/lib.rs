use chrono::{DateTime, NaiveDate, Utc};
use napi::Result as NapiResult;
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use loan_ledger_core::ledger::{self, Borrower, DefaultFeeRule, Loan, LoanAccount, LoanStatus, Payment};
use loan_ledger_core::pricing::{self, FeeConfig};
use loan_ledger_core::recovery::{self, DeductionRequest, NewDeductionRequest, RecoveryFilter};
use loan_ledger_core::schedule;
use loan_ledger_core::{EngineConfig, Money};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse<'a, T: Deserialize<'a>>(input_json: &'a str) -> NapiResult<T> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

fn render(output: &impl Serialize) -> NapiResult<String> {
    serde_json::to_string(output).map_err(to_napi_error)
}

/// The account after an operation, plus what the operation reported.
#[derive(Serialize)]
struct AccountUpdate<T: Serialize> {
    account: LoanAccount,
    result: T,
}

// ---------------------------------------------------------------------------
// Pricing and schedules
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct InstallmentInput {
    principal: Money,
    term: u32,
    #[serde(default)]
    fees: FeeConfig,
}

#[derive(Deserialize)]
struct OpenLoanInput {
    #[serde(default)]
    loan_id: Option<Uuid>,
    borrower_id: String,
    principal: Money,
    term: u32,
    start_date: NaiveDate,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    fees: FeeConfig,
}

#[napi]
pub fn rate_table() -> NapiResult<String> {
    render(&pricing::supported_terms())
}

#[napi]
pub fn compute_installment(input_json: String) -> NapiResult<String> {
    let input: InstallmentInput = parse(&input_json)?;
    let output = pricing::compute_installment(input.principal, input.term, &input.fees).map_err(to_napi_error)?;
    render(&output)
}

/// Price a loan and lay out its schedule, returning the new account for the
/// caller to persist.
#[napi]
pub fn generate_schedule(input_json: String) -> NapiResult<String> {
    let input: OpenLoanInput = parse(&input_json)?;
    let breakdown = pricing::compute_installment(input.principal, input.term, &input.fees)
        .map_err(to_napi_error)?
        .result;
    let loan_id = input.loan_id.unwrap_or_else(Uuid::new_v4);
    let entries = schedule::generate_schedule(loan_id, &breakdown, input.start_date).map_err(to_napi_error)?;
    let loan = Loan::from_breakdown(
        loan_id,
        input.borrower_id,
        &breakdown,
        input.start_date,
        input.created_at.unwrap_or_else(Utc::now),
    );
    let account = LoanAccount::open(loan, entries).map_err(to_napi_error)?;
    render(&account)
}

// ---------------------------------------------------------------------------
// Reconciliation, arrears and status
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PaymentInput {
    account: LoanAccount,
    payment: Payment,
}

#[derive(Deserialize)]
struct ScanInput {
    account: LoanAccount,
    as_of: NaiveDate,
    #[serde(default)]
    default_fee: DefaultFeeRule,
}

#[derive(Deserialize)]
struct WriteOffInput {
    account: LoanAccount,
    as_of: NaiveDate,
    #[serde(default)]
    grace_days: Option<u32>,
}

#[derive(Serialize)]
struct StatusTransition {
    from: LoanStatus,
    to: LoanStatus,
}

#[napi]
pub fn apply_payment(input_json: String) -> NapiResult<String> {
    let mut input: PaymentInput = parse(&input_json)?;
    input.account.validate().map_err(to_napi_error)?;
    let result = ledger::apply_payment(&mut input.account, &input.payment).map_err(to_napi_error)?;
    render(&AccountUpdate {
        account: input.account,
        result,
    })
}

#[napi]
pub fn scan_arrears(input_json: String) -> NapiResult<String> {
    let mut input: ScanInput = parse(&input_json)?;
    input.default_fee.validate().map_err(to_napi_error)?;
    input.account.validate().map_err(to_napi_error)?;
    let result =
        ledger::scan_arrears(&mut input.account, input.as_of, &input.default_fee).map_err(to_napi_error)?;
    render(&AccountUpdate {
        account: input.account,
        result,
    })
}

#[napi]
pub fn write_off(input_json: String) -> NapiResult<String> {
    let mut input: WriteOffInput = parse(&input_json)?;
    let grace_days = input
        .grace_days
        .unwrap_or(EngineConfig::default().write_off_grace_days);
    let from = ledger::write_off(&mut input.account, input.as_of, grace_days).map_err(to_napi_error)?;
    render(&AccountUpdate {
        result: StatusTransition {
            from,
            to: input.account.loan.status,
        },
        account: input.account,
    })
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CandidatesInput {
    accounts: Vec<LoanAccount>,
    borrowers: Vec<Borrower>,
    filter: RecoveryFilter,
}

#[derive(Deserialize)]
struct CreateRequestInput {
    request: NewDeductionRequest,
    accounts: Vec<LoanAccount>,
    borrowers: Vec<Borrower>,
    #[serde(default)]
    existing: Vec<DeductionRequest>,
    #[serde(default)]
    at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TransitionInput {
    request: DeductionRequest,
    #[serde(default)]
    at: Option<DateTime<Utc>>,
}

fn borrower_index(borrowers: Vec<Borrower>) -> HashMap<String, Borrower> {
    borrowers.into_iter().map(|b| (b.id.clone(), b)).collect()
}

#[napi]
pub fn build_deduction_candidates(input_json: String) -> NapiResult<String> {
    let input: CandidatesInput = parse(&input_json)?;
    let borrowers = borrower_index(input.borrowers);
    render(&recovery::build_candidates(&input.accounts, &borrowers, &input.filter))
}

#[napi]
pub fn create_deduction_request(input_json: String) -> NapiResult<String> {
    let input: CreateRequestInput = parse(&input_json)?;
    let at = input.at.unwrap_or_else(Utc::now);
    let mut filter = RecoveryFilter::new(at.date_naive()).organization(input.request.organization.clone());
    filter.pay_period = input.request.pay_period;

    let borrowers = borrower_index(input.borrowers);
    let candidates = recovery::build_candidates(&input.accounts, &borrowers, &filter);
    let output =
        recovery::create_request(&input.request, &candidates, &input.existing, at).map_err(to_napi_error)?;
    render(&output)
}

fn transition(
    input_json: &str,
    step: impl FnOnce(&mut DeductionRequest, DateTime<Utc>) -> loan_ledger_core::LedgerResult<()>,
) -> NapiResult<String> {
    let mut input: TransitionInput = parse(input_json)?;
    step(&mut input.request, input.at.unwrap_or_else(Utc::now)).map_err(to_napi_error)?;
    render(&input.request)
}

#[napi]
pub fn send_request(input_json: String) -> NapiResult<String> {
    transition(&input_json, DeductionRequest::send)
}

#[napi]
pub fn acknowledge_request(input_json: String) -> NapiResult<String> {
    transition(&input_json, DeductionRequest::acknowledge)
}

#[napi]
pub fn complete_request(input_json: String) -> NapiResult<String> {
    transition(&input_json, DeductionRequest::complete)
}
