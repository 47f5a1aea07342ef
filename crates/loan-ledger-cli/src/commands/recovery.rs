use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use loan_ledger_core::recovery::{
    group_candidates, DeductionRequest, NewDeductionRequest, RecoveryFilter, RecoveryRecord,
};
use loan_ledger_core::{EngineConfig, LedgerResult, LoanBook, Money, PayPeriod};

use crate::commands::as_of_or_today;
use crate::{input, state};

/// Pay period bounds shared by recovery commands
#[derive(Args)]
pub struct PeriodArgs {
    /// First day of the payroll period (YYYY-MM-DD)
    #[arg(long, requires = "period_end")]
    pub period_start: Option<NaiveDate>,

    /// Last day of the payroll period (YYYY-MM-DD)
    #[arg(long, requires = "period_start")]
    pub period_end: Option<NaiveDate>,
}

impl PeriodArgs {
    fn pay_period(&self) -> Result<Option<PayPeriod>, Box<dyn std::error::Error>> {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => Ok(Some(PayPeriod::new(start, end)?)),
            _ => Ok(None),
        }
    }
}

/// Arguments for listing recovery candidates
#[derive(Args)]
pub struct CandidatesArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,

    /// Snapshot date (YYYY-MM-DD, default today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Only borrowers employed by this organization
    #[arg(long)]
    pub organization: Option<String>,

    #[command(flatten)]
    pub period: PeriodArgs,

    /// Summarise by organization and pay period instead of listing clients
    #[arg(long)]
    pub group: bool,
}

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Create a pending deduction request from recovery candidates
    Create(CreateRequestArgs),
    /// Mark a pending request as sent to the payroll officer
    Send(TransitionArgs),
    /// Record the payroll officer's acknowledgement
    Acknowledge(TransitionArgs),
    /// Close an acknowledged request
    Complete(TransitionArgs),
    /// List every deduction request in the state file
    List(ListRequestsArgs),
}

/// Arguments for creating a deduction request
#[derive(Args)]
pub struct CreateRequestArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,

    /// Employer organization
    #[arg(long)]
    pub organization: Option<String>,

    /// Payroll officer receiving the request
    #[arg(long)]
    pub payroll_officer_id: Option<String>,

    /// Loans to include (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub loan_ids: Vec<Uuid>,

    #[command(flatten)]
    pub period: PeriodArgs,

    /// Free-text notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct TransitionArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,

    /// Deduction request id
    #[arg(long)]
    pub request_id: Uuid,
}

#[derive(Args)]
pub struct ListRequestsArgs {
    /// JSON state file
    #[arg(long)]
    pub state: String,
}

#[derive(Debug, Serialize)]
struct CandidateGroup {
    organization: String,
    pay_period: Option<String>,
    clients: usize,
    total_arrears: Money,
    total_default_fees: Money,
    total_amount_due: Money,
}

fn summarise(records: &[RecoveryRecord]) -> Vec<CandidateGroup> {
    group_candidates(records)
        .into_iter()
        .map(|(key, members)| CandidateGroup {
            organization: key.organization,
            pay_period: key.pay_period.map(|p| p.to_string()),
            clients: members.len(),
            total_arrears: members.iter().map(|r| r.arrears_amount).sum(),
            total_default_fees: members.iter().map(|r| r.default_fees).sum(),
            total_amount_due: members.iter().map(|r| r.amount_due).sum(),
        })
        .collect()
}

pub fn run_candidates(args: CandidatesArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let book = state::load_book(&args.state, config)?;
    let mut filter = RecoveryFilter::new(as_of_or_today(args.as_of));
    filter.organization = args.organization;
    filter.pay_period = args.period.pay_period()?;

    let records = book.build_deduction_candidates(&filter)?;
    if args.group {
        Ok(serde_json::to_value(summarise(&records))?)
    } else {
        Ok(serde_json::to_value(records)?)
    }
}

fn new_request(args: &CreateRequestArgs) -> Result<NewDeductionRequest, Box<dyn std::error::Error>> {
    if let Some(parsed) = input::read_json_input::<NewDeductionRequest>(args.input.as_deref())? {
        return Ok(parsed);
    }
    let organization = args
        .organization
        .clone()
        .ok_or("--organization is required (or --input <file.json> / stdin)")?;
    let payroll_officer_id = args
        .payroll_officer_id
        .clone()
        .ok_or("--payroll-officer-id is required (or --input <file.json> / stdin)")?;
    Ok(NewDeductionRequest {
        payroll_officer_id,
        organization,
        pay_period: args.period.pay_period()?,
        loan_ids: args.loan_ids.clone(),
        notes: args.notes.clone(),
    })
}

pub fn run_request(cmd: RequestCommand, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    match cmd {
        RequestCommand::Create(args) => {
            let request = new_request(&args)?;
            let book = state::load_book(&args.state, config)?;
            let output = book.create_deduction_request(&request, Utc::now())?;
            state::save_book(&args.state, &book)?;
            Ok(serde_json::to_value(output)?)
        }
        RequestCommand::Send(args) => transition(args, config, |book, id| book.send_request(id, Utc::now())),
        RequestCommand::Acknowledge(args) => {
            transition(args, config, |book, id| book.acknowledge_request(id, Utc::now()))
        }
        RequestCommand::Complete(args) => transition(args, config, |book, id| book.complete_request(id, Utc::now())),
        RequestCommand::List(args) => {
            let book = state::load_book(&args.state, config)?;
            Ok(serde_json::to_value(book.requests()?)?)
        }
    }
}

fn transition<F>(args: TransitionArgs, config: &EngineConfig, step: F) -> Result<Value, Box<dyn std::error::Error>>
where
    F: FnOnce(&LoanBook, Uuid) -> LedgerResult<DeductionRequest>,
{
    let book = state::load_book(&args.state, config)?;
    let request = step(&book, args.request_id)?;
    state::save_book(&args.state, &book)?;
    Ok(serde_json::to_value(request)?)
}
