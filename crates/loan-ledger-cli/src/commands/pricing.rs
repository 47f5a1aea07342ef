use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use loan_ledger_core::pricing::{compute_installment, supported_terms, InstallmentBreakdown};
use loan_ledger_core::schedule::{generate_schedule, ScheduleEntry};
use loan_ledger_core::{ComputationOutput, EngineConfig};

use crate::input;

/// Arguments for an installment quote
#[derive(Args)]
pub struct InstallmentArgs {
    /// Principal in whole minor units (e.g. 10000)
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Number of bi-weekly periods (5-30)
    #[arg(long)]
    pub term: Option<u32>,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for schedule generation
#[derive(Args)]
pub struct ScheduleArgs {
    /// Principal in whole minor units
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Number of bi-weekly periods (5-30)
    #[arg(long)]
    pub term: Option<u32>,

    /// Due date of the first installment (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteInput {
    principal: Decimal,
    term: u32,
    #[serde(default)]
    start_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct ScheduleQuote {
    breakdown: InstallmentBreakdown,
    entries: Vec<ScheduleEntry>,
}

fn quote_input(
    path: Option<&str>,
    principal: Option<Decimal>,
    term: Option<u32>,
    start_date: Option<NaiveDate>,
) -> Result<QuoteInput, Box<dyn std::error::Error>> {
    if let Some(parsed) = input::read_json_input::<QuoteInput>(path)? {
        return Ok(parsed);
    }
    match (principal, term) {
        (Some(principal), Some(term)) => Ok(QuoteInput {
            principal,
            term,
            start_date,
        }),
        _ => Err("--principal and --term (or --input <file.json> / stdin) are required".into()),
    }
}

pub fn run_rates() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(supported_terms())?)
}

pub fn run_installment(args: InstallmentArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let quote = quote_input(args.input.as_deref(), args.principal, args.term, None)?;
    let result = compute_installment(quote.principal, quote.term, &config.fees)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_schedule(args: ScheduleArgs, config: &EngineConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let quote = quote_input(args.input.as_deref(), args.principal, args.term, args.start_date)?;
    let start_date = quote
        .start_date
        .ok_or("--start-date is required to lay out due dates")?;

    let priced = compute_installment(quote.principal, quote.term, &config.fees)?;
    let entries = generate_schedule(Uuid::new_v4(), &priced.result, start_date)?;
    let output = ComputationOutput {
        result: ScheduleQuote {
            breakdown: priced.result,
            entries,
        },
        methodology: priced.methodology,
        assumptions: priced.assumptions,
        warnings: priced.warnings,
        metadata: priced.metadata,
    };
    Ok(serde_json::to_value(output)?)
}
