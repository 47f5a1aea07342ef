mod commands;
mod config;
mod input;
mod output;
mod state;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::ledger::{ImportArgs, ScanArgs, WriteOffArgs};
use commands::pricing::{InstallmentArgs, ScheduleArgs};
use commands::recovery::{CandidatesArgs, RequestCommand};

/// Loan amortization, repayment reconciliation and payroll recovery
#[derive(Parser)]
#[command(
    name = "lle",
    version,
    about = "Loan amortization, repayment reconciliation and payroll recovery",
    long_about = "A CLI over the loan ledger engine. Quotes installments and schedules, \
                  bulk-imports loans and repayments from CSV, scans for arrears, and \
                  manages payroll deduction requests against a JSON state file."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the term -> interest rate table
    Rates,
    /// Price a loan: interest, insurance, fees and installment
    Installment(InstallmentArgs),
    /// Generate the bi-weekly repayment schedule for a loan
    Schedule(ScheduleArgs),
    /// Bulk-import loans and repayments from CSV into a state file
    Import(ImportArgs),
    /// Scan every open loan for arrears and accrue default fees
    Scan(ScanArgs),
    /// Write off an overdue loan past its grace horizon
    WriteOff(WriteOffArgs),
    /// List recovery candidates
    Candidates(CandidatesArgs),
    /// Create and advance payroll deduction requests
    #[command(subcommand)]
    Request(RequestCommand),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("LLE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };
    init_tracing(&cfg.log_level);

    let engine = cfg.engine;
    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Rates => commands::pricing::run_rates(),
        Commands::Installment(args) => commands::pricing::run_installment(args, &engine),
        Commands::Schedule(args) => commands::pricing::run_schedule(args, &engine),
        Commands::Import(args) => commands::ledger::run_import(args, &engine),
        Commands::Scan(args) => commands::ledger::run_scan(args, &engine),
        Commands::WriteOff(args) => commands::ledger::run_write_off(args, &engine),
        Commands::Candidates(args) => commands::recovery::run_candidates(args, &engine),
        Commands::Request(cmd) => commands::recovery::run_request(cmd, &engine),
        Commands::Version => {
            println!("lle {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
