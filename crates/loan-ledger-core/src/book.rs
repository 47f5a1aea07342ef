//! In-memory loan book: the operation facade over the ledger engine.
//!
//! Every loan lives behind its own mutex, so payments and scans for one loan
//! are serialised while different loans proceed in parallel. The registry
//! maps are only write-locked to insert or replace entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::events::{EventSink, LedgerEvent};
use crate::ledger::{
    apply_payment, scan_arrears, write_off, ArrearsResult, Borrower, DefaultFeePolicy, Loan, LoanAccount, LoanStatus,
    Payment, ReconciliationResult,
};
use crate::pricing::{compute_installment, InstallmentBreakdown};
use crate::schedule::generate_schedule;
use crate::types::{ComputationOutput, LoanId, Money};
use crate::LedgerResult;

#[cfg(feature = "recovery")]
use crate::recovery::{build_candidates, create_request, DeductionRequest, NewDeductionRequest, RecoveryFilter, RecoveryRecord};
#[cfg(feature = "recovery")]
use crate::types::RequestId;

/// Request to disburse a new loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLoan {
    /// Caller-supplied id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<LoanId>,
    pub borrower_id: String,
    pub principal: Money,
    pub term: u32,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub loan_id: LoanId,
    pub error: String,
}

/// Outcome of scanning every loan in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScanReport {
    pub as_of: NaiveDate,
    pub scanned: usize,
    pub total_arrears: Money,
    pub total_fees_accrued: Money,
    pub results: Vec<ArrearsResult>,
    pub failures: Vec<ScanFailure>,
}

/// Serializable contents of a book, for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub borrowers: Vec<Borrower>,
    pub accounts: Vec<LoanAccount>,
    #[cfg(feature = "recovery")]
    #[serde(default)]
    pub requests: Vec<DeductionRequest>,
}

pub struct LoanBook {
    config: EngineConfig,
    borrowers: RwLock<HashMap<String, Borrower>>,
    accounts: RwLock<HashMap<LoanId, Arc<Mutex<LoanAccount>>>>,
    #[cfg(feature = "recovery")]
    requests: RwLock<HashMap<RequestId, DeductionRequest>>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl Default for LoanBook {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> LedgerResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| LedgerError::LockPoisoned(what.to_string()))
}

fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> LedgerResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| LedgerError::LockPoisoned(what.to_string()))
}

fn lock_account(account: &Mutex<LoanAccount>, loan_id: LoanId) -> LedgerResult<MutexGuard<'_, LoanAccount>> {
    account
        .lock()
        .map_err(|_| LedgerError::LockPoisoned(format!("loan {loan_id}")))
}

impl LoanBook {
    pub fn new(config: EngineConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            borrowers: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            #[cfg(feature = "recovery")]
            requests: RwLock::new(HashMap::new()),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a subscriber for every subsequent [`LedgerEvent`].
    pub fn subscribe(&self, sink: impl EventSink + 'static) -> LedgerResult<()> {
        write(&self.sinks, "event sinks")?.push(Arc::new(sink));
        Ok(())
    }

    fn emit(&self, events: Vec<LedgerEvent>) {
        if events.is_empty() {
            return;
        }
        match self.sinks.read() {
            Ok(sinks) => {
                for event in &events {
                    for sink in sinks.iter() {
                        sink.publish(event);
                    }
                }
            }
            Err(_) => warn!("event sink registry poisoned, dropping {} events", events.len()),
        }
    }

    // -----------------------------------------------------------------------
    // Borrowers and loans
    // -----------------------------------------------------------------------

    /// Insert or replace a borrower.
    pub fn register_borrower(&self, borrower: Borrower) -> LedgerResult<()> {
        borrower.validate()?;
        write(&self.borrowers, "borrowers")?.insert(borrower.id.clone(), borrower);
        Ok(())
    }

    pub fn borrower(&self, borrower_id: &str) -> LedgerResult<Borrower> {
        read(&self.borrowers, "borrowers")?
            .get(borrower_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownBorrower(borrower_id.to_string()))
    }

    /// Price a loan with the book's fee configuration.
    pub fn compute_installment(
        &self,
        principal: Money,
        term: u32,
    ) -> LedgerResult<ComputationOutput<InstallmentBreakdown>> {
        compute_installment(principal, term, &self.config.fees)
    }

    /// Disburse a loan: price it, generate its schedule and register it.
    pub fn open_loan(&self, new_loan: NewLoan, created_at: DateTime<Utc>) -> LedgerResult<LoanAccount> {
        self.borrower(&new_loan.borrower_id)?;
        let breakdown = self.compute_installment(new_loan.principal, new_loan.term)?.result;
        let loan_id = new_loan.loan_id.unwrap_or_else(Uuid::new_v4);

        let mut accounts = write(&self.accounts, "accounts")?;
        if accounts.contains_key(&loan_id) {
            return Err(LedgerError::ScheduleAlreadyGenerated(loan_id));
        }
        let entries = generate_schedule(loan_id, &breakdown, new_loan.start_date)?;
        let loan = Loan::from_breakdown(loan_id, new_loan.borrower_id, &breakdown, new_loan.start_date, created_at);
        let account = LoanAccount::open(loan, entries)?;
        accounts.insert(loan_id, Arc::new(Mutex::new(account.clone())));
        drop(accounts);

        info!(
            %loan_id,
            borrower_id = %account.loan.borrower_id,
            principal = %account.loan.principal,
            term = account.loan.term.periods(),
            "loan opened"
        );
        self.emit(vec![LedgerEvent::LoanOpened {
            loan_id,
            borrower_id: account.loan.borrower_id.clone(),
            gross_repayable: account.loan.gross_repayable,
        }]);
        Ok(account)
    }

    fn account_handle(&self, loan_id: LoanId) -> LedgerResult<Arc<Mutex<LoanAccount>>> {
        read(&self.accounts, "accounts")?
            .get(&loan_id)
            .cloned()
            .ok_or(LedgerError::UnknownLoan(loan_id))
    }

    /// Copy of a loan and its schedule.
    pub fn loan(&self, loan_id: LoanId) -> LedgerResult<LoanAccount> {
        let handle = self.account_handle(loan_id)?;
        let account = lock_account(&handle, loan_id)?;
        Ok(account.clone())
    }

    /// Copies of every loan, oldest first.
    pub fn loans(&self) -> LedgerResult<Vec<LoanAccount>> {
        let handles: Vec<(LoanId, Arc<Mutex<LoanAccount>>)> = read(&self.accounts, "accounts")?
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for (loan_id, handle) in handles {
            out.push(lock_account(&handle, loan_id)?.clone());
        }
        out.sort_by_key(|a| (a.loan.created_at, a.loan.id));
        Ok(out)
    }

    /// Replace a stored account if its version still matches `expected_version`.
    /// A successful replace stores the account at `expected_version + 1`.
    ///
    /// With `expected_version = None` the account must not exist yet.
    pub fn upsert_account(&self, mut account: LoanAccount, expected_version: Option<u64>) -> LedgerResult<()> {
        account.validate()?;
        let loan_id = account.loan.id;
        let mut accounts = write(&self.accounts, "accounts")?;
        let existing = accounts.get(&loan_id).cloned();
        match (existing, expected_version) {
            (Some(handle), Some(expected)) => {
                let mut current = lock_account(&handle, loan_id)?;
                if current.loan.version != expected {
                    return Err(LedgerError::ConcurrentModification {
                        loan_id,
                        expected,
                        found: current.loan.version,
                    });
                }
                account.loan.version = expected + 1;
                *current = account;
            }
            (Some(handle), None) => {
                let found = lock_account(&handle, loan_id)?.loan.version;
                return Err(LedgerError::ConcurrentModification {
                    loan_id,
                    expected: 0,
                    found,
                });
            }
            (None, Some(_)) => return Err(LedgerError::UnknownLoan(loan_id)),
            (None, None) => {
                accounts.insert(loan_id, Arc::new(Mutex::new(account)));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reconciliation and arrears
    // -----------------------------------------------------------------------

    /// Apply a payment under the loan's exclusive lock.
    pub fn apply_payment(&self, payment: &Payment) -> LedgerResult<ReconciliationResult> {
        let handle = self.account_handle(payment.loan_id)?;
        let result = {
            let mut account = lock_account(&handle, payment.loan_id)?;
            apply_payment(&mut account, payment)?
        };

        let mut events = Vec::new();
        if result.duplicate {
            events.push(LedgerEvent::DuplicatePaymentIgnored {
                loan_id: result.loan_id,
                external_id: result.external_id.clone(),
            });
        } else {
            events.push(LedgerEvent::PaymentApplied {
                loan_id: result.loan_id,
                external_id: result.external_id.clone(),
                amount: payment.amount,
                outstanding_balance: result.summary.outstanding_balance,
            });
            if result.previous_status != result.summary.status {
                events.push(LedgerEvent::StatusChanged {
                    loan_id: result.loan_id,
                    from: result.previous_status,
                    to: result.summary.status,
                });
            }
        }
        self.emit(events);
        Ok(result)
    }

    /// Scan one loan for arrears as of `as_of`, charging the configured default fee.
    pub fn scan_arrears(&self, loan_id: LoanId, as_of: NaiveDate) -> LedgerResult<ArrearsResult> {
        self.scan_arrears_with(loan_id, as_of, &self.config.default_fee)
    }

    /// Scan one loan, charging default fees through `policy`.
    pub fn scan_arrears_with(
        &self,
        loan_id: LoanId,
        as_of: NaiveDate,
        policy: &dyn DefaultFeePolicy,
    ) -> LedgerResult<ArrearsResult> {
        let handle = self.account_handle(loan_id)?;
        let result = {
            let mut account = lock_account(&handle, loan_id)?;
            scan_arrears(&mut account, as_of, policy)?
        };

        let mut events = Vec::new();
        if !result.newly_missed.is_empty() {
            events.push(LedgerEvent::EntriesMissed {
                loan_id,
                sequences: result.newly_missed.clone(),
                as_of,
            });
        }
        if result.previous_status != result.status {
            events.push(LedgerEvent::StatusChanged {
                loan_id,
                from: result.previous_status,
                to: result.status,
            });
        }
        self.emit(events);
        Ok(result)
    }

    /// Scan every loan that is not settled or written off.
    ///
    /// A failure on one loan is recorded and the scan moves on.
    pub fn scan_all(&self, as_of: NaiveDate) -> LedgerResult<BatchScanReport> {
        self.scan_all_with(as_of, &self.config.default_fee)
    }

    /// [`LoanBook::scan_all`] with an explicit default-fee policy.
    pub fn scan_all_with(&self, as_of: NaiveDate, policy: &dyn DefaultFeePolicy) -> LedgerResult<BatchScanReport> {
        let mut ids: Vec<LoanId> = read(&self.accounts, "accounts")?.keys().copied().collect();
        ids.sort();

        let mut report = BatchScanReport {
            as_of,
            scanned: 0,
            total_arrears: Decimal::ZERO,
            total_fees_accrued: Decimal::ZERO,
            results: Vec::new(),
            failures: Vec::new(),
        };

        for loan_id in ids {
            match self.scannable(loan_id) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!(%loan_id, error = %e, "skipping loan in batch scan");
                    report.failures.push(ScanFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            }
            report.scanned += 1;
            match self.scan_arrears_with(loan_id, as_of, policy) {
                Ok(result) => {
                    report.total_arrears += result.arrears;
                    report.total_fees_accrued += result.default_fee_accrued;
                    report.results.push(result);
                }
                Err(e) => {
                    warn!(%loan_id, error = %e, "arrears scan failed for loan");
                    report.failures.push(ScanFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %as_of,
            scanned = report.scanned,
            failures = report.failures.len(),
            arrears = %report.total_arrears,
            "batch arrears scan finished"
        );
        Ok(report)
    }

    fn scannable(&self, loan_id: LoanId) -> LedgerResult<bool> {
        let handle = self.account_handle(loan_id)?;
        let account = lock_account(&handle, loan_id)?;
        Ok(!account.loan.status.is_terminal())
    }

    /// Operator write-off, subject to the configured grace horizon.
    pub fn write_off(&self, loan_id: LoanId, as_of: NaiveDate) -> LedgerResult<LoanAccount> {
        let handle = self.account_handle(loan_id)?;
        let (account, from) = {
            let mut account = lock_account(&handle, loan_id)?;
            let from = write_off(&mut account, as_of, self.config.write_off_grace_days)?;
            (account.clone(), from)
        };
        self.emit(vec![
            LedgerEvent::StatusChanged {
                loan_id,
                from,
                to: LoanStatus::WrittenOff,
            },
            LedgerEvent::LoanWrittenOff { loan_id, as_of },
        ]);
        Ok(account)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Snapshot recovery candidates. Each loan is locked only while it is read.
    #[cfg(feature = "recovery")]
    pub fn build_deduction_candidates(&self, filter: &RecoveryFilter) -> LedgerResult<Vec<RecoveryRecord>> {
        let accounts = self.loans()?;
        let borrowers = read(&self.borrowers, "borrowers")?.clone();
        Ok(build_candidates(&accounts, &borrowers, filter))
    }

    /// Create a pending request, freezing the selected loans' current records.
    #[cfg(feature = "recovery")]
    pub fn create_deduction_request(
        &self,
        input: &NewDeductionRequest,
        at: DateTime<Utc>,
    ) -> LedgerResult<ComputationOutput<DeductionRequest>> {
        let mut filter = RecoveryFilter::new(at.date_naive()).organization(input.organization.clone());
        filter.pay_period = input.pay_period;
        let candidates = self.build_deduction_candidates(&filter)?;

        let mut requests = write(&self.requests, "deduction requests")?;
        let existing: Vec<DeductionRequest> = requests.values().cloned().collect();
        let output = create_request(input, &candidates, &existing, at)?;
        requests.insert(output.result.id, output.result.clone());
        drop(requests);

        self.emit(vec![LedgerEvent::DeductionRequestCreated {
            request_id: output.result.id,
            organization: output.result.organization.clone(),
            total_clients: output.result.total_clients,
            total_amount: output.result.total_amount,
        }]);
        Ok(output)
    }

    #[cfg(feature = "recovery")]
    pub fn request(&self, request_id: RequestId) -> LedgerResult<DeductionRequest> {
        read(&self.requests, "deduction requests")?
            .get(&request_id)
            .cloned()
            .ok_or(LedgerError::UnknownRequest(request_id))
    }

    /// All requests, oldest first.
    #[cfg(feature = "recovery")]
    pub fn requests(&self) -> LedgerResult<Vec<DeductionRequest>> {
        let mut out: Vec<DeductionRequest> = read(&self.requests, "deduction requests")?.values().cloned().collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    #[cfg(feature = "recovery")]
    pub fn send_request(&self, request_id: RequestId, at: DateTime<Utc>) -> LedgerResult<DeductionRequest> {
        self.transition_request(request_id, |r| r.send(at))
    }

    #[cfg(feature = "recovery")]
    pub fn acknowledge_request(&self, request_id: RequestId, at: DateTime<Utc>) -> LedgerResult<DeductionRequest> {
        self.transition_request(request_id, |r| r.acknowledge(at))
    }

    #[cfg(feature = "recovery")]
    pub fn complete_request(&self, request_id: RequestId, at: DateTime<Utc>) -> LedgerResult<DeductionRequest> {
        self.transition_request(request_id, |r| r.complete(at))
    }

    #[cfg(feature = "recovery")]
    fn transition_request(
        &self,
        request_id: RequestId,
        step: impl FnOnce(&mut DeductionRequest) -> LedgerResult<()>,
    ) -> LedgerResult<DeductionRequest> {
        let (request, from) = {
            let mut requests = write(&self.requests, "deduction requests")?;
            let request = requests
                .get_mut(&request_id)
                .ok_or(LedgerError::UnknownRequest(request_id))?;
            let from = request.status;
            step(&mut *request)?;
            (request.clone(), from)
        };
        self.emit(vec![LedgerEvent::DeductionRequestTransitioned {
            request_id,
            from: from.to_string(),
            to: request.status.to_string(),
        }]);
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> LedgerResult<BookSnapshot> {
        let mut borrowers: Vec<Borrower> = read(&self.borrowers, "borrowers")?.values().cloned().collect();
        borrowers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(BookSnapshot {
            borrowers,
            accounts: self.loans()?,
            #[cfg(feature = "recovery")]
            requests: self.requests()?,
        })
    }

    /// Rebuild a book from a snapshot, validating every account.
    pub fn restore(config: EngineConfig, snapshot: BookSnapshot) -> LedgerResult<Self> {
        let book = Self::new(config)?;
        for borrower in snapshot.borrowers {
            book.register_borrower(borrower)?;
        }
        for account in snapshot.accounts {
            book.upsert_account(account, None)?;
        }
        #[cfg(feature = "recovery")]
        {
            let mut requests = write(&book.requests, "deduction requests")?;
            for request in snapshot.requests {
                requests.insert(request.id, request);
            }
        }
        Ok(book)
    }
}
