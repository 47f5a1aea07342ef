use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use loan_ledger_core::book::NewLoan;
use loan_ledger_core::events::LedgerEvent;
use loan_ledger_core::ledger::{Borrower, Loan, LoanStatus, Payment};
use loan_ledger_core::schedule::{EntryStatus, ScheduleEntry};
use loan_ledger_core::{EngineConfig, LedgerError, LoanBook, LoanId, Money};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::thread;

// ===========================================================================
// Fixtures
// ===========================================================================

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, m, d).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap()
}

fn borrower(id: &str, org: &str) -> Borrower {
    Borrower {
        id: id.into(),
        name: format!("Client {id}"),
        organization: org.into(),
        employee_number: Some(format!("EMP-{id}")),
        payroll_officer_id: None,
    }
}

fn book_with_loan(principal: Money, term: u32) -> (LoanBook, LoanId) {
    let book = LoanBook::new(EngineConfig::default()).unwrap();
    book.register_borrower(borrower("B-1", "Ministry of Health")).unwrap();
    let account = book
        .open_loan(
            NewLoan {
                loan_id: None,
                borrower_id: "B-1".into(),
                principal,
                term,
                start_date: date(1, 5),
            },
            now(),
        )
        .unwrap();
    (book, account.loan.id)
}

fn pay(loan_id: LoanId, id: &str, amount: Money, paid_on: NaiveDate) -> Payment {
    Payment {
        external_id: id.into(),
        loan_id,
        amount,
        paid_on,
        note: None,
    }
}

// ===========================================================================
// Loan creation
// ===========================================================================

#[test]
fn test_open_loan_reference_scenario() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let acct = book.loan(loan_id).unwrap();

    assert_eq!(acct.loan.interest_amount, dec!(3000));
    assert_eq!(acct.loan.insurance_amount, dec!(200));
    assert_eq!(acct.loan.documentation_fee, dec!(50));
    assert_eq!(acct.loan.gross_repayable, dec!(13250));
    assert_eq!(acct.loan.installment_amount, dec!(1325));
    assert_eq!(acct.entries.len(), 10);
    assert!(acct.entries.iter().all(|e| e.expected_amount == dec!(1325)));
    assert_eq!(acct.loan.status, LoanStatus::Active);
}

#[test]
fn test_invalid_term_creates_no_loan() {
    let book = LoanBook::new(EngineConfig::default()).unwrap();
    book.register_borrower(borrower("B-1", "MoH")).unwrap();
    let err = book
        .open_loan(
            NewLoan {
                loan_id: None,
                borrower_id: "B-1".into(),
                principal: dec!(10000),
                term: 11,
                start_date: date(1, 5),
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTerm { periods: 11 }));
    assert!(book.loans().unwrap().is_empty());
}

#[test]
fn test_invalid_principal_blocks_creation() {
    let book = LoanBook::new(EngineConfig::default()).unwrap();
    book.register_borrower(borrower("B-1", "MoH")).unwrap();
    let err = book
        .open_loan(
            NewLoan {
                loan_id: None,
                borrower_id: "B-1".into(),
                principal: dec!(0),
                term: 10,
                start_date: date(1, 5),
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPrincipal { .. }));
    assert!(book.loans().unwrap().is_empty());
}

#[test]
fn test_unknown_borrower_rejected() {
    let book = LoanBook::default();
    let err = book
        .open_loan(
            NewLoan {
                loan_id: None,
                borrower_id: "nobody".into(),
                principal: dec!(10000),
                term: 10,
                start_date: date(1, 5),
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownBorrower(_)));
}

#[test]
fn test_schedule_cannot_be_regenerated() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let err = book
        .open_loan(
            NewLoan {
                loan_id: Some(loan_id),
                borrower_id: "B-1".into(),
                principal: dec!(20000),
                term: 12,
                start_date: date(2, 2),
            },
            now(),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::ScheduleAlreadyGenerated(id) if id == loan_id));
    assert_eq!(book.loan(loan_id).unwrap().loan.principal, dec!(10000));
}

// ===========================================================================
// Payments
// ===========================================================================

#[test]
fn test_partial_payment_scenario() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let res = book.apply_payment(&pay(loan_id, "TX-1", dec!(500), date(1, 5))).unwrap();

    assert_eq!(res.summary.partial_count, 1);
    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.entries[0].status, EntryStatus::Partial);
    assert_eq!(acct.entries[0].amount_received, dec!(500));
    assert_eq!(acct.entries[0].outstanding(), dec!(825));
    assert_eq!(
        acct.entries.iter().filter(|e| e.status == EntryStatus::Partial).count(),
        1
    );
}

#[test]
fn test_same_payment_twice_is_idempotent() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let p = pay(loan_id, "TX-1", dec!(2000), date(1, 5));
    book.apply_payment(&p).unwrap();
    let after_first = book.loan(loan_id).unwrap();

    let res = book.apply_payment(&p).unwrap();
    assert!(res.duplicate);
    assert_eq!(book.loan(loan_id).unwrap(), after_first);
}

#[test]
fn test_payments_summing_to_gross_settle_loan() {
    let (book, loan_id) = book_with_loan(dec!(7000), 7);
    let gross = book.loan(loan_id).unwrap().loan.gross_repayable;
    assert_eq!(gross, dec!(8660));

    let amounts = [dec!(1000), dec!(2500), dec!(37), dec!(5123)];
    assert_eq!(amounts.iter().copied().sum::<Decimal>(), gross);
    for (i, amount) in amounts.iter().enumerate() {
        book.apply_payment(&pay(loan_id, &format!("TX-{i}"), *amount, date(1, 5)))
            .unwrap();
    }

    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.loan.status, LoanStatus::Settled);
    assert_eq!(acct.loan.outstanding_balance, dec!(0));
    assert_eq!(acct.loan.credit_balance, dec!(0));
    assert!(acct.entries.iter().all(|e| e.status == EntryStatus::Paid));
}

#[test]
fn test_unknown_loan_payment() {
    let (book, _) = book_with_loan(dec!(10000), 10);
    let err = book
        .apply_payment(&pay(uuid::Uuid::new_v4(), "TX-1", dec!(100), date(1, 5)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownLoan(_)));
}

#[test]
fn test_concurrent_payments_on_one_loan_are_not_lost() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let book = Arc::new(book);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let book = Arc::clone(&book);
            thread::spawn(move || {
                for i in 0..10 {
                    let p = pay(loan_id, &format!("TX-{t}-{i}"), dec!(100), date(1, 5));
                    book.apply_payment(&p).unwrap();
                    // Retried delivery of the same notification.
                    book.apply_payment(&p).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.loan.total_received, dec!(8000));
    assert_eq!(acct.loan.outstanding_balance, dec!(5250));
    assert_eq!(acct.applied_payments.len(), 80);
    let received: Money = acct.entries.iter().map(|e| e.amount_received).sum();
    assert_eq!(received, dec!(8000));
}

// ===========================================================================
// Arrears, status and write-off
// ===========================================================================

#[test]
fn test_scan_twice_accrues_fees_once() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let first = book.scan_arrears(loan_id, date(2, 3)).unwrap();
    let second = book.scan_arrears(loan_id, date(2, 3)).unwrap();

    assert_eq!(first.arrears, dec!(3975));
    assert_eq!(second.arrears, first.arrears);
    assert_eq!(first.default_fee_accrued, dec!(300));
    assert_eq!(second.default_fee_accrued, dec!(0));
    assert_eq!(second.total_default_fees, dec!(300));
    assert_eq!(book.loan(loan_id).unwrap().loan.missed_count, 3);
}

#[test]
fn test_status_lifecycle_active_overdue_settled() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    assert_eq!(book.scan_arrears(loan_id, date(1, 6)).unwrap().status, LoanStatus::Overdue);

    book.apply_payment(&pay(loan_id, "TX-1", dec!(13250), date(1, 7)))
        .unwrap();
    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.loan.status, LoanStatus::Settled);
    assert_eq!(acct.loan.outstanding_balance, dec!(0));

    // Settled is terminal: later scans change nothing.
    let res = book.scan_arrears(loan_id, date(12, 1)).unwrap();
    assert_eq!(res.status, LoanStatus::Settled);
    assert_eq!(res.default_fee_accrued, dec!(0));
}

#[test]
fn test_back_dated_payment_keeps_scanned_loan_overdue() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let scan = book.scan_arrears(loan_id, date(3, 1)).unwrap();
    assert_eq!(scan.status, LoanStatus::Overdue);
    assert_eq!(scan.newly_missed, vec![1, 2, 3, 4]);

    // Notification for a payment made on the first due date arrives late.
    let res = book
        .apply_payment(&pay(loan_id, "TX-1", dec!(1325), date(1, 5)))
        .unwrap();
    assert_eq!(res.summary.status, LoanStatus::Overdue);

    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.loan.status, LoanStatus::Overdue);
    assert_eq!(acct.loan.missed_count, 3);
    assert_eq!(acct.arrears_as_of(date(3, 1)), dec!(3975));
}

#[test]
fn test_earlier_rescan_keeps_loan_overdue() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    book.scan_arrears(loan_id, date(3, 1)).unwrap();

    let res = book.scan_arrears(loan_id, date(1, 2)).unwrap();
    assert_eq!(res.previous_status, LoanStatus::Overdue);
    assert_eq!(res.status, LoanStatus::Overdue);
    assert_eq!(res.default_fee_accrued, dec!(0));

    let acct = book.loan(loan_id).unwrap();
    assert_eq!(acct.loan.status, LoanStatus::Overdue);
    assert_eq!(acct.loan.missed_count, 4);
}

#[test]
fn test_catching_up_after_scan_returns_to_active() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    book.scan_arrears(loan_id, date(1, 10)).unwrap();

    let res = book
        .apply_payment(&pay(loan_id, "TX-1", dec!(1325), date(1, 10)))
        .unwrap();
    assert_eq!(res.previous_status, LoanStatus::Overdue);
    assert_eq!(res.summary.status, LoanStatus::Active);
}

#[test]
fn test_write_off_requires_grace_horizon() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);

    // Not overdue yet.
    let err = book.write_off(loan_id, date(1, 5)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));

    book.scan_arrears(loan_id, date(2, 1)).unwrap();
    // Oldest arrears from 01-05; default grace is 90 days => eligible 04-05.
    assert!(book.write_off(loan_id, date(4, 4)).is_err());
    let acct = book.write_off(loan_id, date(4, 5)).unwrap();
    assert_eq!(acct.loan.status, LoanStatus::WrittenOff);
    assert_eq!(acct.loan.written_off_on, Some(date(4, 5)));

    // Terminal: cannot be written off again, and payments do not revive it.
    assert!(book.write_off(loan_id, date(5, 1)).is_err());
    book.apply_payment(&pay(loan_id, "TX-1", dec!(13250), date(5, 1)))
        .unwrap();
    assert_eq!(book.loan(loan_id).unwrap().loan.status, LoanStatus::WrittenOff);
}

#[test]
fn test_batch_scan_covers_open_loans() {
    let book = LoanBook::default();
    book.register_borrower(borrower("B-1", "MoH")).unwrap();
    book.register_borrower(borrower("B-2", "GES")).unwrap();
    let mut ids = Vec::new();
    for (b, principal) in [("B-1", dec!(10000)), ("B-2", dec!(5000)), ("B-1", dec!(2000))] {
        let acct = book
            .open_loan(
                NewLoan {
                    loan_id: None,
                    borrower_id: b.into(),
                    principal,
                    term: 10,
                    start_date: date(1, 5),
                },
                now(),
            )
            .unwrap();
        ids.push(acct.loan.id);
    }
    // Third loan is settled and should be skipped.
    let gross = book.loan(ids[2]).unwrap().loan.gross_repayable;
    book.apply_payment(&pay(ids[2], "TX-1", gross, date(1, 5))).unwrap();

    let report = book.scan_all(date(1, 6)).unwrap();
    assert_eq!(report.scanned, 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.results.len(), 2);
    // 1325 + 665 (the 5000 loan repays 6650 over 10 periods)
    assert_eq!(report.total_arrears, dec!(1990));
    assert_eq!(report.total_fees_accrued, dec!(200));
}

#[test]
fn test_batch_scan_isolates_failing_loan() {
    let book = LoanBook::default();
    book.register_borrower(borrower("B-1", "MoH")).unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let acct = book
            .open_loan(
                NewLoan {
                    loan_id: None,
                    borrower_id: "B-1".into(),
                    principal: dec!(10000),
                    term: 10,
                    start_date: date(1, 5),
                },
                now(),
            )
            .unwrap();
        ids.push(acct.loan.id);
    }
    let bad = ids[1];
    let before = book.loan(bad).unwrap();

    let policy = move |loan: &Loan, _entry: &ScheduleEntry| -> Money {
        if loan.id == bad {
            dec!(-1)
        } else {
            dec!(100)
        }
    };
    let report = book.scan_all_with(date(1, 6), &policy).unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].loan_id, bad);
    assert!(report.failures[0].error.contains("default_fee"));

    let mut scanned: Vec<LoanId> = report.results.iter().map(|r| r.loan_id).collect();
    scanned.sort();
    let mut expected = vec![ids[0], ids[2]];
    expected.sort();
    assert_eq!(scanned, expected);
    assert_eq!(report.total_arrears, dec!(2650));
    assert_eq!(report.total_fees_accrued, dec!(200));

    // The failing loan is left exactly as it was.
    assert_eq!(book.loan(bad).unwrap(), before);
    assert_eq!(book.loan(ids[0]).unwrap().loan.status, LoanStatus::Overdue);
}

// ===========================================================================
// Events and persistence
// ===========================================================================

#[test]
fn test_events_published_for_state_changes() {
    let book = LoanBook::default();
    let seen: Arc<Mutex<Vec<LedgerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    book.subscribe(move |e: &LedgerEvent| sink.lock().unwrap().push(e.clone()))
        .unwrap();

    book.register_borrower(borrower("B-1", "MoH")).unwrap();
    let acct = book
        .open_loan(
            NewLoan {
                loan_id: None,
                borrower_id: "B-1".into(),
                principal: dec!(10000),
                term: 10,
                start_date: date(1, 5),
            },
            now(),
        )
        .unwrap();
    let loan_id = acct.loan.id;
    let p = pay(loan_id, "TX-1", dec!(100), date(1, 5));
    book.apply_payment(&p).unwrap();
    book.apply_payment(&p).unwrap();
    book.scan_arrears(loan_id, date(1, 6)).unwrap();

    let events = seen.lock().unwrap();
    assert!(matches!(events[0], LedgerEvent::LoanOpened { .. }));
    assert!(matches!(events[1], LedgerEvent::PaymentApplied { .. }));
    assert!(matches!(events[2], LedgerEvent::DuplicatePaymentIgnored { .. }));
    // Entry 1 was partial, so nothing newly missed; only the status moves.
    assert_eq!(
        events[3],
        LedgerEvent::StatusChanged {
            loan_id,
            from: LoanStatus::Active,
            to: LoanStatus::Overdue,
        }
    );
    assert_eq!(events.len(), 4);
}

#[test]
fn test_write_off_event_reports_derived_status() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let seen: Arc<Mutex<Vec<LedgerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    book.subscribe(move |e: &LedgerEvent| sink.lock().unwrap().push(e.clone()))
        .unwrap();

    // Never scanned, so the stored status is still active.
    assert_eq!(book.loan(loan_id).unwrap().loan.status, LoanStatus::Active);
    book.write_off(loan_id, date(4, 5)).unwrap();

    let events = seen.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            LedgerEvent::StatusChanged {
                loan_id,
                from: LoanStatus::Overdue,
                to: LoanStatus::WrittenOff,
            },
            LedgerEvent::LoanWrittenOff {
                loan_id,
                as_of: date(4, 5),
            },
        ]
    );
}

#[test]
fn test_snapshot_restore_round_trip() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    book.apply_payment(&pay(loan_id, "TX-1", dec!(500), date(1, 5))).unwrap();
    book.scan_arrears(loan_id, date(1, 20)).unwrap();

    let json = serde_json::to_string(&book.snapshot().unwrap()).unwrap();
    let restored = LoanBook::restore(EngineConfig::default(), serde_json::from_str(&json).unwrap()).unwrap();

    assert_eq!(restored.loan(loan_id).unwrap(), book.loan(loan_id).unwrap());
    // Idempotency survives persistence.
    let res = restored
        .apply_payment(&pay(loan_id, "TX-1", dec!(500), date(1, 5)))
        .unwrap();
    assert!(res.duplicate);
}

#[test]
fn test_upsert_detects_stale_version() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let stale = book.loan(loan_id).unwrap();
    book.apply_payment(&pay(loan_id, "TX-1", dec!(500), date(1, 5))).unwrap();

    let err = book.upsert_account(stale.clone(), Some(stale.loan.version)).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::ConcurrentModification { expected: 0, found: 1, .. }
    ));

    let fresh = book.loan(loan_id).unwrap();
    book.upsert_account(fresh.clone(), Some(fresh.loan.version)).unwrap();
}

#[test]
fn test_upsert_rejects_second_writer_on_same_version() {
    let (book, loan_id) = book_with_loan(dec!(10000), 10);
    let first = book.loan(loan_id).unwrap();
    let second = first.clone();
    let expected = first.loan.version;

    book.upsert_account(first, Some(expected)).unwrap();
    assert_eq!(book.loan(loan_id).unwrap().loan.version, expected + 1);

    let err = book.upsert_account(second, Some(expected)).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::ConcurrentModification { expected: 0, found: 1, .. }
    ));
}
