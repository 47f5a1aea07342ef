use chrono::NaiveDate;
use loan_ledger_core::pricing::{compute_installment, rate_for_periods, supported_terms, AmountRounding, FeeConfig};
use loan_ledger_core::schedule::{generate_schedule, EntryStatus};
use loan_ledger_core::{LedgerError, Money};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
}

// ===========================================================================
// Rate table
// ===========================================================================

#[test]
fn test_rate_table_covers_five_to_thirty_periods() {
    let rows = supported_terms();
    assert_eq!(rows.len(), 16);
    assert_eq!(rows.first().map(|r| r.term), Some(5));
    assert_eq!(rows.last().map(|r| r.term), Some(30));
    assert!(rows.windows(2).all(|w| w[0].rate < w[1].rate));
    assert_eq!(rate_for_periods(5).unwrap(), dec!(0.15));
    assert_eq!(rate_for_periods(10).unwrap(), dec!(0.30));
    assert_eq!(rate_for_periods(30).unwrap(), dec!(0.90));
}

#[test]
fn test_unsupported_terms_rejected() {
    for periods in [0, 4, 11, 31, 100] {
        assert!(
            matches!(rate_for_periods(periods), Err(LedgerError::InvalidTerm { .. })),
            "term {periods} should be rejected"
        );
    }
}

// ===========================================================================
// Installments and schedules
// ===========================================================================

#[test]
fn test_schedule_sums_to_gross_for_every_term() {
    let fees = FeeConfig::default();
    let principals: [Money; 5] = [dec!(1), dec!(999), dec!(7000), dec!(12345), dec!(250000)];
    for row in supported_terms() {
        for principal in principals {
            let breakdown = compute_installment(principal, row.term, &fees).unwrap().result;
            let entries = generate_schedule(Uuid::new_v4(), &breakdown, start()).unwrap();

            assert_eq!(entries.len() as u32, row.term);
            let total: Money = entries.iter().map(|e| e.expected_amount).sum();
            assert_eq!(total, breakdown.gross_repayable, "principal {principal} term {}", row.term);
            assert!(entries.iter().all(|e| e.status == EntryStatus::Scheduled));
            assert!(entries.iter().all(|e| e.expected_amount > dec!(0)));
        }
    }
}

#[test]
fn test_rounding_remainder_on_last_entry() {
    let breakdown = compute_installment(dec!(7000), 7, &FeeConfig::default())
        .unwrap()
        .result;
    let entries = generate_schedule(Uuid::new_v4(), &breakdown, start()).unwrap();

    assert!(entries[..6].iter().all(|e| e.expected_amount == dec!(1237)));
    assert_eq!(entries[6].expected_amount, dec!(1238));
    assert_eq!(
        entries[6].due_date,
        NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()
    );
}

#[test]
fn test_custom_fee_configuration() {
    let fees = FeeConfig {
        insurance_rate: dec!(0),
        documentation_fee: dec!(0),
        rounding: AmountRounding::Down,
    };
    let breakdown = compute_installment(dec!(10000), 10, &fees).unwrap().result;
    assert_eq!(breakdown.gross_repayable, dec!(13000));
    assert_eq!(breakdown.installment, dec!(1300));
    assert_eq!(breakdown.final_installment, dec!(1300));
}
