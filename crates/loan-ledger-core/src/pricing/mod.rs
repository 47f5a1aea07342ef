pub mod installment;
pub mod rate_table;

pub use installment::{compute_installment, AmountRounding, FeeConfig, InstallmentBreakdown};
pub use rate_table::{rate_for, rate_for_periods, supported_terms, LoanTerm, RateTableRow};
