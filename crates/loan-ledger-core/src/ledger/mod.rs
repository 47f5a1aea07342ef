pub mod account;
pub mod arrears;
pub mod borrower;
pub mod reconciler;
pub mod status;

pub use account::{Loan, LoanAccount, LoanSummary, Payment};
pub use arrears::{scan_arrears, ArrearsResult, DefaultFeePolicy, DefaultFeeRule};
pub use borrower::Borrower;
pub use reconciler::{apply_payment, apply_payment_strict, Allocation, ReconciliationResult};
pub use status::{derive_status, write_off, LoanStatus};
