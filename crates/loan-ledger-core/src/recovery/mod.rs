//! Payroll recovery: selecting clients in arrears and batching them into
//! deduction requests for their employers.

pub mod candidates;
pub mod deduction;

pub use candidates::{build_candidates, group_candidates, is_recovery_candidate, GroupKey, RecoveryFilter, RecoveryRecord};
pub use deduction::{create_request, DeductionRequest, NewDeductionRequest, RequestStatus};
