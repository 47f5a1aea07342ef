use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::LedgerResult;

/// A client of the lender. Loans refer to borrowers by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: String,
    pub name: String,
    /// Employer whose payroll can deduct repayments.
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payroll_officer_id: Option<String>,
}

impl Borrower {
    pub fn validate(&self) -> LedgerResult<()> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("organization", &self.organization),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidInput {
                    field: format!("borrower.{field}"),
                    reason: "Must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}
