//! Deduction requests sent to an employer's payroll officer.
//!
//! A request freezes the recovery records it was built from; later loan
//! activity never changes a request. Status moves strictly forward:
//! Pending -> Sent -> Acknowledged -> Completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::recovery::candidates::RecoveryRecord;
use crate::types::{with_metadata, ComputationOutput, LoanId, Money, PayPeriod, RequestId};
use crate::LedgerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Sent,
    Acknowledged,
    Completed,
}

impl RequestStatus {
    /// The only status this one may move to.
    pub fn next(self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Pending => Some(RequestStatus::Sent),
            RequestStatus::Sent => Some(RequestStatus::Acknowledged),
            RequestStatus::Acknowledged => Some(RequestStatus::Completed),
            RequestStatus::Completed => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Sent => "sent",
            RequestStatus::Acknowledged => "acknowledged",
            RequestStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Operator input for a new deduction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeductionRequest {
    pub payroll_officer_id: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_period: Option<PayPeriod>,
    pub loan_ids: Vec<LoanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionRequest {
    pub id: RequestId,
    pub organization: String,
    pub payroll_officer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_period: Option<PayPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Frozen at creation.
    pub records: Vec<RecoveryRecord>,
    pub total_clients: usize,
    pub total_amount: Money,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeductionRequest {
    pub fn send(&mut self, at: DateTime<Utc>) -> LedgerResult<()> {
        self.transition(RequestStatus::Sent, at)
    }

    pub fn acknowledge(&mut self, at: DateTime<Utc>) -> LedgerResult<()> {
        self.transition(RequestStatus::Acknowledged, at)
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> LedgerResult<()> {
        self.transition(RequestStatus::Completed, at)
    }

    pub fn is_open(&self) -> bool {
        self.status != RequestStatus::Completed
    }

    pub fn contains_loan(&self, loan_id: LoanId) -> bool {
        self.records.iter().any(|r| r.loan_id == loan_id)
    }

    fn transition(&mut self, to: RequestStatus, at: DateTime<Utc>) -> LedgerResult<()> {
        if self.status.next() != Some(to) {
            return Err(LedgerError::InvalidTransition {
                entity: format!("deduction request {}", self.id),
                from: self.status.to_string(),
                to: to.to_string(),
                reason: "Deduction requests move Pending -> Sent -> Acknowledged -> Completed".into(),
            });
        }
        let from = self.status;
        self.status = to;
        match to {
            RequestStatus::Sent => self.sent_at = Some(at),
            RequestStatus::Acknowledged => self.acknowledged_at = Some(at),
            RequestStatus::Completed => self.completed_at = Some(at),
            RequestStatus::Pending => {}
        }
        info!(request_id = %self.id, %from, %to, "deduction request transitioned");
        Ok(())
    }
}

/// Build a pending request from the selected loans' current recovery records.
///
/// `existing` is used only to flag loans already present in another open
/// request for the same organization and pay period; such overlaps are
/// reported as warnings, not rejected.
pub fn create_request(
    input: &NewDeductionRequest,
    candidates: &[RecoveryRecord],
    existing: &[DeductionRequest],
    at: DateTime<Utc>,
) -> LedgerResult<ComputationOutput<DeductionRequest>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_new_request(input)?;

    let mut seen = BTreeSet::new();
    let mut records = Vec::with_capacity(input.loan_ids.len());
    for loan_id in &input.loan_ids {
        if !seen.insert(*loan_id) {
            warnings.push(format!("Loan {loan_id} selected more than once; included once"));
            continue;
        }
        let record = candidates
            .iter()
            .find(|r| r.loan_id == *loan_id)
            .ok_or(LedgerError::UnknownLoan(*loan_id))?;
        if record.organization != input.organization {
            return Err(LedgerError::InvalidInput {
                field: "loan_ids".into(),
                reason: format!(
                    "Loan {loan_id} belongs to {}, not {}",
                    record.organization, input.organization
                ),
            });
        }
        records.push(record.clone());
    }

    for other in existing
        .iter()
        .filter(|r| r.is_open() && r.organization == input.organization && r.pay_period == input.pay_period)
    {
        for record in records.iter().filter(|rec| other.contains_loan(rec.loan_id)) {
            warn!(
                loan_id = %record.loan_id,
                other_request = %other.id,
                "loan already included in an open deduction request"
            );
            warnings.push(format!(
                "Loan {} ({}) is already in open request {} ({})",
                record.loan_id, record.borrower_name, other.id, other.status
            ));
        }
    }

    let total_amount: Money = records.iter().map(|r| r.amount_due).sum();
    if total_amount.is_zero() {
        warnings.push("Selected clients currently owe nothing in arrears".into());
    }

    let request = DeductionRequest {
        id: Uuid::new_v4(),
        organization: input.organization.clone(),
        payroll_officer_id: input.payroll_officer_id.clone(),
        pay_period: input.pay_period,
        notes: input.notes.clone(),
        total_clients: records.len(),
        total_amount,
        records,
        status: RequestStatus::Pending,
        created_at: at,
        sent_at: None,
        acknowledged_at: None,
        completed_at: None,
    };

    info!(
        request_id = %request.id,
        organization = %request.organization,
        clients = request.total_clients,
        total = %request.total_amount,
        "deduction request created"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Payroll deduction request from frozen recovery snapshots",
        &serde_json::json!({
            "organization": input.organization,
            "payroll_officer_id": input.payroll_officer_id,
            "pay_period": input.pay_period.map(|p| p.to_string()),
            "selected_loans": input.loan_ids.len(),
        }),
        warnings,
        elapsed,
        request,
    ))
}

fn validate_new_request(input: &NewDeductionRequest) -> LedgerResult<()> {
    if input.loan_ids.is_empty() {
        return Err(LedgerError::EmptySelection(
            "A deduction request needs at least one client".into(),
        ));
    }
    if input.organization.trim().is_empty() {
        return Err(LedgerError::InvalidInput {
            field: "organization".into(),
            reason: "Organization is required".into(),
        });
    }
    if input.payroll_officer_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput {
            field: "payroll_officer_id".into(),
            reason: "Payroll officer is required".into(),
        });
    }
    Ok(())
}
