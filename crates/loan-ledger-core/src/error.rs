use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid loan term: {periods} periods is not an offered term")]
    InvalidTerm { periods: u32 },

    #[error("Invalid principal {principal}: {reason}")]
    InvalidPrincipal { principal: Decimal, reason: String },

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Unknown loan: {0}")]
    UnknownLoan(Uuid),

    #[error("Unknown borrower: {0}")]
    UnknownBorrower(String),

    #[error("Unknown deduction request: {0}")]
    UnknownRequest(Uuid),

    #[error("Payment {external_id} has already been applied to loan {loan_id}")]
    DuplicatePayment { loan_id: Uuid, external_id: String },

    #[error("Invalid transition for {entity}: {from} -> {to} ({reason})")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
        reason: String,
    },

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("Schedule already generated for loan {0}")]
    ScheduleAlreadyGenerated(Uuid),

    #[error("Schedule invariant violated for loan {loan_id}: {reason}")]
    ScheduleInvariant { loan_id: Uuid, reason: String },

    #[error("Concurrent modification of loan {loan_id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        loan_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::SerializationError(e.to_string())
    }
}
