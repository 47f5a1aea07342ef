pub mod book;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod pricing;
pub mod schedule;
pub mod types;

#[cfg(feature = "recovery")]
pub mod recovery;

pub use book::LoanBook;
pub use config::EngineConfig;
pub use error::LedgerError;
pub use types::*;

/// Standard result type for all ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
