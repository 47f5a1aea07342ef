pub mod ledger;
pub mod pricing;
pub mod recovery;

use chrono::{NaiveDate, Utc};

/// `--as-of`, defaulting to today's UTC date.
pub(crate) fn as_of_or_today(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Utc::now().date_naive())
}
