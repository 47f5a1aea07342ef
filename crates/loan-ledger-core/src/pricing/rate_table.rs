//! Flat add-on interest rates by loan term.
//!
//! A loan term is the number of bi-weekly repayment periods. Only the terms
//! listed in [`RATE_TABLE`] are offered; anything else is rejected rather than
//! mapped to a neighbouring term.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;
use crate::types::Rate;
use crate::LedgerResult;

/// Offered terms (in periods) and the flat rate charged once over the whole term.
const RATE_TABLE: [(u32, Rate); 16] = [
    (5, dec!(0.15)),
    (6, dec!(0.18)),
    (7, dec!(0.21)),
    (8, dec!(0.24)),
    (9, dec!(0.27)),
    (10, dec!(0.30)),
    (12, dec!(0.36)),
    (14, dec!(0.42)),
    (16, dec!(0.48)),
    (18, dec!(0.54)),
    (20, dec!(0.60)),
    (22, dec!(0.66)),
    (24, dec!(0.72)),
    (26, dec!(0.78)),
    (28, dec!(0.84)),
    (30, dec!(0.90)),
];

/// A validated loan term. Can only be built from an offered number of periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct LoanTerm(u32);

impl LoanTerm {
    pub fn new(periods: u32) -> LedgerResult<Self> {
        if lookup(periods).is_some() {
            Ok(Self(periods))
        } else {
            Err(LedgerError::InvalidTerm { periods })
        }
    }

    pub fn periods(self) -> u32 {
        self.0
    }

    /// Every offered term, shortest first.
    pub fn all() -> impl Iterator<Item = LoanTerm> {
        RATE_TABLE.iter().map(|(periods, _)| LoanTerm(*periods))
    }
}

impl TryFrom<u32> for LoanTerm {
    type Error = LedgerError;

    fn try_from(periods: u32) -> Result<Self, Self::Error> {
        LoanTerm::new(periods)
    }
}

impl From<LoanTerm> for u32 {
    fn from(term: LoanTerm) -> u32 {
        term.0
    }
}

impl fmt::Display for LoanTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} periods", self.0)
    }
}

/// One row of the published rate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTableRow {
    pub term: u32,
    pub rate: Rate,
    /// Same rate as a percentage, for display.
    pub rate_pct: Rate,
    pub term_days: u32,
}

fn lookup(periods: u32) -> Option<Rate> {
    RATE_TABLE
        .binary_search_by_key(&periods, |(p, _)| *p)
        .ok()
        .map(|idx| RATE_TABLE[idx].1)
}

/// Flat interest rate for a validated term.
pub fn rate_for(term: LoanTerm) -> LedgerResult<Rate> {
    rate_for_periods(term.0)
}

/// Flat interest rate for a raw number of periods.
pub fn rate_for_periods(periods: u32) -> LedgerResult<Rate> {
    lookup(periods).ok_or(LedgerError::InvalidTerm { periods })
}

pub fn supported_terms() -> Vec<RateTableRow> {
    RATE_TABLE
        .iter()
        .map(|(term, rate)| RateTableRow {
            term: *term,
            rate: *rate,
            rate_pct: *rate * dec!(100),
            term_days: term * crate::types::PERIOD_DAYS as u32,
        })
        .collect()
}
