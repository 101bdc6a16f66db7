//! Rate lookup: the seam between the tax engine and whatever supplies rates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::TaxKind;
#[cfg(feature = "json")]
use crate::core::NfeError;

/// Jurisdiction used for federal taxes (CBS, IS).
pub const FEDERAL_JURISDICTION: &str = "BR";

/// Matches any jurisdiction or classification in a [`RateTable`].
pub const WILDCARD: &str = "*";

/// What the engine asks for: one tax kind for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuery<'a> {
    pub kind: TaxKind,
    /// State abbreviation for IBS, `"BR"` for federal taxes.
    pub jurisdiction: &'a str,
    /// NCM code of the item.
    pub classification: &'a str,
    /// Issue date of the document.
    pub as_of: NaiveDate,
}

/// A tax rate in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub percent: Decimal,
}

impl Rate {
    pub fn new(percent: Decimal) -> Self {
        Self { percent }
    }
}

/// Source of tax rates.
///
/// Implementations must be read-only snapshots: the engine may call them
/// from many threads at once and expects the same answer for the same query.
pub trait RateLookup: Send + Sync {
    fn lookup(&self, query: &RateQuery<'_>) -> Option<Rate>;
}

impl<F> RateLookup for F
where
    F: Fn(&RateQuery<'_>) -> Option<Rate> + Send + Sync,
{
    fn lookup(&self, query: &RateQuery<'_>) -> Option<Rate> {
        self(query)
    }
}

/// One row of a [`RateTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub kind: TaxKind,
    /// State abbreviation, `"BR"`, or `"*"`.
    pub jurisdiction: String,
    /// NCM code or prefix (2, 4, 6 or 8 digits), or `"*"`.
    pub classification: String,
    pub percent: Decimal,
    /// First day the rate applies (inclusive).
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    /// Last day the rate applies (inclusive).
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

impl RateEntry {
    fn applies_on(&self, date: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| date >= from)
            && self.valid_until.is_none_or(|until| date <= until)
    }
}

/// In-memory rate table.
///
/// Lookup tries the full NCM code, then its 6-, 4- and 2-digit prefixes,
/// then `"*"`; at each level the exact jurisdiction is tried before `"*"`.
/// Among entries valid on the date, the one with the latest `valid_from` wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    entries: Vec<RateEntry>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry valid on every date.
    pub fn with_rate(
        self,
        kind: TaxKind,
        jurisdiction: impl Into<String>,
        classification: impl Into<String>,
        percent: Decimal,
    ) -> Self {
        self.with_entry(RateEntry {
            kind,
            jurisdiction: jurisdiction.into(),
            classification: classification.into(),
            percent,
            valid_from: None,
            valid_until: None,
        })
    }

    pub fn with_entry(mut self, entry: RateEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[RateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a snapshot from JSON: `{"entries": [{"kind": "Ibs", ...}]}`.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, NfeError> {
        serde_json::from_str(json).map_err(|e| NfeError::RateTable(e.to_string()))
    }

    fn find(&self, kind: TaxKind, jurisdiction: &str, classification: &str, date: NaiveDate) -> Option<&RateEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.kind == kind
                    && e.jurisdiction == jurisdiction
                    && e.classification == classification
                    && e.applies_on(date)
            })
            .max_by_key(|e| e.valid_from)
    }
}

impl RateLookup for RateTable {
    fn lookup(&self, query: &RateQuery<'_>) -> Option<Rate> {
        let code = query.classification;
        let mut candidates: Vec<&str> = Vec::with_capacity(6);
        candidates.push(code);
        for len in [8, 6, 4, 2] {
            if len < code.len() && code.is_char_boundary(len) {
                candidates.push(&code[..len]);
            }
        }
        candidates.push(WILDCARD);

        for classification in candidates {
            for jurisdiction in [query.jurisdiction, WILDCARD] {
                if let Some(entry) = self.find(query.kind, jurisdiction, classification, query.as_of) {
                    return Some(Rate::new(entry.percent));
                }
            }
        }
        None
    }
}
