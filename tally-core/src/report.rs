//! Reconciliation report: committed matches plus the leftovers on each side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::score::MatchCandidate;
use crate::transaction::TransactionRecord;

/// How a match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "textual")]
    Textual,
    #[serde(rename = "semantic")]
    Semantic,
    #[serde(rename = "manual")]
    Manual,
}

/// A committed match with its scoring breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub receipt: TransactionRecord,
    pub bank: TransactionRecord,
    pub vendor_score: f64,
    pub amount_score: f64,
    pub date_score: f64,
    pub confidence: f64,
    pub match_type: MatchType,
    pub created_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn from_candidate(candidate: MatchCandidate, match_type: MatchType) -> Self {
        Self {
            receipt: candidate.receipt,
            bank: candidate.bank,
            vendor_score: candidate.vendor_score,
            amount_score: candidate.amount_score,
            date_score: candidate.date_score,
            confidence: candidate.confidence,
            match_type,
            created_at: Utc::now(),
        }
    }
}

/// Output of one reconciliation run. `matches` follows commit order;
/// unmatched collections preserve input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub matches: Vec<MatchResult>,
    pub unmatched_receipts: Vec<TransactionRecord>,
    pub unmatched_bank: Vec<TransactionRecord>,
}

impl ReconciliationReport {
    /// Pure partition of the inputs against a committed match set.
    /// No scoring logic lives here.
    pub fn build(
        receipts: &[TransactionRecord],
        banks: &[TransactionRecord],
        matches: Vec<MatchResult>,
    ) -> Self {
        let used_receipts: HashSet<&str> =
            matches.iter().map(|m| m.receipt.id.as_str()).collect();
        let used_banks: HashSet<&str> = matches.iter().map(|m| m.bank.id.as_str()).collect();

        let unmatched_receipts = receipts
            .iter()
            .filter(|r| !used_receipts.contains(r.id.as_str()))
            .cloned()
            .collect();
        let unmatched_bank = banks
            .iter()
            .filter(|b| !used_banks.contains(b.id.as_str()))
            .cloned()
            .collect();

        Self {
            matches,
            unmatched_receipts,
            unmatched_bank,
        }
    }

    pub fn total_receipts(&self) -> usize {
        self.matches.len() + self.unmatched_receipts.len()
    }

    /// Fraction of receipts that found a bank counterpart.
    pub fn match_rate(&self) -> f64 {
        let total = self.total_receipts();
        if total == 0 {
            return 0.0;
        }
        self.matches.len() as f64 / total as f64
    }
}
