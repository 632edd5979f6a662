//! Pairwise similarity scoring for (receipt, bank-transaction) candidates.
//!
//! The textual scorer combines three weighted sub-scores: vendor text
//! similarity, amount compatibility, and date proximity. A candidate is
//! admissible only if its combined confidence clears the threshold AND the
//! amounts pass the tolerance check.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::report::MatchType;
use crate::text::{label_contained, normalize_label, token_set_ratio};
use crate::transaction::TransactionRecord;

/// Tolerances and acceptance threshold for a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Date gaps beyond this many days score 0 on proximity.
    pub date_tolerance_days: i64,
    /// Relative amount tolerance, as a fraction of the receipt amount.
    pub amount_tolerance_pct: f64,
    /// Absolute floor on the amount tolerance, so very small receipts
    /// aren't held to sub-dollar precision.
    pub min_amount_tolerance: f64,
    /// Minimum confidence for a match to be committed (strict >).
    pub confidence_threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            date_tolerance_days: 7,
            amount_tolerance_pct: 0.10,
            min_amount_tolerance: 1.0,
            confidence_threshold: 0.7,
        }
    }
}

/// A scored (receipt, bank) pair. All scores are in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub receipt: TransactionRecord,
    pub bank: TransactionRecord,
    pub vendor_score: f64,
    pub amount_score: f64,
    pub date_score: f64,
    pub confidence: f64,
}

/// Scoring contract the assignment solver works against. The textual
/// scorer and the vector matcher are interchangeable behind this seam.
pub trait PairScorer {
    fn score(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> MatchCandidate;

    /// Whether a scored candidate may be committed at all.
    fn admissible(&self, candidate: &MatchCandidate) -> bool;

    /// How committed matches from this scorer are labeled.
    fn match_type(&self) -> MatchType;
}

/// Textual scorer: vendor containment/fuzzy overlap + amount ratio +
/// date proximity, weighted 0.4 / 0.4 / 0.2.
#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    pub config: MatchConfig,
}

impl SimilarityScorer {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    fn vendor_score(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> f64 {
        let vendor = normalize_label(&receipt.label);
        let desc = bank.label.to_uppercase();
        if label_contained(&vendor, &desc) {
            0.9
        } else {
            token_set_ratio(&vendor, &desc)
        }
    }

    fn amount_score(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> f64 {
        // Zero-amount receipts are handled by the caller; this assumes > 0.
        let diff = (receipt.amount - bank.abs_amount()).abs() / receipt.amount;
        (1.0 - diff).max(0.0)
    }

    fn date_score(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> f64 {
        let (Some(a), Some(b)) = (receipt.occurred_at, bank.occurred_at) else {
            return 0.0;
        };
        let gap = (a - b).num_days().abs();
        let tolerance = self.config.date_tolerance_days;
        if tolerance <= 0 || gap >= tolerance {
            0.0
        } else {
            1.0 - gap as f64 / tolerance as f64
        }
    }

    /// Relative tolerance on the receipt amount, floored at an absolute
    /// minimum, compared sign-blind.
    pub fn amounts_compatible(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> bool {
        let receipt_abs = receipt.abs_amount();
        if receipt_abs == 0.0 {
            return false;
        }
        let variance = (receipt_abs * self.config.amount_tolerance_pct)
            .max(self.config.min_amount_tolerance);
        (receipt_abs - bank.abs_amount()).abs() <= variance
    }
}

impl PairScorer for SimilarityScorer {
    fn score(&self, receipt: &TransactionRecord, bank: &TransactionRecord) -> MatchCandidate {
        // Zero-amount guard: garbage extractions must never match.
        if receipt.amount == 0.0 {
            return MatchCandidate {
                receipt: receipt.clone(),
                bank: bank.clone(),
                vendor_score: 0.0,
                amount_score: 0.0,
                date_score: 0.0,
                confidence: 0.0,
            };
        }

        let vendor_score = self.vendor_score(receipt, bank);
        let amount_score = self.amount_score(receipt, bank);
        let date_score = self.date_score(receipt, bank);
        let confidence = 0.2 * date_score + 0.4 * amount_score + 0.4 * vendor_score;

        debug!(
            receipt = %receipt.label,
            bank = %bank.label,
            vendor_score,
            amount_score,
            date_score,
            confidence,
            "scored candidate"
        );

        MatchCandidate {
            receipt: receipt.clone(),
            bank: bank.clone(),
            vendor_score,
            amount_score,
            date_score,
            confidence,
        }
    }

    fn admissible(&self, candidate: &MatchCandidate) -> bool {
        candidate.confidence > self.config.confidence_threshold
            && self.amounts_compatible(&candidate.receipt, &candidate.bank)
    }

    fn match_type(&self) -> MatchType {
        MatchType::Textual
    }
}
