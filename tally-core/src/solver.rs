//! Greedy one-to-one assignment of receipts to bank transactions.
//!
//! Intentionally single-pass and not globally optimal: once a receipt
//! claims a bank transaction, no later receipt may reconsider it. Input
//! order can therefore affect the result; confidence thresholds keep
//! false-positive claims rare at typical batch sizes (tens to low
//! hundreds of records, O(n*m) pairwise scoring).

use anyhow::{Result, bail};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::report::{MatchResult, ReconciliationReport};
use crate::score::PairScorer;
use crate::transaction::TransactionRecord;

/// Ids must be unique within a ledger; duplicates break the bijective
/// matching invariant and are a caller bug, not a recoverable condition.
fn check_unique_ids(records: &[TransactionRecord], side: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for r in records {
        if !seen.insert(r.id.as_str()) {
            bail!("duplicate {side} transaction id: {}", r.id);
        }
    }
    Ok(())
}

/// Pair receipts to bank transactions with the given scorer.
///
/// Receipts are visited in input order; each claims the admissible bank
/// transaction with the highest confidence among those still unclaimed
/// (ties broken by input order: first seen wins). Used-id state is local
/// to this call, so concurrent runs stay independent.
pub fn reconcile<S: PairScorer>(
    receipts: &[TransactionRecord],
    banks: &[TransactionRecord],
    scorer: &S,
) -> Result<ReconciliationReport> {
    check_unique_ids(receipts, "receipt")?;
    check_unique_ids(banks, "bank")?;

    let mut used_banks: HashSet<String> = HashSet::new();
    let mut matches: Vec<MatchResult> = Vec::new();

    for receipt in receipts {
        let mut best: Option<MatchResult> = None;

        for bank in banks {
            if used_banks.contains(bank.id.as_str()) {
                continue;
            }
            let candidate = scorer.score(receipt, bank);
            if !scorer.admissible(&candidate) {
                continue;
            }
            // Strict > keeps the first-seen bank transaction on ties.
            if best
                .as_ref()
                .is_none_or(|b| candidate.confidence > b.confidence)
            {
                best = Some(MatchResult::from_candidate(candidate, scorer.match_type()));
            }
        }

        match best {
            Some(m) => {
                info!(
                    receipt = %m.receipt.label,
                    bank = %m.bank.label,
                    confidence = m.confidence,
                    "match committed"
                );
                used_banks.insert(m.bank.id.clone());
                matches.push(m);
            }
            None => {
                debug!(receipt = %receipt.label, amount = receipt.amount, "no match for receipt");
            }
        }
    }

    Ok(ReconciliationReport::build(receipts, banks, matches))
}
