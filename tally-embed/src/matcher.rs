//! Embedding-based semantic matching.
//!
//! Builds a text representation per transaction, embeds both ledgers in
//! batches, computes the full receipt x bank cosine-similarity matrix, and
//! takes the best column per row. This path is independent of vendor
//! aliasing and fuzzy heuristics; it is the fallback when bank descriptors
//! are too abbreviated for token containment to work.
//!
//! A failed embedding batch degrades to zero filler vectors instead of
//! aborting the run. Cosine against a zero-norm vector is defined as 0, so
//! degraded rows can never clear the acceptance threshold; they surface as
//! unmatched, not as a crash.

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use tally_core::report::{MatchResult, MatchType, ReconciliationReport};
use tally_core::score::{MatchCandidate, PairScorer};
use tally_core::solver::reconcile;
use tally_core::transaction::TransactionRecord;

use crate::client::{DEFAULT_BATCH_SIZE, EmbeddingProvider};

/// Embedding payloads are kept small; longer texts are truncated.
pub const MAX_TEXT_LEN: usize = 500;
/// Semantic acceptance threshold on cosine similarity.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;

/// Cosine similarity; 0 for mismatched dimensions or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Semantic matcher over an injected embedding provider.
pub struct VectorMatcher<P: EmbeddingProvider> {
    provider: P,
    batch_size: usize,
    threshold: f32,
    strip_re: Regex,
    spaces_re: Regex,
}

impl<P: EmbeddingProvider> VectorMatcher<P> {
    pub fn new(provider: P) -> Result<Self> {
        Ok(Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
            threshold: SIMILARITY_THRESHOLD,
            // Keep word chars, whitespace, periods, hyphens.
            strip_re: Regex::new(r"[^\w\s.\-]")?,
            spaces_re: Regex::new(r"\s+")?,
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// `"{label} {amount}"`, lowercased, punctuation stripped, whitespace
    /// collapsed, truncated.
    fn transaction_text(&self, record: &TransactionRecord) -> String {
        let raw = format!("{} {}", record.label, record.amount).to_lowercase();
        let stripped = self.strip_re.replace_all(&raw, " ");
        let collapsed = self.spaces_re.replace_all(stripped.trim(), " ");
        let mut text = collapsed.into_owned();
        if text.len() > MAX_TEXT_LEN {
            let mut cut = MAX_TEXT_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        text
    }

    /// Embed a whole ledger in batches. A failed batch is replaced by zero
    /// filler vectors so one bad batch does not fail the reconciliation.
    async fn embed_ledger(&self, records: &[TransactionRecord]) -> Vec<Vec<f32>> {
        let texts: Vec<String> = records.iter().map(|r| self.transaction_text(r)).collect();
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            match self.provider.embed_batch(batch).await {
                Ok(mut vs) => vectors.append(&mut vs),
                Err(e) => {
                    warn!(batch_len = batch.len(), error = %e,
                          "embedding batch failed, degrading to filler vectors");
                    vectors.extend(std::iter::repeat_n(
                        vec![0.0; self.provider.dim()],
                        batch.len(),
                    ));
                }
            }
        }

        vectors
    }

    /// Best bank column per receipt row over the cosine matrix. A column
    /// already claimed by an earlier row is not reconsidered (first-seen
    /// wins, same policy as the greedy solver).
    pub async fn find_matches(
        &self,
        receipts: &[TransactionRecord],
        banks: &[TransactionRecord],
    ) -> Result<Vec<MatchCandidate>> {
        if receipts.is_empty() || banks.is_empty() {
            return Ok(Vec::new());
        }

        let receipt_vecs = self.embed_ledger(receipts).await;
        let bank_vecs = self.embed_ledger(banks).await;

        let mut used_cols = vec![false; banks.len()];
        let mut candidates = Vec::new();

        for (i, receipt) in receipts.iter().enumerate() {
            let (best_col, best_sim) = bank_vecs
                .iter()
                .enumerate()
                .map(|(j, bv)| (j, cosine_similarity(&receipt_vecs[i], bv)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));

            if best_sim <= self.threshold || used_cols[best_col] {
                continue;
            }
            used_cols[best_col] = true;

            info!(
                receipt = %receipt.label,
                bank = %banks[best_col].label,
                similarity = best_sim,
                "semantic match"
            );
            candidates.push(MatchCandidate {
                receipt: receipt.clone(),
                bank: banks[best_col].clone(),
                vendor_score: 0.0,
                amount_score: 0.0,
                date_score: 0.0,
                confidence: best_sim as f64,
            });
        }

        Ok(candidates)
    }
}

/// Two-tier reconciliation: the textual solver runs first; the vector
/// matcher then gets one pass over whatever both sides left unmatched.
/// The merged report satisfies the same bijectivity and partition
/// invariants as a single-scorer run.
pub async fn reconcile_two_tier<S: PairScorer, P: EmbeddingProvider>(
    receipts: &[TransactionRecord],
    banks: &[TransactionRecord],
    scorer: &S,
    matcher: &VectorMatcher<P>,
) -> Result<ReconciliationReport> {
    let first = reconcile(receipts, banks, scorer)?;

    let semantic = matcher
        .find_matches(&first.unmatched_receipts, &first.unmatched_bank)
        .await?;

    let mut matches = first.matches;
    matches.extend(
        semantic
            .into_iter()
            .map(|c| MatchResult::from_candidate(c, MatchType::Semantic)),
    );

    Ok(ReconciliationReport::build(receipts, banks, matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EmbedError;
    use chrono::NaiveDate;
    use tally_core::score::SimilarityScorer;
    use tally_core::transaction::LedgerKind;

    /// Deterministic test double: maps known merchant keywords onto unit
    /// axes, everything else onto a diagonal nobody matches well.
    struct KeywordProvider;

    impl EmbeddingProvider for KeywordProvider {
        fn dim(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 4];
                    if t.contains("shell") {
                        v[0] = 1.0;
                    } else if t.contains("walmart") {
                        v[1] = 1.0;
                    } else if t.contains("starbucks") || t.contains("sbux") {
                        v[2] = 1.0;
                    } else {
                        v[3] = 0.5;
                    }
                    v
                })
                .collect())
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn dim(&self) -> usize {
            4
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::BadShape("provider down".to_string()))
        }
    }

    fn receipt(id: &str, vendor: &str, amount: f64) -> TransactionRecord {
        TransactionRecord::new(
            id,
            LedgerKind::Receipt,
            NaiveDate::from_ymd_opt(2024, 3, 1),
            amount,
            vendor,
        )
    }

    fn bank(id: &str, desc: &str, amount: f64) -> TransactionRecord {
        TransactionRecord::new(
            id,
            LedgerKind::Bank,
            NaiveDate::from_ymd_opt(2024, 3, 2),
            amount,
            desc,
        )
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        // Zero-norm filler vectors never look similar to anything.
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        // Dimension mismatch is defined, not a panic.
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_transaction_text_preprocessing() {
        let matcher = VectorMatcher::new(KeywordProvider).unwrap();
        let r = receipt("r1", "SHELL OIL #421!!", 45.0);
        assert_eq!(matcher.transaction_text(&r), "shell oil 421 45");
    }

    #[test]
    fn test_transaction_text_truncated() {
        let matcher = VectorMatcher::new(KeywordProvider).unwrap();
        let r = receipt("r1", &"x".repeat(2000), 45.0);
        assert_eq!(matcher.transaction_text(&r).len(), MAX_TEXT_LEN);
    }

    #[tokio::test]
    async fn test_semantic_matching_by_keyword() {
        let matcher = VectorMatcher::new(KeywordProvider).unwrap();
        let receipts = vec![
            receipt("r1", "STARBUCKS", 6.75),
            receipt("r2", "WALMART", 87.32),
        ];
        let banks = vec![
            bank("b1", "WALMART #5521", -87.32),
            bank("b2", "SBUX STORE 1142", -6.75),
        ];

        let candidates = matcher.find_matches(&receipts, &banks).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].receipt.id, "r1");
        assert_eq!(candidates[0].bank.id, "b2");
        assert_eq!(candidates[1].bank.id, "b1");
        assert!(candidates.iter().all(|c| c.confidence > 0.7));
    }

    #[tokio::test]
    async fn test_no_column_claimed_twice() {
        let matcher = VectorMatcher::new(KeywordProvider).unwrap();
        let receipts = vec![
            receipt("r1", "SHELL STATION", 45.0),
            receipt("r2", "SHELL DOWNTOWN", 50.0),
        ];
        let banks = vec![bank("b1", "SHELL OIL GAS", -45.0)];

        let candidates = matcher.find_matches(&receipts, &banks).await.unwrap();
        assert_eq!(candidates.len(), 1, "single bank column claimed once");
        assert_eq!(candidates[0].receipt.id, "r1", "first row wins");
    }

    /// Pins receipt and bank texts to vectors with cosine 0.6, between the
    /// default threshold and a loosened one.
    struct MidSimilarityProvider;

    impl EmbeddingProvider for MidSimilarityProvider {
        fn dim(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("shell") {
                        vec![1.0, 0.0, 0.0, 0.0]
                    } else {
                        vec![0.6, 0.8, 0.0, 0.0]
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_with_threshold_governs_acceptance() {
        let receipts = vec![receipt("r1", "SHELL", 45.0)];
        let banks = vec![bank("b1", "GAS STATION 12", -45.0)];

        // Similarity 0.6 sits below the default 0.7: rejected.
        let matcher = VectorMatcher::new(MidSimilarityProvider).unwrap();
        assert!(matcher.find_matches(&receipts, &banks).await.unwrap().is_empty());

        // A configured lower threshold accepts the same pair.
        let loose = VectorMatcher::new(MidSimilarityProvider)
            .unwrap()
            .with_threshold(0.5);
        let candidates = loose.find_matches(&receipts, &banks).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].confidence - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_unmatched() {
        let matcher = VectorMatcher::new(FailingProvider).unwrap();
        let receipts = vec![receipt("r1", "SHELL", 45.0)];
        let banks = vec![bank("b1", "SHELL OIL GAS", -45.0)];

        // Run completes; filler vectors can't clear the threshold.
        let candidates = matcher.find_matches(&receipts, &banks).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_two_tier_semantic_picks_up_textual_leftovers() {
        // SBUX is too abbreviated for token containment; the textual pass
        // leaves it behind and the semantic pass recovers it.
        let receipts = vec![
            receipt("r1", "SHELL OIL #421", 45.0),
            receipt("r2", "STARBUCKS", 6.75),
        ];
        let banks = vec![
            bank("b1", "SHELL OIL 0421 GAS", -45.0),
            bank("b2", "SBUX STORE 1142", -6.75),
        ];

        let scorer = SimilarityScorer::default();
        let matcher = VectorMatcher::new(KeywordProvider).unwrap();
        let report = reconcile_two_tier(&receipts, &banks, &scorer, &matcher)
            .await
            .unwrap();

        assert_eq!(report.matches.len(), 2);
        assert_eq!(report.matches[0].match_type, MatchType::Textual);
        assert_eq!(report.matches[1].match_type, MatchType::Semantic);
        assert_eq!(report.matches[1].receipt.id, "r2");
        assert_eq!(report.matches[1].bank.id, "b2");
        assert!(report.unmatched_receipts.is_empty());
        assert!(report.unmatched_bank.is_empty());
    }

    #[tokio::test]
    async fn test_two_tier_degraded_embedding_still_partitions() {
        let receipts = vec![
            receipt("r1", "SHELL OIL #421", 45.0),
            receipt("r2", "STARBUCKS", 6.75),
        ];
        let banks = vec![
            bank("b1", "SHELL OIL 0421 GAS", -45.0),
            bank("b2", "SBUX STORE 1142", -6.75),
        ];

        let scorer = SimilarityScorer::default();
        let matcher = VectorMatcher::new(FailingProvider).unwrap();
        let report = reconcile_two_tier(&receipts, &banks, &scorer, &matcher)
            .await
            .unwrap();

        // Textual match survives; the degraded semantic pass adds nothing.
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.unmatched_receipts.len(), 1);
        assert_eq!(report.unmatched_receipts[0].id, "r2");
        assert_eq!(report.unmatched_bank.len(), 1);
    }
}
