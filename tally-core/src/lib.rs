//! tally-core: transaction reconciliation engine.
//!
//! Pairs receipts extracted from scanned documents against bank-statement
//! entries despite inconsistent vendor naming, rounding differences, and
//! date drift. Pure and synchronous; the embedding-backed semantic path
//! lives in `tally-embed`.

pub mod report;
pub mod score;
pub mod solver;
pub mod text;
pub mod transaction;

pub use report::{MatchResult, MatchType, ReconciliationReport};
pub use score::{MatchCandidate, MatchConfig, PairScorer, SimilarityScorer};
pub use solver::reconcile;
pub use transaction::{LedgerKind, TransactionRecord, normalize};
