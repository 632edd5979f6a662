//! tally-embed: embedding-backed semantic matching for tally.
//!
//! Wraps an external embedding provider behind an injectable trait, and
//! implements the cosine-matrix matcher plus the two-tier composition
//! (textual pass first, semantic pass over the remainder).

pub mod client;
pub mod matcher;

pub use client::{DEFAULT_BATCH_SIZE, DEFAULT_DIM, EmbedError, EmbeddingProvider, HttpEmbeddingClient};
pub use matcher::{VectorMatcher, cosine_similarity, reconcile_two_tier};
