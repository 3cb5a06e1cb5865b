//! # Engine Primitives
//!
//! Compiled-in constants for the ranking engine. Model files may override
//! the scoring defaults; the limits are fixed.

/// Magic bytes for the mrfrank index file header.
///
/// - File Header = Magic Bytes ("MRFX") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"MRFX";

/// Current index file format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Default number of results returned per query.
pub const DEFAULT_HITS: usize = 1000;

/// Default BM25 term-frequency saturation.
pub const DEFAULT_BM25_K1: f32 = 1.2;

/// Default BM25 length normalisation.
pub const DEFAULT_BM25_B: f32 = 0.75;

/// Default Dirichlet smoothing mass.
pub const DEFAULT_DIRICHLET_MU: f32 = 2500.0;

/// Default Jelinek-Mercer interpolation weight of the background model.
pub const DEFAULT_JELINEK_MERCER_LAMBDA: f32 = 0.1;

/// Default ordered-window gap (`#od1` = exact phrase).
pub const DEFAULT_ORDERED_GAP: u32 = 1;

/// Default unordered-window width per term (`#uw8` for a bigram).
pub const DEFAULT_UNORDERED_WIDTH: u32 = 4;

/// Maximum query length accepted by "full" dependence clique sets.
///
/// Full dependence enumerates every subset of the query terms
/// (2^n - 1 masks), so it is capped well below the bit width.
pub const MAX_FULL_DEPENDENCE_TERMS: usize = 16;

/// Maximum number of terms tokenised from a single query.
pub const MAX_QUERY_TERMS: usize = 64;

/// Slack used when comparing an optimistic score bound against the current
/// acceptance threshold, so rounding in the bound never drops a document
/// that would have entered the top k.
pub const SCORE_BOUND_SLACK: f32 = 1e-4;

/// Default number of feedback documents for latent concept expansion.
pub const DEFAULT_FEEDBACK_DOCS: usize = 10;

/// Default number of feedback terms for latent concept expansion.
pub const DEFAULT_FEEDBACK_TERMS: usize = 10;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum allowed payload size for an index file (1 GB).
pub const MAX_INDEX_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum length of a single token. Longer tokens are dropped by the
/// tokenizer.
pub const MAX_TOKEN_LENGTH: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"MRFX");
    }

    #[test]
    fn full_dependence_fits_mask() {
        assert!(MAX_FULL_DEPENDENCE_TERMS < u32::BITS as usize);
    }
}
