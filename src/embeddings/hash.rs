//! Hash-based term-frequency embedder
//!
//! Tokens (lowercased alphanumeric words plus word bigrams and trigrams) are
//! hashed into `rounds` positions each by independently seeded hash
//! functions. Each position receives the token's term frequency scaled by
//! `decay^round`, and the accumulated vector is L2-normalized.
//!
//! Similarity between two texts is purely lexical: it comes from shared
//! tokens and from bucket collisions. No model is needed and output is
//! bit-identical across runs, platforms and compiler versions.

use std::collections::BTreeMap;

use super::vector::l2_normalize;

/// Identifier of this algorithm in embedding space tags
pub const HASH_EMBEDDER_ID: &str = "hash-tfidf-v1";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const SEED_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    rounds: usize,
    decay: f32,
}

impl HashEmbedder {
    #[must_use]
    pub const fn new(dimension: usize, rounds: usize, decay: f32) -> Self {
        Self {
            dimension,
            rounds,
            decay,
        }
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Space identifier; parameters are part of it because changing either
    /// one moves every vector
    pub fn space_id(&self) -> String {
        format!("{HASH_EMBEDDER_ID}:r{}:d{}", self.rounds, self.decay)
    }

    /// Embed `text`; returns the zero vector when it has no tokens
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vector;
        }

        // BTreeMap keeps accumulation order fixed, so float sums are reproducible
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let total = tokens.len() as f32;
        for (token, count) in counts {
            let tf = count as f32 / total;
            let mut weight = tf;
            for round in 0..self.rounds {
                let bucket = (seeded_hash(token, round as u64) % self.dimension as u64) as usize;
                vector[bucket] += weight;
                weight *= self.decay;
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Lowercased alphanumeric words followed by their bigrams and trigrams
pub fn tokenize(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut tokens = Vec::with_capacity(words.len() * 3);
    tokens.extend(words.iter().cloned());
    tokens.extend(words.windows(2).map(|w| w.join(" ")));
    tokens.extend(words.windows(3).map(|w| w.join(" ")));
    tokens
}

/// FNV-1a with a seeded offset basis, finished with the splitmix64 mixer so
/// nearby seeds produce unrelated bucket sequences
fn seeded_hash(token: &str, seed: u64) -> u64 {
    let mut hash = FNV_OFFSET_BASIS ^ seed.wrapping_mul(SEED_MULTIPLIER);
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    hash ^= hash >> 30;
    hash = hash.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    hash ^= hash >> 27;
    hash = hash.wrapping_mul(0x94d0_49bb_1331_11eb);
    hash ^ (hash >> 31)
}

#[cfg(test)]
mod tests {
    use super::super::vector::dot;
    use super::super::vector::l2_norm;
    use super::*;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(384, 3, 0.5)
    }

    #[test]
    fn test_tokenize_words_and_ngrams() {
        let tokens = tokenize("Heavy-Duty Brake");
        assert_eq!(
            tokens,
            vec![
                "heavy",
                "duty",
                "brake",
                "heavy duty",
                "duty brake",
                "heavy duty brake"
            ]
        );
    }

    #[test]
    fn test_tokenize_drops_punctuation_only_text() {
        assert!(tokenize(" -- !! ").is_empty());
    }

    #[test]
    fn test_embedding_is_unit_length() {
        let v = embedder().embed("Ceramic brake pads for high-performance vehicles");
        assert_eq!(v.len(), 384);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = embedder().embed("");
        assert_eq!(v.len(), 384);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_deterministic_bit_identical() {
        let a = embedder().embed("Oil filter, spin-on, 3/4-16 UNF");
        let b = embedder().embed("Oil filter, spin-on, 3/4-16 UNF");
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let a = embedder().embed("BRAKE PADS!");
        let b = embedder().embed("brake pads");
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_tokens_raise_similarity() {
        let e = embedder();
        let product = e.embed("Heavy-Duty Brake Pads Ceramic brake pads");
        let related = e.embed("Brake Pads");
        let unrelated = e.embed("Cabin air filter");
        assert!(dot(&product, &related) > dot(&product, &unrelated));
        assert!(dot(&product, &related) > 0.3);
    }

    #[test]
    fn test_space_id_includes_parameters() {
        assert_eq!(embedder().space_id(), "hash-tfidf-v1:r3:d0.5");
        assert_ne!(
            HashEmbedder::new(384, 2, 0.5).space_id(),
            embedder().space_id()
        );
    }

    #[test]
    fn test_seeds_are_independent() {
        assert_ne!(seeded_hash("brake", 0), seeded_hash("brake", 1));
        assert_eq!(seeded_hash("brake", 2), seeded_hash("brake", 2));
    }
}
