//! Vector math shared by the embedders, the classifier and the cache

/// Dot product over the common prefix of two vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean length
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. The zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity for vectors that may not be normalized.
/// Returns 0.0 when either side is the zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// True when every component is exactly zero
pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0, 0.0];
        l2_normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_leaves_zero_vector() {
        let mut v = vec![0.0; 8];
        l2_normalize(&mut v);
        assert!(is_zero(&v));
    }

    #[test]
    fn test_cosine_matches_dot_for_unit_vectors() {
        let mut a = vec![1.0, 2.0, 3.0];
        let mut b = vec![2.0, 1.0, 0.5];
        let raw = cosine_similarity(&a, &b);
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        assert!((dot(&a, &b) - raw).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
