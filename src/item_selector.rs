//! Pure vector math: norm, dot product, cosine similarity.
//!
//! Kept free of any index/document state so it can be unit-tested in
//! isolation and reused from the hot loop in [`crate::vector_index`].

/// Euclidean norm √Σvᵢ².
///
/// Undefined behavior on zero vectors is explicitly permitted by the
/// contract (callers must not insert zero vectors); we do not special-case
/// it here.
pub fn normalize(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Σ v1ᵢ·v2ᵢ over `min(len)` positions.
///
/// Embedding providers occasionally return fixed-length vectors that differ
/// by a stray trailing element; taking `min(len)` rather than requiring
/// equal lengths avoids a panic in that case while staying correct for the
/// common case of matched dimensions.
pub fn dot_product(v1: &[f32], v2: &[f32]) -> f32 {
    v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum()
}

/// `dot(v1, v2) / (‖v1‖·‖v2‖)`.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> f32 {
    dot_product(v1, v2) / (normalize(v1) * normalize(v2))
}

/// Cosine similarity given precomputed norms — the hot-path variant used by
/// `queryItems` so norms aren't recomputed per candidate per query.
pub fn normalized_cosine_similarity(v1: &[f32], norm1: f32, v2: &[f32], norm2: f32) -> f32 {
    dot_product(v1, v2) / (norm1 * norm2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_computes_euclidean_norm() {
        assert!((normalize(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_zero_cosine_similarity() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn identical_vectors_have_unit_cosine_similarity() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalized_variant_matches_unnormalized_for_same_inputs() {
        let a = [1.0, 1.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let direct = cosine_similarity(&a, &b);
        let precomputed = normalized_cosine_similarity(&a, normalize(&a), &b, normalize(&b));
        assert!((direct - precomputed).abs() < 1e-6);
    }

    #[test]
    fn the_end_to_end_scenario_one_scores_from_the_spec() {
        // a=[1,0,0], c=[1,1,0] against query [1,0,0]: score ≈ 0.7071.
        let query = [1.0, 0.0, 0.0];
        let c = [1.0, 1.0, 0.0];
        let score = cosine_similarity(&query, &c);
        assert!((score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    }
}
