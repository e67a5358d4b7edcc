/// Cosine similarity of two equal-length vectors.
///
/// Zero-norm vectors and length mismatches score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let (dot, left_sq, right_sq) = left.iter().zip(right).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, left_sq, right_sq), (l, r)| (dot + l * r, left_sq + l * l, right_sq + r * r),
    );
    let denominator = left_sq.sqrt() * right_sq.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot / denominator
}
