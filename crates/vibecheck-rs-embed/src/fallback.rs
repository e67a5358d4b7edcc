//! Deterministic bag-of-words embeddings built from FNV-1a token hashes.

/// Embed `text` into a signed, L2-normalized vector of `dimensions` buckets.
///
/// Tokens are maximal runs of alphanumeric characters, lowercased. Text with no
/// tokens yields the zero vector.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let dimensions = dimensions.max(1);
    let mut vector = vec![0.0f32; dimensions];
    for token in text
        .split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        let hash = fnv1a_hash(token.to_lowercase().as_bytes());
        let bucket = (hash % dimensions as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter_mut().for_each(|value| *value /= magnitude);
    }
}

/// 64-bit FNV-1a.
pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::{fnv1a_hash, hash_embedding};
    use pretty_assertions::assert_eq;

    #[test]
    fn fnv_matches_reference_values() {
        assert_eq!(fnv1a_hash(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_hash(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn is_deterministic_and_case_insensitive() {
        let first = hash_embedding("Hey, what's UP?", 64);
        let second = hash_embedding("hey what s up", 64);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn output_is_unit_length() {
        let vector = hash_embedding("we should grab tacos later", 32);
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tokenless_text_is_zero_vector() {
        let vector = hash_embedding("?! ...", 8);
        assert!(vector.iter().all(|value| *value == 0.0));
    }
}
