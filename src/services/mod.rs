pub mod candidates;
pub mod catalog;
pub mod embedding;
pub mod profile;
pub mod recommender;
pub mod signals;

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 of a string, used for content hashes and signal
/// fingerprints.
pub(crate) fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Scales a vector to unit length.
///
/// The epsilon keeps a degenerate all-zero vector from dividing by zero; the
/// result in that case is simply the zero vector again.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let inv = 1.0 / (norm + 1e-9);
    for x in &mut v {
        *x *= inv;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex_known_value() {
        // sha1("abc")
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sha1_hex_is_deterministic() {
        assert_eq!(sha1_hex("fav:1:0|rat:0:0|trl:0:0"), sha1_hex("fav:1:0|rat:0:0|trl:0:0"));
        assert_ne!(sha1_hex("fav:1:0|rat:0:0|trl:0:0"), sha1_hex("fav:2:0|rat:0:0|trl:0:0"));
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((v[0] - 0.6).abs() < 1e-5);
        assert!((v[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
