//! Shannon entropy of a byte sample, in bits per byte

/// Byte-value histogram of a sample.
pub fn histogram(data: &[u8]) -> [u64; 256] {
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    freq
}

/// Compute Shannon entropy in `[0, 8]`. An empty sample has entropy 0.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &f in histogram(data).iter() {
        if f > 0 {
            let p = f as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bytes_have_zero_entropy() {
        for n in [1usize, 2, 1000] {
            assert_eq!(shannon_entropy(&vec![0x41; n]), 0.0);
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn test_uniform_over_all_bytes_is_eight() {
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        assert!((shannon_entropy(&data) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_symbols_is_one_bit() {
        let data: Vec<u8> = [0u8, 1].iter().cycle().take(1000).copied().collect();
        assert!((shannon_entropy(&data) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_counts() {
        let freq = histogram(b"aab");
        assert_eq!(freq[b'a' as usize], 2);
        assert_eq!(freq[b'b' as usize], 1);
        assert_eq!(freq.iter().sum::<u64>(), 3);
    }
}
