//! Pluggable seed/key algorithms for Security Access (0x27).

/// Computes the key the ECU expects for a given seed. Vendor algorithms live outside this crate.
pub trait SecurityAlgorithm {
    fn compute_key(&self, seed: &[u8]) -> Vec<u8>;
}

impl<F> SecurityAlgorithm for F
where
    F: Fn(&[u8]) -> Vec<u8>,
{
    fn compute_key(&self, seed: &[u8]) -> Vec<u8> {
        self(seed)
    }
}

/// Key = seed XOR a repeating mask. Common on development ECUs.
#[derive(Debug, Clone)]
pub struct XorKey(pub Vec<u8>);

impl SecurityAlgorithm for XorKey {
    fn compute_key(&self, seed: &[u8]) -> Vec<u8> {
        if self.0.is_empty() {
            return seed.to_vec();
        }
        seed.iter()
            .zip(self.0.iter().cycle())
            .map(|(s, m)| s ^ m)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_mask_repeats() {
        let algorithm = XorKey(vec![0xff, 0x00]);
        assert_eq!(algorithm.compute_key(&[0x12, 0x34, 0x56]), vec![0xed, 0x34, 0xa9]);
    }

    #[test]
    fn closure_is_algorithm() {
        let algorithm = |seed: &[u8]| seed.iter().rev().copied().collect::<Vec<u8>>();
        assert_eq!(algorithm.compute_key(&[1, 2, 3]), vec![3, 2, 1]);
    }
}
