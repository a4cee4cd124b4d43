use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::hash::hex;

/// RFC 3261 magic cookie every branch starts with.
pub const BRANCH_PREFIX: &str = "z9hG4bK-";
const CALL_ID_HOST: &str = "sip-qa";

/// Source of Call-IDs, branches, tags and client nonces.
///
/// One generator is owned per prober and seeded once.
#[derive(Debug, Clone)]
pub struct IdGenerator<R = StdRng> {
    rng: R,
}

impl IdGenerator<StdRng> {
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: RngCore> IdGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn call_id(&mut self) -> String {
        format!("{}@{}", self.random_hex(12), CALL_ID_HOST)
    }

    pub fn branch(&mut self) -> String {
        format!("{}{}", BRANCH_PREFIX, self.random_hex(8))
    }

    pub fn tag(&mut self) -> String {
        self.random_hex(6)
    }

    pub fn cnonce(&mut self) -> String {
        self.random_hex(8)
    }

    fn random_hex(&mut self, nbytes: usize) -> String {
        let mut buf = vec![0u8; nbytes];
        self.rng.fill_bytes(&mut buf);
        hex(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_shapes() {
        let mut ids = IdGenerator::new(StdRng::seed_from_u64(7));

        let call_id = ids.call_id();
        let (local, host) = call_id.split_once('@').unwrap();
        assert_eq!(local.len(), 24);
        assert_eq!(host, "sip-qa");

        let branch = ids.branch();
        assert!(branch.starts_with("z9hG4bK-"));
        assert_eq!(branch.len(), BRANCH_PREFIX.len() + 16);

        assert_eq!(ids.tag().len(), 12);
        assert_eq!(ids.cnonce().len(), 16);
    }

    #[test]
    fn branches_do_not_repeat() {
        let mut ids = IdGenerator::new(StdRng::seed_from_u64(42));
        let a = ids.branch();
        let b = ids.branch();
        assert_ne!(a, b);
    }
}
