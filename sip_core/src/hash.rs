use core::fmt::{self, Write};

use heapless::String as HString;
use md5::{Digest, Md5};

pub const DIGEST_LEN: usize = 16;

/// Lowercase hex rendering of one MD5 digest.
pub type HexDigest = HString<{ DIGEST_LEN * 2 }>;

/// Streaming MD5 over arbitrarily sized chunks.
///
/// `finalize` takes the hasher by value, so a finished computation cannot be
/// fed or finalized again. Start a new hasher for the next digest.
#[derive(Clone, Default)]
pub struct Md5Hasher {
    inner: Md5,
}

impl Md5Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.inner.update(data.as_ref());
        self
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        let out = self.inner.finalize();
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&out);
        bytes
    }

    pub fn finalize_hex(self) -> HexDigest {
        let bytes = self.finalize();
        let mut out = HexDigest::new();
        for b in &bytes {
            let _ = write!(out, "{:02x}", b);
        }
        out
    }
}

impl fmt::Debug for Md5Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Md5Hasher").finish_non_exhaustive()
    }
}

/// One-shot MD5 of `data`.
pub fn digest(data: impl AsRef<[u8]>) -> [u8; DIGEST_LEN] {
    let mut hasher = Md5Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Lowercase hex, two characters per input byte.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

pub fn md5_hex(data: impl AsRef<[u8]>) -> HexDigest {
    let mut hasher = Md5Hasher::new();
    hasher.update(data);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_reference_vectors() {
        assert_eq!(md5_hex(b"").as_str(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc").as_str(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            md5_hex("message digest").as_str(),
            "f96b697d7cb7938d525a2f31aaf161d0"
        );
        assert_eq!(
            md5_hex("The quick brown fox jumps over the lazy dog").as_str(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn chunked_updates_match_one_shot() {
        // 80 bytes: the message spans two blocks and padding spills into a third
        let input = "1234567890".repeat(8);
        let mut hasher = Md5Hasher::new();
        for chunk in input.as_bytes().chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), digest(&input));
        assert_eq!(
            md5_hex(&input).as_str(),
            "57edf4a22be3c955ac49da2e2107b67a"
        );
    }

    #[test]
    fn update_chains() {
        let mut hasher = Md5Hasher::new();
        hasher.update("a").update("b").update("c");
        assert_eq!(hasher.finalize_hex().as_str(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn hex_is_lowercase_and_double_length() {
        assert_eq!(hex(&[0x00, 0xab, 0x0f, 0xff]), "00ab0fff");
        assert_eq!(hex(&digest("anything")).len(), 32);
        assert!(hex(&[]).is_empty());
    }
}
