//! Subresource Integrity (SRI) tokens.
//!
//! A token has the form `<algorithm>-<base64 digest>` where the algorithm is
//! one of `sha256`, `sha384` or `sha512`. The prefix is matched exactly: no
//! case folding, no other algorithms.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

/// Errors produced while parsing an integrity token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Empty integrity token")]
    Empty,
    #[error("Unsupported integrity algorithm in token: {0}")]
    UnsupportedAlgorithm(String),
}

/// A parsed integrity token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityToken {
    /// Hash algorithm selected by the token prefix.
    pub algorithm: HashAlgorithm,
    /// Expected base64 digest, normalized.
    pub expected: String,
}

impl IntegrityToken {
    /// Parse a token such as `sha384-oqVu...`.
    ///
    /// Literal spaces in the digest are read back as `+`: a `+` in a query
    /// string decodes to a space, and callers routinely forget to escape it.
    /// That is the only leniency; the digest is otherwise kept verbatim.
    pub fn parse(token: &str) -> Result<Self, IntegrityError> {
        if token.is_empty() {
            return Err(IntegrityError::Empty);
        }

        HashAlgorithm::ALL
            .iter()
            .find_map(|algorithm| {
                token
                    .strip_prefix(algorithm.name())
                    .and_then(|rest| rest.strip_prefix('-'))
                    .map(|digest| Self {
                        algorithm: *algorithm,
                        expected: digest.replace(' ', "+"),
                    })
            })
            .ok_or_else(|| IntegrityError::UnsupportedAlgorithm(token.to_string()))
    }

    /// Check if content matches this token.
    ///
    /// The comparison is exact over the whole encoded digest.
    pub fn matches(&self, content: &[u8]) -> bool {
        self.algorithm.digest_base64(content) == self.expected
    }

    /// Generate the token for content.
    pub fn generate(content: &[u8], algorithm: HashAlgorithm) -> String {
        format!("{}-{}", algorithm.name(), algorithm.digest_base64(content))
    }
}

/// Hash algorithm for SRI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [HashAlgorithm; 3] = [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// Get algorithm name as it appears in a token.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse algorithm from its token name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Hash content using this algorithm.
    pub fn hash(&self, content: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(content).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(content).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(content).to_vec(),
        }
    }

    /// Hash content and encode the digest as standard padded base64.
    pub fn digest_base64(&self, content: &[u8]) -> String {
        BASE64.encode(self.hash(content))
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| IntegrityError::UnsupportedAlgorithm(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKER_JS: &[u8] = include_bytes!("../../../demo/third-party-scripts/worker.js");

    #[test]
    fn test_parse_each_algorithm() {
        let t = IntegrityToken::parse("sha256-abc").unwrap();
        assert_eq!(t.algorithm, HashAlgorithm::Sha256);
        assert_eq!(t.expected, "abc");

        let t = IntegrityToken::parse("sha384-def").unwrap();
        assert_eq!(t.algorithm, HashAlgorithm::Sha384);

        let t = IntegrityToken::parse("sha512-ghi").unwrap();
        assert_eq!(t.algorithm, HashAlgorithm::Sha512);
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert_eq!(IntegrityToken::parse(""), Err(IntegrityError::Empty));
        for token in ["sha1-abc", "md5-abc", "SHA256-abc", "sha256abc", "xsha256-abc", "sha-256-abc"] {
            assert!(
                matches!(IntegrityToken::parse(token), Err(IntegrityError::UnsupportedAlgorithm(_))),
                "{token} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_restores_plus_from_spaces() {
        let t = IntegrityToken::parse("sha384-ab cd ef").unwrap();
        assert_eq!(t.expected, "ab+cd+ef");
    }

    #[test]
    fn test_parse_keeps_rest_of_token_verbatim() {
        let t = IntegrityToken::parse("sha256-abc-def?opt").unwrap();
        assert_eq!(t.expected, "abc-def?opt");

        let t = IntegrityToken::parse("sha256-").unwrap();
        assert_eq!(t.expected, "");
        assert!(!t.matches(b""));
    }

    #[test]
    fn test_known_worker_digest() {
        let t = IntegrityToken::parse(
            "sha384-T068YnjR6cJn0WcYOTjC6rfSsc2GOXcbPl6CL0DVbDDZhkRcShn/SapO9C8q1/8Z",
        )
        .unwrap();
        assert!(t.matches(WORKER_JS));
        assert!(!t.matches(b"self.close();"));
    }

    #[test]
    fn test_generate_and_match() {
        let content = b"hello world";
        for algorithm in HashAlgorithm::ALL {
            let token = IntegrityToken::generate(content, algorithm);
            assert!(token.starts_with(&format!("{}-", algorithm.name())));

            let parsed = IntegrityToken::parse(&token).unwrap();
            assert_eq!(parsed.algorithm, algorithm);
            assert!(parsed.matches(content));
            assert!(!parsed.matches(b"different content"));
        }
    }

    #[test]
    fn test_sha256_empty_input() {
        assert_eq!(
            HashAlgorithm::Sha256.digest_base64(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn test_comparison_is_exact() {
        let token = IntegrityToken::generate(b"alert(1)", HashAlgorithm::Sha256);
        let parsed = IntegrityToken::parse(&token).unwrap();

        let truncated = IntegrityToken {
            expected: parsed.expected[..parsed.expected.len() - 4].to_string(),
            ..parsed.clone()
        };
        assert!(!truncated.matches(b"alert(1)"));

        let lowered = IntegrityToken {
            expected: parsed.expected.to_lowercase(),
            ..parsed.clone()
        };
        assert!(!lowered.matches(b"alert(1)"));

        let wrong_algorithm = IntegrityToken {
            algorithm: HashAlgorithm::Sha512,
            ..parsed
        };
        assert!(!wrong_algorithm.matches(b"alert(1)"));
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(HashAlgorithm::Sha256.hash(b"x").len(), 32);
        assert_eq!(HashAlgorithm::Sha384.hash(b"x").len(), 48);
        assert_eq!(HashAlgorithm::Sha512.hash(b"x").len(), 64);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("sha512".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha512));
        assert!("sha1".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Sha384.to_string(), "sha384");
    }
}
