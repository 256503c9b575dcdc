//! Integrity hash handling (SRI - Subresource Integrity)
//!
//! Lockfile entries carry `<algorithm>-<base64 digest>` strings. Only `sha1` and
//! `sha512` are accepted for verification; `sha256` is used internally for
//! cache-key hashing but is not a valid lockfile integrity algorithm here.

use std::io::Read;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};

/// Algorithms accepted in lockfile integrity strings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha512,
}

impl HashAlgorithm {
    /// Get the name of the algorithm, as written in SRI strings and cache paths
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(HashAlgorithm::Sha1),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Raw digest of content
    pub fn digest(&self, content: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(content).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(content).to_vec(),
        }
    }
}

/// A parsed integrity string: algorithm plus raw digest bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Integrity {
    pub algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl Integrity {
    /// Parse an SRI string (e.g. "sha512-abc123...").
    ///
    /// Space-separated lists are accepted; the first token with a supported
    /// algorithm wins. `package` only labels the error.
    pub fn parse(package: &str, sri: &str) -> Result<Self> {
        let malformed = || Error::MalformedIntegrity {
            package: package.to_string(),
            integrity: sri.to_string(),
        };

        let mut unsupported = None;
        for token in sri.split_whitespace() {
            let (algo, rest) = token.split_once('-').ok_or_else(malformed)?;
            let Some(algorithm) = HashAlgorithm::from_name(algo) else {
                unsupported.get_or_insert_with(|| algo.to_string());
                continue;
            };
            let encoded = rest.split_once('?').map(|(d, _)| d).unwrap_or(rest);
            let digest = BASE64.decode(encoded.as_bytes()).map_err(|_| malformed())?;
            if digest.len() != algorithm.digest_len() {
                return Err(malformed());
            }
            return Ok(Self { algorithm, digest });
        }

        match unsupported {
            Some(algorithm) => Err(Error::UnsupportedAlgorithm {
                package: package.to_string(),
                algorithm,
            }),
            None => Err(malformed()),
        }
    }

    /// Compute the integrity of content with the given algorithm
    pub fn compute(algorithm: HashAlgorithm, content: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(content),
        }
    }

    /// Stream a reader through sha512. Returns the integrity and the byte count.
    pub fn sha512_of_reader<R: Read>(mut reader: R) -> std::io::Result<(Self, u64)> {
        let mut hasher = Sha512::new();
        let mut buf = [0u8; 8192];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let integrity = Self {
            algorithm: HashAlgorithm::Sha512,
            digest: hasher.finalize().to_vec(),
        };
        Ok((integrity, size))
    }

    /// Hex form of the digest, used for content addresses and comparisons
    pub fn hex(&self) -> String {
        to_hex(&self.digest)
    }

    /// Canonical SRI string; base64 is always `=`-padded.
    pub fn to_sri(&self) -> String {
        format!("{}-{}", self.algorithm.name(), BASE64.encode(&self.digest))
    }

    /// Hash content with this integrity's algorithm and compare hex digests.
    /// Returns the actual hex digest on mismatch.
    pub fn check(&self, content: &[u8]) -> std::result::Result<(), String> {
        let actual = to_hex(&self.algorithm.digest(content));
        if actual == self.hex() {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

/// Lowercase hex encoding
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// SHA1 hex digest (index line checksums)
pub fn sha1_hex(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

/// SHA256 hex digest (cache key hashing, lockfile fingerprints)
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
