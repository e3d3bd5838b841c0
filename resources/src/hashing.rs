//! Digest computation and hash verification for fetched artifacts.
//!
//! The digest registry is fixed at compile time. Names are matched
//! case-insensitively with `-` and `_` ignored, so `SHA-256`, `sha_256` and
//! `sha256` all select [`HashAlgorithm::Sha256`].

use crate::error::ResourceError;
use log::debug;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 8192;

/// A digest algorithm supported for artifact verification.
///
/// # Examples
///
/// ```
/// use charm_resources::hashing::HashAlgorithm;
///
/// let algorithm: HashAlgorithm = "SHA-256".parse().unwrap();
/// assert_eq!(algorithm, HashAlgorithm::Sha256);
/// assert_eq!(algorithm.name(), "sha256");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    /// MD5, as still published by older package indexes.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, weakest first.
    pub const ALL: [Self; 6] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    /// Canonical lowercase name, as used in sidecar extensions and index
    /// link fragments.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    fn expected_names() -> String {
        Self::ALL.map(Self::name).join(", ")
    }
}

impl FromStr for HashAlgorithm {
    type Err = ResourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == normalised)
            .ok_or_else(|| ResourceError::UnsupportedHashAlgorithm {
                name: value.to_owned(),
                expected: Self::expected_names(),
            })
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute the lowercase hex digest of the file at `path`.
///
/// # Errors
///
/// Returns any I/O error raised while opening or reading the file.
pub fn compute_digest(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    match algorithm {
        HashAlgorithm::Md5 => hex_digest::<Md5>(&mut file),
        HashAlgorithm::Sha1 => hex_digest::<Sha1>(&mut file),
        HashAlgorithm::Sha224 => hex_digest::<Sha224>(&mut file),
        HashAlgorithm::Sha256 => hex_digest::<Sha256>(&mut file),
        HashAlgorithm::Sha384 => hex_digest::<Sha384>(&mut file),
        HashAlgorithm::Sha512 => hex_digest::<Sha512>(&mut file),
    }
}

/// Check whether the file at `path` has the `expected` hex digest.
///
/// Returns `false` when the file is missing or unreadable, when no algorithm
/// is known, or when `expected` is empty; none of these are errors. The
/// comparison is case-sensitive.
///
/// # Examples
///
/// ```
/// use charm_resources::hashing::{HashAlgorithm, verify_file};
/// use std::path::Path;
///
/// let missing = Path::new("/nonexistent/artifact.tgz");
/// assert!(!verify_file(missing, Some(HashAlgorithm::Sha256), "abc"));
/// ```
#[must_use]
pub fn verify_file(path: &Path, algorithm: Option<HashAlgorithm>, expected: &str) -> bool {
    let Some(algorithm) = algorithm else {
        return false;
    };
    if expected.is_empty() || !path.is_file() {
        return false;
    }
    match compute_digest(path, algorithm) {
        Ok(actual) => actual == expected,
        Err(e) => {
            debug!("verify_file: failed to read {}: {e}", path.display());
            false
        }
    }
}

fn hex_digest<D: Digest>(reader: &mut impl Read) -> io::Result<String>
where
    sha2::digest::Output<D>: fmt::LowerHex,
{
    let mut hasher = D::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
