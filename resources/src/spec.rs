//! Package specification parsing.
//!
//! A package resource names what to fetch either as a requirement
//! expression (`six`, `six==1.16.0`, `requests[socks] >= 2.0`) or as a
//! direct URL to a release artifact, optionally tagged with
//! `#egg=<name>`.

use crate::error::{ResourceError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(\[[^\]]*\])?\s*((?:===|==|!=|<=|>=|~=|<|>)[^;]*)?\s*$",
    )
    .unwrap_or_else(|e| unreachable!("requirement pattern is valid: {e}"))
});

/// Extensions of release artifacts accepted as bare-filename specs.
pub(crate) const ARTIFACT_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".tar.zst", ".tar", ".zip", ".egg", ".whl",
];

/// A parsed package specification.
///
/// # Examples
///
/// ```
/// use charm_resources::spec::PackageSpec;
///
/// let spec: PackageSpec = "six==1.16.0".parse().unwrap();
/// assert_eq!(spec.package_name(), Some("six"));
/// assert_eq!(spec.pinned_version(), Some("1.16.0"));
///
/// let spec: PackageSpec = "https://host.test/dl/foo-1.0.tar.gz#egg=foo".parse().unwrap();
/// assert_eq!(spec.package_name(), Some("foo"));
/// assert!(spec.is_direct());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    /// A name with an optional version constraint.
    Requirement {
        /// The distribution name as written.
        name: String,
        /// The version constraint, e.g. `==1.0` or `>=2,<3`.
        constraint: Option<String>,
        /// The original expression.
        raw: String,
    },
    /// A direct link to a release artifact.
    Direct {
        /// The link with any fragment removed.
        url: String,
        /// The name declared by an `#egg=` fragment.
        egg: Option<String>,
        /// The original expression.
        raw: String,
    },
}

impl PackageSpec {
    /// The package name, when the spec declares one.
    ///
    /// Direct links without an `#egg=` fragment return `None`; the name is
    /// then discovered from the artifact filename.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        match self {
            Self::Requirement { name, .. } => Some(name),
            Self::Direct { egg, .. } => egg.as_deref(),
        }
    }

    /// The version pinned with `==`, if the constraint is an exact pin.
    #[must_use]
    pub fn pinned_version(&self) -> Option<&str> {
        let Self::Requirement {
            constraint: Some(constraint),
            ..
        } = self
        else {
            return None;
        };
        let version = constraint.strip_prefix("==")?.trim();
        (!version.is_empty() && !version.contains([',', '*'])).then_some(version)
    }

    /// Return `true` for direct links.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }

    /// The spec exactly as written in the manifest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Requirement { raw, .. } | Self::Direct { raw, .. } => raw,
        }
    }

    /// The artifact filename of a direct link.
    #[must_use]
    pub fn direct_filename(&self) -> Option<&str> {
        let Self::Direct { url, .. } = self else {
            return None;
        };
        let path = url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

impl FromStr for PackageSpec {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid(s, "empty specification"));
        }
        if trimmed.contains("://") || looks_like_artifact(trimmed) {
            return Ok(parse_direct(trimmed, s));
        }
        let captures = REQUIREMENT
            .captures(trimmed)
            .ok_or_else(|| invalid(s, "expected NAME[extras][comparator VERSION]"))?;
        Ok(Self::Requirement {
            name: captures[1].to_owned(),
            constraint: captures
                .get(3)
                .map(|m| m.as_str().split_whitespace().collect::<String>()),
            raw: s.to_owned(),
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_direct(trimmed: &str, raw: &str) -> PackageSpec {
    let (url, fragment) = match trimmed.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (trimmed, None),
    };
    let egg = fragment.and_then(|fragment| {
        fragment
            .split('&')
            .find_map(|pair| pair.strip_prefix("egg="))
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
    });
    PackageSpec::Direct {
        url: url.to_owned(),
        egg,
        raw: raw.to_owned(),
    }
}

fn looks_like_artifact(spec: &str) -> bool {
    let path = spec.split('#').next().unwrap_or_default();
    let lower = path.to_ascii_lowercase();
    ARTIFACT_SUFFIXES
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

fn invalid(spec: &str, reason: &str) -> ResourceError {
    ResourceError::InvalidPackageSpec {
        spec: spec.to_owned(),
        reason: reason.to_owned(),
    }
}
