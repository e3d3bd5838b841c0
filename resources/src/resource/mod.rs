//! The resource model and its fetch, verify, and install lifecycle.
//!
//! A manifest definition resolves once, when the container is built, into
//! one of three variants:
//!
//! - [`FileResource`]: a pre-staged local artifact, copied into place.
//! - [`UrlResource`]: an artifact retrieved from a URL, optionally through a
//!   mirror, with an optional hash URL.
//! - [`PackageResource`]: a package fetched through the package manager,
//!   with its dependencies re-homed beside it.
//!
//! Fetching never fails loudly. Transport, extraction, and package-manager
//! errors are classified into [`FetchOutcome::Unverified`] and logged; the
//! caller re-runs [`Resource::verify`] to learn which resources are usable.

mod file;
mod package;
mod remote;

pub use file::FileResource;
pub use package::PackageResource;
pub use remote::UrlResource;

use crate::error::{ResourceError, Result};
use crate::executor::{ExecutorError, PackageExecutor};
use crate::extraction::{self, ExtractionError};
use crate::hashing::{HashAlgorithm, verify_file};
use crate::index::IndexCache;
use crate::retrieval::{Retriever, TransportError};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One entry of the manifest's `resources` or `optional_resources` maps.
///
/// The keys present decide the variant: `url` selects [`UrlResource`],
/// `pypi` (or its alias `pip`) selects [`PackageResource`], and anything
/// else is a [`FileResource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDefinition {
    /// Source URL of a URL resource.
    #[serde(default)]
    pub url: Option<String>,
    /// Source path of a pre-staged file resource.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Package requirement or direct link of a package resource.
    #[serde(default, alias = "pip")]
    pub pypi: Option<String>,
    /// Local file name; defaults to the basename of the source.
    #[serde(default)]
    pub filename: Option<String>,
    /// Explicit destination path, overriding `output_dir/filename`.
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Expected digest, or a URL whose body holds it.
    #[serde(default)]
    pub hash: Option<String>,
    /// Digest algorithm name.
    #[serde(default)]
    pub hash_type: Option<String>,
}

/// Shared collaborators for a fetch.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    /// Retrieval primitive for artifacts, hash URLs, and index pages.
    pub retriever: &'a dyn Retriever,
    /// Package manager used by package resources.
    pub executor: &'a dyn PackageExecutor,
    /// Index listing cache shared across the batch.
    pub index: &'a IndexCache,
    /// Mirror base URL that relocates downloads.
    pub mirror: Option<&'a str>,
}

/// Shared collaborators for an install.
#[derive(Clone, Copy)]
pub struct InstallContext<'a> {
    /// Package manager used by package resources.
    pub executor: &'a dyn PackageExecutor,
    /// Extraction target; defaults to the artifact's own directory.
    pub destination: Option<&'a Path>,
    /// Collapse a single top-level directory shared by all entries.
    pub skip_top_level: bool,
    /// Index mirror handed to the package manager.
    pub mirror: Option<&'a str>,
}

/// The outcome of a fetch attempt.
///
/// This is deliberately not a `Result`: one resource's failure must not
/// abort a batch. [`Unverified`](FetchOutcome::Unverified) carries the
/// reason for logging; [`Retrieved`](FetchOutcome::Retrieved) still needs a
/// [`Resource::verify`] to confirm the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The artifact was written to its destination.
    Retrieved,
    /// The fetch failed and the resource stays unverified.
    Unverified {
        /// A human-readable explanation of the failure.
        reason: String,
    },
}

impl FetchOutcome {
    /// Return `true` for [`FetchOutcome::Retrieved`].
    #[must_use]
    pub const fn is_retrieved(&self) -> bool {
        matches!(self, Self::Retrieved)
    }
}

/// Internal error type for the fetch pipeline.
///
/// Never escapes a resource; every variant becomes
/// [`FetchOutcome::Unverified`].
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot determine an artifact file name for {spec}")]
    NoFilename { spec: String },

    #[error("no artifact for {package} in {dir}")]
    ArtifactMissing { package: String, dir: String },
}

/// A fetched (or expected) artifact on disk with its verification data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Local file name.
    pub filename: String,
    /// Full path of the local copy.
    pub destination: PathBuf,
    /// Expected digest; empty means unverifiable.
    pub hash: String,
    /// Digest algorithm; `None` means unverifiable.
    pub hash_type: Option<HashAlgorithm>,
}

impl Artifact {
    /// Check the local copy against the expected digest.
    #[must_use]
    pub fn verify(&self) -> bool {
        verify_file(&self.destination, self.hash_type, &self.hash)
    }
}

/// A named resource, resolved to its variant.
#[derive(Debug, Clone)]
pub enum Resource {
    /// Pre-staged local file.
    File(FileResource),
    /// URL download.
    Url(UrlResource),
    /// Package-index download.
    Package(PackageResource),
}

impl Resource {
    /// Resolve a manifest definition into a resource.
    ///
    /// `index_url` is the manifest-level package index override, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidDefinition`] when the definition
    /// names more than one source kind,
    /// [`ResourceError::UnsupportedHashAlgorithm`] for an unknown
    /// `hash_type`, or [`ResourceError::InvalidPackageSpec`] for a
    /// malformed package spec.
    pub fn from_definition(
        name: &str,
        definition: &ResourceDefinition,
        output_dir: &Path,
        index_url: Option<&str>,
    ) -> Result<Self> {
        let kinds = [
            definition.url.is_some(),
            definition.pypi.is_some(),
            definition.file.is_some(),
        ];
        if kinds.into_iter().filter(|present| *present).count() > 1 {
            return Err(ResourceError::InvalidDefinition {
                name: name.to_owned(),
                reason: "only one of url, pypi, and file may be given".to_owned(),
            });
        }
        let hash_type = parse_hash_type(definition.hash_type.as_deref())?;
        let resource = if definition.url.is_some() {
            Self::Url(UrlResource::new(name, definition, output_dir, hash_type))
        } else if let Some(spec) = &definition.pypi {
            Self::Package(PackageResource::new(
                name,
                spec,
                definition,
                output_dir,
                index_url,
                hash_type,
            )?)
        } else {
            Self::File(FileResource::new(name, definition, output_dir, hash_type))
        };
        debug!("resolved resource {name} as {}", resource.kind());
        Ok(resource)
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File(r) => &r.name,
            Self::Url(r) => &r.name,
            Self::Package(r) => &r.name,
        }
    }

    /// Short label for the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Url(_) => "url",
            Self::Package(_) => "package",
        }
    }

    /// The artifact, if its location is known yet.
    ///
    /// Package resources have none until a fetch, or a verified artifact
    /// left in the output tree by an earlier run, pins down the concrete
    /// file.
    #[must_use]
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::File(r) => Some(&r.artifact),
            Self::Url(r) => Some(&r.artifact),
            Self::Package(r) => r.artifact.as_ref(),
        }
    }

    /// Local file name; empty when not yet known.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.artifact().map_or("", |a| a.filename.as_str())
    }

    /// Destination of the local copy, if known.
    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        self.artifact().map(|a| a.destination.as_path())
    }

    /// Expected digest; empty when unverifiable.
    #[must_use]
    pub fn hash(&self) -> &str {
        self.artifact().map_or("", |a| a.hash.as_str())
    }

    /// Digest algorithm, if any.
    #[must_use]
    pub fn hash_type(&self) -> Option<HashAlgorithm> {
        self.artifact().and_then(|a| a.hash_type)
    }

    /// Path reported to callers: the artifact, or for a package not yet
    /// fetched, its per-package directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::File(r) => &r.artifact.destination,
            Self::Url(r) => &r.artifact.destination,
            Self::Package(r) => r
                .artifact
                .as_ref()
                .map_or(r.destination_dir.as_path(), |a| a.destination.as_path()),
        }
    }

    /// Fetch the artifact into place.
    pub fn fetch(&mut self, ctx: &FetchContext<'_>) -> FetchOutcome {
        info!("fetching {}", self.name());
        let result = match self {
            Self::File(r) => r.fetch(),
            Self::Url(r) => r.fetch(ctx),
            Self::Package(r) => r.fetch(ctx),
        };
        match result {
            Ok(()) => FetchOutcome::Retrieved,
            Err(e) => {
                warn!("fetch of {} failed: {e}", self.name());
                FetchOutcome::Unverified {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Return `true` when the local copy exists and matches its digest.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.artifact().is_some_and(Artifact::verify)
    }

    /// Install the verified artifact.
    ///
    /// File and URL artifacts are extracted (or copied) into
    /// `ctx.destination`, defaulting to the artifact's own directory.
    /// Package artifacts are handed to the package manager. Returns `false`
    /// without writing anything when the artifact does not verify.
    pub fn install(&self, ctx: &InstallContext<'_>) -> bool {
        let Some(artifact) = self.artifact().filter(|a| a.verify()) else {
            warn!("not installing {}: artifact does not verify", self.name());
            return false;
        };
        let result = match self {
            Self::Package(_) => ctx
                .executor
                .install_artifacts(std::slice::from_ref(&artifact.destination), ctx.mirror)
                .map_err(|e| e.to_string()),
            Self::File(_) | Self::Url(_) => {
                install_archive(artifact, ctx).map_err(|e| e.to_string())
            }
        };
        match result {
            Ok(()) => true,
            Err(reason) => {
                warn!("install of {} failed: {reason}", self.name());
                false
            }
        }
    }
}

fn install_archive(
    artifact: &Artifact,
    ctx: &InstallContext<'_>,
) -> std::result::Result<(), ExtractionError> {
    let dest_dir = ctx
        .destination
        .or_else(|| artifact.destination.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let kind = extraction::install_artifact(&artifact.destination, dest_dir, ctx.skip_top_level)?;
    debug!(
        "installed {} as {kind:?} into {}",
        artifact.filename,
        dest_dir.display()
    );
    Ok(())
}

fn parse_hash_type(name: Option<&str>) -> Result<Option<HashAlgorithm>> {
    match name.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => name.parse().map(Some),
    }
}

/// Retrieve `url` onto `dest`, replacing any previous copy.
fn retrieve_into(
    retriever: &dyn Retriever,
    url: &str,
    dest: &Path,
) -> std::result::Result<(), FetchError> {
    let url = url.strip_prefix("./").unwrap_or(url);
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    remove_stale(dest)?;
    debug!("retrieving {url} into {}", dest.display());
    retriever.retrieve(url, dest)?;
    Ok(())
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Resolve `relative` against a mirror base.
///
/// Absolute URLs follow RFC 3986, so a base without a trailing slash loses
/// its last segment. Bases that are not URLs (plain directories) are
/// joined the same way textually.
pub(crate) fn join_mirror(mirror: &str, relative: &str) -> String {
    if let Ok(joined) = url::Url::parse(mirror).and_then(|base| base.join(relative)) {
        return joined.to_string();
    }
    match mirror.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{relative}"),
        None => relative.to_owned(),
    }
}

/// Last path segment of a URL or path, ignoring any query or fragment.
pub(crate) fn basename(source: &str) -> &str {
    let path = source.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default()
}
