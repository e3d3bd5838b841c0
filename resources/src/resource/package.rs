//! Package-index resources.
//!
//! A fetch takes one of three paths:
//!
//! A freshly built resource looks for an artifact an earlier run left in
//! the output tree, so verification and installation work across runs
//! without fetching again.
//!
//! 1. Direct links are retrieved like URL resources into the per-package
//!    directory, and their digest is looked up on the index page.
//! 2. A requirement whose artifact is already present and verifies against
//!    its sidecar is adopted without running the package manager.
//! 3. Otherwise the package manager downloads the package and its
//!    dependencies into the per-package directory. The package's own
//!    artifact stays; every dependency moves into its own sibling directory
//!    with a digest sidecar written beside it.

use super::{Artifact, FetchContext, FetchError, ResourceDefinition, join_mirror, retrieve_into};
use crate::executor::list_dir;
use crate::hashing::{HashAlgorithm, verify_file};
use crate::index::{
    DEFAULT_INDEX_URL, RemoteDigest, get_remote_hash, is_bookkeeping_file, normalise_name,
    package_name_from_filename, package_page_url, read_sidecar, write_sidecar,
};
use crate::spec::{ARTIFACT_SUFFIXES, PackageSpec};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A resource fetched from a package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResource {
    pub(super) name: String,
    spec: PackageSpec,
    package_name: Option<String>,
    pub(super) destination_dir: PathBuf,
    output_dir: PathBuf,
    index_url: Option<String>,
    declared_hash: String,
    declared_hash_type: Option<HashAlgorithm>,
    pub(super) artifact: Option<Artifact>,
}

impl PackageResource {
    pub(super) fn new(
        name: &str,
        spec: &str,
        definition: &ResourceDefinition,
        output_dir: &Path,
        index_url: Option<&str>,
        hash_type: Option<HashAlgorithm>,
    ) -> crate::error::Result<Self> {
        let spec: PackageSpec = spec.parse()?;
        let package_name = spec.package_name().map(str::to_owned);
        let destination_dir = output_dir.join(package_name.as_deref().unwrap_or(name));
        let mut resource = Self {
            name: name.to_owned(),
            spec,
            package_name,
            destination_dir,
            output_dir: output_dir.to_path_buf(),
            index_url: index_url.map(str::to_owned),
            declared_hash: definition.hash.clone().unwrap_or_default(),
            declared_hash_type: hash_type,
            artifact: None,
        };
        resource.rediscover();
        Ok(resource)
    }

    /// Pick up a verified artifact from an earlier run without writing
    /// anything.
    fn rediscover(&mut self) {
        let found = if self.spec.is_direct() {
            self.find_direct()
        } else {
            self.find_release()
        };
        if let Some((filename, destination, digest)) = found {
            debug!("{}: found {} from an earlier run", self.name, destination.display());
            self.set_artifact(filename, destination, Some(digest));
        }
    }

    /// Locate a direct link's artifact, searching every package directory
    /// when the package name is not yet known.
    fn find_direct(&mut self) -> Option<(String, PathBuf, RemoteDigest)> {
        let filename = self.spec.direct_filename()?.to_owned();
        let candidates = if self.package_name.is_some() {
            vec![self.destination_dir.clone()]
        } else {
            package_dirs(&self.output_dir)
        };
        let declared = self.declared_digest();
        for dir in candidates {
            let destination = dir.join(&filename);
            if !destination.is_file() {
                continue;
            }
            let Some(digest) = declared.clone().or_else(|| read_sidecar(&destination)) else {
                continue;
            };
            if !verify_file(&destination, Some(digest.algorithm), &digest.hex) {
                continue;
            }
            if self.package_name.is_none() {
                self.package_name = dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned);
                self.destination_dir = dir;
            }
            return Some((filename, destination, digest));
        }
        None
    }

    /// The parsed package spec.
    #[must_use]
    pub const fn spec(&self) -> &PackageSpec {
        &self.spec
    }

    /// The package name, once known.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }

    /// Directory holding this package's artifacts.
    #[must_use]
    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Index used for name discovery and digest lookups.
    fn effective_index<'a>(&'a self, mirror: Option<&'a str>) -> &'a str {
        mirror
            .or(self.index_url.as_deref())
            .unwrap_or(DEFAULT_INDEX_URL)
    }

    fn declared_digest(&self) -> Option<RemoteDigest> {
        let algorithm = self.declared_hash_type?;
        (!self.declared_hash.is_empty()).then(|| RemoteDigest {
            algorithm,
            hex: self.declared_hash.clone(),
        })
    }

    pub(super) fn fetch(&mut self, ctx: &FetchContext<'_>) -> Result<(), FetchError> {
        if self.spec.is_direct() {
            return self.fetch_direct(ctx);
        }
        if self.adopt_existing() {
            return Ok(());
        }
        self.fetch_with_executor(ctx)
    }

    fn fetch_direct(&mut self, ctx: &FetchContext<'_>) -> Result<(), FetchError> {
        let PackageSpec::Direct { url, .. } = &self.spec else {
            return Ok(());
        };
        let filename = self
            .spec
            .direct_filename()
            .ok_or_else(|| FetchError::NoFilename {
                spec: self.spec.to_string(),
            })?
            .to_owned();
        let index = self.effective_index(ctx.mirror).to_owned();
        if self.package_name.is_none() {
            let discovered = package_name_from_filename(
                &filename,
                ctx.index.get_index(ctx.retriever, &index),
            );
            if discovered.is_empty() {
                warn!("{}: no index package matches {filename}", self.name);
            } else {
                debug!("{}: discovered package name {discovered}", self.name);
                self.destination_dir = self.output_dir.join(&discovered);
                self.package_name = Some(discovered);
            }
        }

        let source = match (ctx.mirror, self.package_name.as_deref()) {
            (Some(mirror), Some(package)) => {
                join_mirror(&package_page_url(mirror, package), &filename)
            }
            _ => url.clone(),
        };
        let destination = self.destination_dir.join(&filename);
        retrieve_into(ctx.retriever, &source, &destination)?;

        let digest = self.declared_digest().or_else(|| {
            let package = self.package_name.as_deref()?;
            get_remote_hash(ctx.retriever, &filename, &package_page_url(&index, package))
        });
        self.record_artifact(filename, destination, digest);
        Ok(())
    }

    /// Adopt an artifact left by an earlier fetch when it still verifies.
    fn adopt_existing(&mut self) -> bool {
        let Some((filename, destination, digest)) = self.find_release() else {
            return false;
        };
        info!("{}: reusing {filename}", self.name);
        self.record_artifact(filename, destination, Some(digest));
        true
    }

    /// Find the newest-named release in the package directory that matches
    /// any pinned version and verifies against the declared digest or its
    /// sidecar.
    fn find_release(&self) -> Option<(String, PathBuf, RemoteDigest)> {
        let package = self.package_name.as_deref()?;
        let listing = list_dir(&self.destination_dir).ok()?;
        let known = BTreeSet::from([normalise_name(package)]);
        let pinned = self.spec.pinned_version();
        let declared = self.declared_digest();
        for filename in listing.iter().rev() {
            if is_bookkeeping_file(filename) {
                continue;
            }
            let prefix = package_name_from_filename(filename, &known);
            if prefix.is_empty() {
                continue;
            }
            if let Some(version) = pinned {
                if !release_matches(&filename[prefix.len()..], version) {
                    continue;
                }
            }
            let destination = self.destination_dir.join(filename);
            let Some(digest) = declared.clone().or_else(|| read_sidecar(&destination)) else {
                continue;
            };
            if verify_file(&destination, Some(digest.algorithm), &digest.hex) {
                return Some((filename.clone(), destination, digest));
            }
        }
        None
    }

    fn fetch_with_executor(&mut self, ctx: &FetchContext<'_>) -> Result<(), FetchError> {
        let package = self
            .package_name
            .clone()
            .unwrap_or_else(|| self.name.clone());
        let index = self.effective_index(ctx.mirror).to_owned();
        let executor_mirror = ctx.mirror.or(self.index_url.as_deref());

        fs::create_dir_all(&self.destination_dir)?;
        let listing = ctx
            .executor
            .download(self.spec.as_str(), &self.destination_dir, executor_mirror)?;

        let own_name = normalise_name(&package);
        let mut known = ctx.index.get_index(ctx.retriever, &index).clone();
        known.insert(own_name.clone());

        let mut own = Vec::new();
        let mut wiped = HashSet::new();
        for filename in listing.iter().filter(|f| !is_bookkeeping_file(f)) {
            let parsed = package_name_from_filename(filename, &known);
            if parsed.is_empty() {
                warn!("{}: cannot tell which package {filename} belongs to", self.name);
            } else if normalise_name(&parsed) == own_name {
                own.push(filename.clone());
            } else {
                self.rehome_dependency(ctx, &index, filename, &parsed, &mut wiped)?;
            }
        }

        let filename =
            newest(&self.destination_dir, own).ok_or_else(|| FetchError::ArtifactMissing {
                package: package.clone(),
                dir: self.destination_dir.display().to_string(),
            })?;
        let destination = self.destination_dir.join(&filename);
        let digest = self.declared_digest().or_else(|| {
            get_remote_hash(ctx.retriever, &filename, &package_page_url(&index, &package))
        });
        self.record_artifact(filename, destination, digest);
        Ok(())
    }

    /// Move a downloaded dependency into its own package directory.
    ///
    /// The target directory is wiped the first time it is touched in a
    /// fetch, so stale releases of the dependency do not linger.
    fn rehome_dependency(
        &self,
        ctx: &FetchContext<'_>,
        index: &str,
        filename: &str,
        dependency: &str,
        wiped: &mut HashSet<PathBuf>,
    ) -> Result<(), FetchError> {
        let target_dir = self.output_dir.join(dependency);
        if target_dir == self.destination_dir {
            return Ok(());
        }
        if wiped.insert(target_dir.clone()) && target_dir.exists() {
            debug!("wiping {}", target_dir.display());
            fs::remove_dir_all(&target_dir)?;
        }
        fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(filename);
        fs::rename(self.destination_dir.join(filename), &target)?;
        info!("{}: dependency {filename} moved to {}", self.name, target_dir.display());

        match get_remote_hash(ctx.retriever, filename, &package_page_url(index, dependency)) {
            Some(digest) => {
                write_sidecar(&target, &digest)?;
            }
            None => warn!("{filename}: no digest published; dependency is unverifiable"),
        }
        Ok(())
    }

    fn record_artifact(
        &mut self,
        filename: String,
        destination: PathBuf,
        digest: Option<RemoteDigest>,
    ) {
        if let Some(digest) = &digest {
            if let Err(e) = write_sidecar(&destination, digest) {
                warn!("{}: failed to write digest sidecar: {e}", self.name);
            }
        } else {
            warn!("{}: no digest known for {filename}", self.name);
        }
        self.set_artifact(filename, destination, digest);
    }

    fn set_artifact(
        &mut self,
        filename: String,
        destination: PathBuf,
        digest: Option<RemoteDigest>,
    ) {
        let (hash, hash_type) =
            digest.map_or((String::new(), None), |d| (d.hex, Some(d.algorithm)));
        self.artifact = Some(Artifact {
            filename,
            destination,
            hash,
            hash_type,
        });
    }
}

/// Return `true` when `rest` (the filename after the package name) is the
/// release `version` rather than a longer version sharing its prefix.
fn release_matches(rest: &str, version: &str) -> bool {
    let Some(tail) = rest
        .strip_prefix('-')
        .and_then(|rest| rest.strip_prefix(version))
    else {
        return false;
    };
    tail.starts_with('-')
        || ARTIFACT_SUFFIXES
            .iter()
            .any(|suffix| tail.eq_ignore_ascii_case(suffix))
}

/// Sorted subdirectories of `output_dir`; empty when it cannot be read.
fn package_dirs(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Pick the most recently modified of `candidates` inside `dir`.
fn newest(dir: &Path, candidates: Vec<String>) -> Option<String> {
    candidates
        .into_iter()
        .map(|name| {
            let modified = fs::metadata(dir.join(&name))
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, name)
        })
        .max()
        .map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::sdist("-1.0.tar.gz", "1.0", true)]
    #[case::egg("-1.0-py2.7.egg", "1.0", true)]
    #[case::wheel("-1.0-py3-none-any.whl", "1.0", true)]
    #[case::longer_version("-1.0.1.tar.gz", "1.0", false)]
    #[case::other_version("-2.0.zip", "1.0", false)]
    fn release_matches_requires_whole_version(
        #[case] rest: &str,
        #[case] version: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(release_matches(rest, version), expected);
    }

    #[test]
    fn newest_prefers_latest_modification() {
        let dir = tempfile::tempdir().expect("temp dir");
        let old = dir.path().join("foo-1.0.tar.gz");
        let new = dir.path().join("foo-1.1.tar.gz");
        fs::write(&old, b"old").expect("write old");
        fs::write(&new, b"new").expect("write new");
        let earlier = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000);
        fs::File::options()
            .write(true)
            .open(&old)
            .and_then(|file| file.set_modified(earlier))
            .expect("set mtime");

        let chosen = newest(
            dir.path(),
            vec!["foo-1.1.tar.gz".to_owned(), "foo-1.0.tar.gz".to_owned()],
        );

        assert_eq!(chosen.as_deref(), Some("foo-1.1.tar.gz"));
    }
}
