//! Manifest loading.
//!
//! A manifest is a YAML document declaring required and optional resources
//! and the options shared by them:
//!
//! ```yaml
//! options:
//!   output_dir: resources
//! resources:
//!   jdk:
//!     url: https://example.test/jdk-8.tgz
//!     hash: 0f7ab5a1...
//!     hash_type: sha256
//!   six:
//!     pypi: six==1.16.0
//! optional_resources:
//!   docs:
//!     file: ./docs.zip
//! ```

use crate::container::ResourceContainer;
use crate::error::{ResourceError, Result};
use crate::resource::{Resource, ResourceDefinition};
use crate::retrieval::Retriever;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

/// Output directory used when neither the manifest nor the caller names one.
pub const DEFAULT_OUTPUT_DIR: &str = "resources";

/// Manifest-wide options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManifestOptions {
    /// Directory resources are written into.
    pub output_dir: PathBuf,
    /// Package index replacing the default for package resources.
    pub index_url: Option<String>,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            index_url: None,
        }
    }
}

/// A parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Resources selected when no names are given.
    #[serde(deserialize_with = "map_or_null")]
    pub resources: IndexMap<String, ResourceDefinition>,
    /// Resources only selected by name or with the all-resources sentinel.
    #[serde(deserialize_with = "map_or_null")]
    pub optional_resources: IndexMap<String, ResourceDefinition>,
    /// Manifest-wide options.
    #[serde(deserialize_with = "options_or_null")]
    pub options: ManifestOptions,
}

/// Deserializes a mapping that may be left empty (`resources:`) in YAML.
fn map_or_null<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, ResourceDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

fn options_or_null<'de, D>(deserializer: D) -> std::result::Result<ManifestOptions, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse manifest text read from `location`.
///
/// # Errors
///
/// Returns [`ResourceError::ManifestParse`] when the text is not a valid
/// manifest.
pub fn parse_manifest(text: &str, location: &str) -> Result<Manifest> {
    if text.trim().is_empty() {
        return Ok(Manifest::default());
    }
    serde_yaml::from_str(text).map_err(|source| ResourceError::ManifestParse {
        location: location.to_owned(),
        source,
    })
}

/// Read and parse the manifest at a path, `file://` URL, or HTTP(S) URL.
///
/// # Errors
///
/// Returns [`ResourceError::ManifestUnavailable`] when the document cannot
/// be read, or [`ResourceError::ManifestParse`] when it is malformed.
pub fn read_manifest(retriever: &dyn Retriever, location: &str) -> Result<Manifest> {
    let text = retriever
        .retrieve_text(location)
        .map_err(|e| ResourceError::ManifestUnavailable {
            location: location.to_owned(),
            reason: e.to_string(),
        })?;
    parse_manifest(&text, location)
}

/// Resolve every definition in `manifest` into a container.
///
/// `output_dir` overrides the manifest's `options.output_dir`.
///
/// # Errors
///
/// Propagates the first configuration error from
/// [`Resource::from_definition`].
pub fn build_container(
    manifest: &Manifest,
    output_dir: Option<&Path>,
) -> Result<ResourceContainer> {
    let output_dir = output_dir.unwrap_or(manifest.options.output_dir.as_path());
    let index_url = manifest.options.index_url.as_deref();
    let mut container = ResourceContainer::new(output_dir, index_url.map(str::to_owned));
    for (name, definition) in &manifest.resources {
        container.add_required(Resource::from_definition(
            name, definition, output_dir, index_url,
        )?);
    }
    for (name, definition) in &manifest.optional_resources {
        container.add_optional(Resource::from_definition(
            name, definition, output_dir, index_url,
        )?);
    }
    debug!(
        "built container with {} resources in {}",
        container.len(),
        output_dir.display()
    );
    Ok(container)
}

/// Containers memoized by manifest location and output-directory override.
///
/// A container is built once per key for the cache lifetime; resources in it
/// keep whatever fetched state later operations give them.
///
/// This serves long-lived library callers, such as charm hook code that
/// fetches, verifies and queries paths through several calls in one
/// process. The `charm-resources` binary runs one command per process and
/// loads its manifest directly with [`read_manifest`] and
/// [`build_container`]; fetched package artifacts are rediscovered from the
/// output directory when a container is built, so nothing is lost between
/// runs.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: HashMap<(String, Option<PathBuf>), ResourceContainer>,
}

impl ManifestCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the container for `location`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns any error from [`read_manifest`] or [`build_container`]. A
    /// failed load is not cached.
    pub fn load(
        &mut self,
        retriever: &dyn Retriever,
        location: &str,
        output_dir: Option<&Path>,
    ) -> Result<&mut ResourceContainer> {
        let key = (location.to_owned(), output_dir.map(Path::to_path_buf));
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!("loading manifest {location}");
                let manifest = read_manifest(retriever, location)?;
                Ok(entry.insert(build_container(&manifest, output_dir)?))
            }
        }
    }
}
