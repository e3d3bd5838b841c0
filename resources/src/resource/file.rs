//! Pre-staged local file resources.

use super::{Artifact, FetchError, basename, remove_stale};
use crate::hashing::HashAlgorithm;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// A resource whose artifact already exists on the local filesystem.
///
/// Without a `file` source the resource only describes where its artifact
/// is expected, and fetching does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResource {
    pub(super) name: String,
    source: Option<PathBuf>,
    pub(super) artifact: Artifact,
}

impl FileResource {
    pub(super) fn new(
        name: &str,
        definition: &super::ResourceDefinition,
        output_dir: &Path,
        hash_type: Option<HashAlgorithm>,
    ) -> Self {
        let source = definition.file.clone();
        let filename = definition.filename.clone().unwrap_or_else(|| {
            source
                .as_deref()
                .map(|path| basename(&path.to_string_lossy()).to_owned())
                .unwrap_or_default()
        });
        let destination = definition
            .destination
            .clone()
            .unwrap_or_else(|| output_dir.join(&filename));
        Self {
            name: name.to_owned(),
            source,
            artifact: Artifact {
                filename,
                destination,
                hash: definition.hash.clone().unwrap_or_default(),
                hash_type,
            },
        }
    }

    /// The declared source path, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub(super) fn fetch(&self) -> Result<(), FetchError> {
        let Some(source) = self.source.as_deref() else {
            return Ok(());
        };
        let dest = &self.artifact.destination;
        if source == dest {
            debug!("{} is already in place", dest.display());
            return Ok(());
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        remove_stale(dest)?;
        fs::copy(source, dest)?;
        Ok(())
    }
}
