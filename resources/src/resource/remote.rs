//! URL resources.

use super::{
    Artifact, FetchContext, FetchError, ResourceDefinition, basename, join_mirror, retrieve_into,
};
use crate::hashing::HashAlgorithm;
use crate::retrieval::Retriever;
use log::{debug, warn};
use std::path::Path;

/// Schemes that mark a `hash` value as the location of the digest.
const HASH_URL_SCHEMES: &[&str] = &["http://", "https://", "file://"];

/// A resource downloaded from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlResource {
    pub(super) name: String,
    url: String,
    hash_url: Option<String>,
    pub(super) artifact: Artifact,
}

impl UrlResource {
    pub(super) fn new(
        name: &str,
        definition: &ResourceDefinition,
        output_dir: &Path,
        hash_type: Option<HashAlgorithm>,
    ) -> Self {
        let url = definition.url.clone().unwrap_or_default();
        let filename = definition
            .filename
            .clone()
            .unwrap_or_else(|| url_filename(&url));
        let destination = definition
            .destination
            .clone()
            .unwrap_or_else(|| output_dir.join(&filename));
        let declared = definition.hash.clone().unwrap_or_default();
        let (hash, hash_url) = if is_hash_url(&declared) {
            (String::new(), Some(declared))
        } else {
            (declared, None)
        };
        Self {
            name: name.to_owned(),
            url,
            hash_url,
            artifact: Artifact {
                filename,
                destination,
                hash,
                hash_type,
            },
        }
    }

    /// The declared source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL the digest is read from, when the hash is remote.
    #[must_use]
    pub fn hash_url(&self) -> Option<&str> {
        self.hash_url.as_deref()
    }

    /// The URL a fetch reads from, relocated onto `mirror` when given.
    #[must_use]
    pub fn source_url(&self, mirror: Option<&str>) -> String {
        match mirror {
            Some(mirror) => join_mirror(mirror, &self.artifact.filename),
            None => self.url.clone(),
        }
    }

    pub(super) fn fetch(&mut self, ctx: &FetchContext<'_>) -> Result<(), FetchError> {
        if let Some(hash_url) = &self.hash_url {
            self.artifact.hash = resolve_hash(ctx.retriever, hash_url);
        }
        let source = self.source_url(ctx.mirror);
        retrieve_into(ctx.retriever, &source, &self.artifact.destination)
    }
}

/// Read the literal digest published at `hash_url`.
///
/// Any failure leaves the hash empty, so the resource stays unverifiable.
fn resolve_hash(retriever: &dyn Retriever, hash_url: &str) -> String {
    match retriever.retrieve_text(hash_url) {
        Ok(body) => {
            let hash = body.split_whitespace().next().unwrap_or_default().to_owned();
            debug!("resolved hash from {hash_url}: {hash}");
            hash
        }
        Err(e) => {
            warn!("failed to resolve hash from {hash_url}: {e}");
            String::new()
        }
    }
}

fn is_hash_url(hash: &str) -> bool {
    HASH_URL_SCHEMES.iter().any(|scheme| hash.starts_with(scheme))
}

fn url_filename(url: &str) -> String {
    if let Some(last) = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.path_segments()?.next_back().map(str::to_owned))
    {
        return last;
    }
    basename(url).to_owned()
}
