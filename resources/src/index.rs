//! Package index scraping, caching, and static index generation.
//!
//! Index pages follow the simple-repository link convention:
//! `<a href="FILENAME#ALGO=HEXDIGEST">FILENAME</a>`. The root page lists one
//! anchor per package name; each package page lists its release artifacts.

use crate::error::Result;
use crate::hashing::{HashAlgorithm, compute_digest};
use crate::retrieval::Retriever;
use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

/// Package index used when neither the manifest nor a mirror names one.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.python.org/simple/";

/// File name of generated index pages.
pub const INDEX_PAGE: &str = "index.html";

/// Algorithm used for artifacts that have no sidecar when building an index.
const FALLBACK_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#)
        .unwrap_or_else(|e| unreachable!("anchor pattern is valid: {e}"))
});

static EMPTY_LISTING: BTreeSet<String> = BTreeSet::new();

/// One anchor scraped from an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLink {
    /// The `href` target, including any fragment.
    pub href: String,
    /// The trimmed visible text.
    pub text: String,
}

impl IndexLink {
    /// Split a `#algo=hex` fragment off the link target.
    ///
    /// Returns `None` when the fragment is absent, malformed, or names an
    /// algorithm outside the digest registry.
    #[must_use]
    pub fn digest(&self) -> Option<RemoteDigest> {
        let (_, fragment) = self.href.split_once('#')?;
        let (algorithm, hex) = fragment.split_once('=')?;
        let hex = hex.split('&').next().unwrap_or_default();
        if hex.is_empty() {
            return None;
        }
        match algorithm.parse::<HashAlgorithm>() {
            Ok(algorithm) => Some(RemoteDigest {
                algorithm,
                hex: hex.to_owned(),
            }),
            Err(e) => {
                warn!("ignoring index digest for {}: {e}", self.text);
                None
            }
        }
    }
}

/// A digest published by a package index for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDigest {
    /// The digest algorithm.
    pub algorithm: HashAlgorithm,
    /// The lowercase hex digest.
    pub hex: String,
}

/// Extract every anchor from an HTML page.
///
/// # Examples
///
/// ```
/// use charm_resources::index::parse_links;
///
/// let links = parse_links(r#"<a href="foo-1.0.tar.gz#md5=abc">foo-1.0.tar.gz</a>"#);
/// assert_eq!(links[0].text, "foo-1.0.tar.gz");
/// ```
#[must_use]
pub fn parse_links(html: &str) -> Vec<IndexLink> {
    ANCHOR
        .captures_iter(html)
        .map(|captures| IndexLink {
            href: captures[1].trim().to_owned(),
            text: captures[2].trim().to_owned(),
        })
        .collect()
}

/// Memoized listing of package names scraped from an index root page.
///
/// The first successful [`IndexCache::get_index`] call populates the cache
/// and every later call returns that listing regardless of the URL asked
/// for. Fetching from two different mirrors through one cache therefore
/// sees the first mirror's listing for both; construct a fresh cache per
/// mirror when that matters.
#[derive(Debug, Default)]
pub struct IndexCache {
    listing: OnceLock<(String, BTreeSet<String>)>,
}

impl IndexCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the set of package names listed at `url`, normalised with
    /// [`normalise_name`].
    ///
    /// A failed scrape is not cached and yields an empty listing.
    pub fn get_index(&self, retriever: &dyn Retriever, url: &str) -> &BTreeSet<String> {
        if let Some((source, names)) = self.listing.get() {
            if source != url {
                debug!("get_index: serving listing scraped from {source} for {url}");
            }
            return names;
        }
        match retriever.retrieve_text(url) {
            Ok(html) => {
                let names = parse_links(&html)
                    .into_iter()
                    .filter(|link| !link.text.is_empty())
                    .map(|link| normalise_name(&link.text))
                    .collect();
                let (_, names) = self.listing.get_or_init(|| (url.to_owned(), names));
                names
            }
            Err(e) => {
                warn!("failed to scrape package index {url}: {e}");
                &EMPTY_LISTING
            }
        }
    }

    /// Return `true` once a listing has been cached.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.listing.get().is_some()
    }
}

/// Build the URL of a package's page beneath an index root.
///
/// # Examples
///
/// ```
/// use charm_resources::index::package_page_url;
///
/// assert_eq!(
///     package_page_url("https://pypi.python.org/simple", "six"),
///     "https://pypi.python.org/simple/six/"
/// );
/// ```
#[must_use]
pub fn package_page_url(index_url: &str, package_name: &str) -> String {
    format!("{}/{package_name}/", index_url.trim_end_matches('/'))
}

/// Look up the published digest for `filename` on the page at `index_url`.
///
/// The page is scraped fresh on every call. Returns `None` when the page
/// cannot be retrieved or carries no usable digest for `filename`; callers
/// treat that as unverifiable rather than as an error.
pub fn get_remote_hash(
    retriever: &dyn Retriever,
    filename: &str,
    index_url: &str,
) -> Option<RemoteDigest> {
    let html = match retriever.retrieve_text(index_url) {
        Ok(html) => html,
        Err(e) => {
            warn!("failed to scrape {index_url} for {filename}: {e}");
            return None;
        }
    };
    let digest = parse_links(&html)
        .into_iter()
        .find(|link| link.text == filename)
        .and_then(|link| link.digest());
    if digest.is_none() {
        debug!("get_remote_hash: no digest for {filename} at {index_url}");
    }
    digest
}

/// Normalise a package name for comparison: lowercase, with runs of `-`,
/// `_`, and `.` collapsed to a single `-`.
#[must_use]
pub fn normalise_name(name: &str) -> String {
    let mut normalised = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalised.push('-');
            }
            in_separator = true;
        } else {
            normalised.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalised
}

/// Derive the package name from a release filename.
///
/// Tries progressively shorter runs of leading dash-delimited segments and
/// returns the longest one whose normalised form is in `known`, which must
/// already hold normalised names (as [`IndexCache::get_index`] returns).
/// Returns an empty string when nothing matches.
///
/// # Examples
///
/// ```
/// use charm_resources::index::package_name_from_filename;
/// use std::collections::BTreeSet;
///
/// let known: BTreeSet<String> = ["foo", "foo-bar"].map(String::from).into();
/// assert_eq!(package_name_from_filename("foo-bar-1.0.tar.gz", &known), "foo-bar");
/// assert_eq!(package_name_from_filename("qux-1.0.zip", &known), "");
/// ```
#[must_use]
pub fn package_name_from_filename(filename: &str, known: &BTreeSet<String>) -> String {
    let segments: Vec<&str> = filename.split('-').collect();
    (1..=segments.len())
        .rev()
        .map(|count| segments[..count].join("-"))
        .find(|candidate| known.contains(&normalise_name(candidate)))
        .unwrap_or_default()
}

/// Return `true` when `filename` is a digest sidecar or generated page.
#[must_use]
pub fn is_bookkeeping_file(filename: &str) -> bool {
    if filename == INDEX_PAGE {
        return true;
    }
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| HashAlgorithm::ALL.iter().any(|a| a.name() == ext))
}

/// Path of the sidecar recording `artifact`'s digest under `algorithm`.
#[must_use]
pub fn sidecar_path(artifact: &Path, algorithm: HashAlgorithm) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".");
    name.push(algorithm.name());
    PathBuf::from(name)
}

/// Write `<artifact>.<algo>` containing the hex digest and a newline.
///
/// # Errors
///
/// Returns an I/O error if the sidecar cannot be written.
pub fn write_sidecar(artifact: &Path, digest: &RemoteDigest) -> std::io::Result<PathBuf> {
    let path = sidecar_path(artifact, digest.algorithm);
    fs::write(&path, format!("{}\n", digest.hex))?;
    Ok(path)
}

/// Read the first sidecar found for `artifact`, strongest algorithm first.
#[must_use]
pub fn read_sidecar(artifact: &Path) -> Option<RemoteDigest> {
    HashAlgorithm::ALL.iter().rev().find_map(|&algorithm| {
        let hex = fs::read_to_string(sidecar_path(artifact, algorithm)).ok()?;
        let hex = hex.trim();
        (!hex.is_empty()).then(|| RemoteDigest {
            algorithm,
            hex: hex.to_owned(),
        })
    })
}

/// Regenerate static index pages so `output_dir` can serve as a mirror.
///
/// Writes `<package>/index.html` for every package subdirectory, with one
/// anchor per artifact carrying its digest (from the sidecar, or computed
/// with SHA-256 when none exists), and a root `index.html` listing the
/// packages. Returns the pages written.
///
/// # Errors
///
/// Returns an I/O error if a directory cannot be read or a page written.
pub fn build_index(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut packages = Vec::new();
    for package_dir in sorted_entries(output_dir)? {
        if !package_dir.is_dir() {
            continue;
        }
        let mut links = Vec::new();
        for artifact in sorted_entries(&package_dir)? {
            let Some(name) = artifact.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !artifact.is_file() || is_bookkeeping_file(name) {
                continue;
            }
            let digest = match read_sidecar(&artifact) {
                Some(digest) => digest,
                None => RemoteDigest {
                    algorithm: FALLBACK_ALGORITHM,
                    hex: compute_digest(&artifact, FALLBACK_ALGORITHM)?,
                },
            };
            links.push(format!(
                "<a href=\"{name}#{}={}\">{name}</a>",
                digest.algorithm, digest.hex
            ));
        }
        if links.is_empty() {
            continue;
        }
        let page = package_dir.join(INDEX_PAGE);
        fs::write(&page, render_page(&links))?;
        written.push(page);
        if let Some(package) = package_dir.file_name().and_then(|n| n.to_str()) {
            packages.push(format!("<a href=\"{package}/\">{package}</a>"));
        }
    }
    let root = output_dir.join(INDEX_PAGE);
    fs::write(&root, render_page(&packages))?;
    written.push(root);
    Ok(written)
}

fn render_page(links: &[String]) -> String {
    let mut page = String::from("<html><body>\n");
    for link in links {
        page.push_str(&format!("{link}<br/>\n"));
    }
    page.push_str("</body></html>\n");
    page
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
