//! The retrieval primitive used to fetch artifacts, hashes, and index pages.
//!
//! Provides a trait-based abstraction so tests can replace network access.
//! The production [`UreqRetriever`] serves `http://` and `https://` URLs
//! through `ureq` and resolves `file://` URLs and bare paths against the
//! local filesystem. A local directory is read as its `index.html`, the way
//! a static file server would present it, so a generated index can be used
//! straight from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Network timeout for a single retrieval.
const RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest text body accepted from a remote index page.
///
/// Root listings of public package indexes run to tens of megabytes.
const TEXT_BODY_LIMIT: u64 = 256 * 1024 * 1024;

/// Page served for a local directory.
const DIRECTORY_PAGE: &str = "index.html";

/// Trait for retrieving a URL either into a file or as text.
///
/// # Examples
///
/// ```no_run
/// use charm_resources::retrieval::{Retriever, UreqRetriever};
///
/// let listing = UreqRetriever.retrieve_text("https://pypi.python.org/simple/")?;
/// assert!(listing.contains("<a"));
/// # Ok::<(), charm_resources::retrieval::TransportError>(())
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Retriever {
    /// Retrieve `url` and write the body to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or `dest` cannot be
    /// written.
    fn retrieve(&self, url: &str, dest: &Path) -> Result<(), TransportError>;

    /// Retrieve `url` and return the body as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or is not UTF-8.
    fn retrieve_text(&self, url: &str) -> Result<String, TransportError>;
}

/// Errors arising from the retrieval primitive.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("retrieval failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The source does not exist (HTTP 404 or a missing local file).
    #[error("not found: {url}")]
    NotFound {
        /// The URL or path that was requested.
        url: String,
    },

    /// I/O error reading the source or writing the destination.
    #[error("I/O error during retrieval: {0}")]
    Io(#[from] io::Error),
}

/// Retriever backed by `ureq` for remote URLs and the filesystem otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqRetriever;

impl Retriever for UreqRetriever {
    fn retrieve(&self, url: &str, dest: &Path) -> Result<(), TransportError> {
        match Source::classify(url) {
            Source::Remote(remote) => download_to_file(remote, dest),
            Source::Local(path) => copy_local(url, &path, dest),
        }
    }

    fn retrieve_text(&self, url: &str) -> Result<String, TransportError> {
        match Source::classify(url) {
            Source::Remote(remote) => download_text(remote),
            Source::Local(path) if path.is_dir() => {
                fs::read_to_string(path.join(DIRECTORY_PAGE)).map_err(|e| local_error(url, e))
            }
            Source::Local(path) => fs::read_to_string(&path).map_err(|e| local_error(url, e)),
        }
    }
}

/// Where a URL's bytes come from.
#[derive(Debug, PartialEq, Eq)]
enum Source<'a> {
    Remote(&'a str),
    Local(PathBuf),
}

impl<'a> Source<'a> {
    fn classify(url: &'a str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Self::Remote(url);
        }
        if url.starts_with("file://") {
            if let Some(path) = url::Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.to_file_path().ok())
            {
                return Self::Local(path);
            }
            return Self::Local(PathBuf::from(url.trim_start_matches("file://")));
        }
        Self::Local(PathBuf::from(url))
    }
}

fn copy_local(url: &str, source: &Path, dest: &Path) -> Result<(), TransportError> {
    fs::copy(source, dest).map_err(|e| local_error(url, e))?;
    Ok(())
}

fn local_error(url: &str, err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::NotFound {
        TransportError::NotFound {
            url: url.to_owned(),
        }
    } else {
        TransportError::Io(err)
    }
}

/// Download a URL and return the body as a string.
fn download_text(url: &str) -> Result<String, TransportError> {
    let response = http_agent()
        .get(url)
        .call()
        .map_err(|e| map_ureq_error(url, &e))?;
    let mut body = response.into_body();
    body.with_config()
        .limit(TEXT_BODY_LIMIT)
        .read_to_string()
        .map_err(|e| TransportError::Http {
            url: url.to_owned(),
            reason: e.to_string(),
        })
}

/// Download a URL and write the body to a file.
fn download_to_file(url: &str, dest: &Path) -> Result<(), TransportError> {
    let response = http_agent()
        .get(url)
        .call()
        .map_err(|e| map_ureq_error(url, &e))?;
    let mut file = fs::File::create(dest)?;
    io::copy(&mut response.into_body().as_reader(), &mut file)?;
    Ok(())
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(RETRIEVAL_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`TransportError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(404) => TransportError::NotFound {
            url: url.to_owned(),
        },
        other => TransportError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
