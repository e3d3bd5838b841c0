//! Charm resource fetcher library.
//!
//! This crate fetches, verifies, and installs the external resources a charm
//! declares in its manifest: local files, URL downloads, and package-index
//! requirements. It is used by the `charm-resources` CLI binary and can be
//! consumed programmatically by charm hooks.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`container`] - Resource container and subset selection
//! - [`error`] - Configuration error taxonomy
//! - [`executor`] - Package-manager subprocess seam
//! - [`extraction`] - Archive classification and extraction
//! - [`hashing`] - Digest registry and file verification
//! - [`hook`] - Charm hook helpers
//! - [`index`] - Package index scraping, caching, and generation
//! - [`manifest`] - YAML manifest loading
//! - [`ops`] - Batch fetch, verify, and install operations
//! - [`resource`] - Resource variants and their lifecycle
//! - [`retrieval`] - URL and local-file retrieval
//! - [`spec`] - Package requirement parsing

pub mod cli;
pub mod container;
pub mod error;
pub mod executor;
pub mod extraction;
pub mod hashing;
pub mod hook;
pub mod index;
pub mod manifest;
pub mod ops;
pub mod resource;
pub mod retrieval;
pub mod spec;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
