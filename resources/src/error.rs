//! Error types for resource loading and lifecycle operations.
//!
//! Only configuration problems surface as [`ResourceError`]. Transport,
//! extraction, and package-manager failures are classified at the resource
//! boundary and reported as an unverified resource instead.

use thiserror::Error;

/// Errors that abort a resource operation.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The manifest names a hash algorithm that is not in the digest registry.
    #[error("unsupported hash algorithm \"{name}\"; expected one of: {expected}")]
    UnsupportedHashAlgorithm {
        /// The rejected algorithm name.
        name: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// A package requirement or package URL could not be parsed.
    #[error("invalid package spec \"{spec}\": {reason}")]
    InvalidPackageSpec {
        /// The rejected spec string.
        spec: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A resource definition is internally inconsistent.
    #[error("invalid definition for resource {name}: {reason}")]
    InvalidDefinition {
        /// Name of the offending resource.
        name: String,
        /// Description of the inconsistency.
        reason: String,
    },

    /// A resource name was requested that the manifest does not declare.
    #[error("unknown resource: {name}")]
    UnknownResource {
        /// The requested name.
        name: String,
    },

    /// The manifest document could not be read.
    #[error("failed to read manifest {location}: {reason}")]
    ManifestUnavailable {
        /// Path or URL of the manifest.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// The manifest document is not valid YAML for the expected schema.
    #[error("invalid manifest {location}")]
    ManifestParse {
        /// Path or URL of the manifest.
        location: String,
        /// The underlying deserialisation error.
        #[source]
        source: serde_yaml::Error,
    },

    /// Selected resources are missing or fail verification.
    #[error("Invalid or missing resources: {}", names.join(", "))]
    InvalidResources {
        /// Names of the failing resources, sorted.
        names: Vec<String>,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write command output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using [`ResourceError`].
pub type Result<T> = std::result::Result<T, ResourceError>;
