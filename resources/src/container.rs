//! The resource container and subset selection.

use crate::error::{ResourceError, Result};
use crate::resource::Resource;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Which resources an operation applies to.
///
/// # Examples
///
/// ```
/// use charm_resources::container::Selection;
///
/// assert_eq!(Selection::from_names(Vec::new(), false), Selection::Required);
/// assert_eq!(Selection::from_names(Vec::new(), true), Selection::All);
/// assert_eq!(
///     Selection::from("hadoop"),
///     Selection::Named(vec!["hadoop".to_owned()])
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every required resource.
    #[default]
    Required,
    /// The named resources, in the order given.
    Named(Vec<String>),
    /// Every resource, required and optional.
    All,
}

impl Selection {
    /// Build a selection from positional names and an `--all` flag.
    ///
    /// Names win over the flag; no names and no flag selects the required
    /// subset.
    #[must_use]
    pub fn from_names(names: Vec<String>, all: bool) -> Self {
        match (names.is_empty(), all) {
            (false, _) => Self::Named(names),
            (true, true) => Self::All,
            (true, false) => Self::Required,
        }
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Self::Named(vec![name.to_owned()])
    }
}

impl From<Vec<String>> for Selection {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names, false)
    }
}

/// Ordered mapping of resource names to resources, partitioned into
/// required and optional subsets.
#[derive(Debug, Clone)]
pub struct ResourceContainer {
    output_dir: PathBuf,
    index_url: Option<String>,
    resources: IndexMap<String, Resource>,
    required: BTreeSet<String>,
}

impl ResourceContainer {
    /// Create an empty container writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, index_url: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            index_url,
            resources: IndexMap::new(),
            required: BTreeSet::new(),
        }
    }

    /// Directory resources are written into by default.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Package index override from the manifest, if any.
    #[must_use]
    pub fn index_url(&self) -> Option<&str> {
        self.index_url.as_deref()
    }

    /// Add a resource to the required subset.
    pub fn add_required(&mut self, resource: Resource) {
        self.required.insert(resource.name().to_owned());
        self.resources.insert(resource.name().to_owned(), resource);
    }

    /// Add a resource outside the required subset.
    ///
    /// Replacing a required resource of the same name demotes it.
    pub fn add_optional(&mut self, resource: Resource) {
        self.required.remove(resource.name());
        self.resources.insert(resource.name().to_owned(), resource);
    }

    /// Look up a resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Look up a resource by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    /// Return `true` when `name` is in the required subset.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    /// All resources in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Number of resources, required and optional.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Return `true` when the container holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resolve a selection to resource names.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for a name the container
    /// does not hold.
    pub fn select(&self, which: &Selection) -> Result<Vec<String>> {
        match which {
            Selection::Required => Ok(self
                .resources
                .keys()
                .filter(|name| self.required.contains(*name))
                .cloned()
                .collect()),
            Selection::All => Ok(self.resources.keys().cloned().collect()),
            Selection::Named(names) if names.is_empty() => self.select(&Selection::Required),
            Selection::Named(names) => names
                .iter()
                .map(|name| {
                    if self.resources.contains_key(name) {
                        Ok(name.clone())
                    } else {
                        Err(ResourceError::UnknownResource { name: name.clone() })
                    }
                })
                .collect(),
        }
    }

    /// Resolve a selection to resources.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] for a name the container
    /// does not hold.
    pub fn subset(&self, which: &Selection) -> Result<Vec<&Resource>> {
        Ok(self
            .select(which)?
            .iter()
            .filter_map(|name| self.resources.get(name))
            .collect())
    }
}
