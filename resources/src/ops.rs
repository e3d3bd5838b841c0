//! Batch operations over a selection of resources.
//!
//! One resource's failure never aborts a batch. Fetch and install report
//! per-resource problems through the log and leave the aggregate verdict to
//! [`invalid`], which callers consult after the batch completes.

use crate::container::{ResourceContainer, Selection};
use crate::error::{ResourceError, Result};
use crate::executor::PackageExecutor;
use crate::resource::{FetchContext, InstallContext, Resource};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Names of the selected resources that fail verification.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] for an unknown name.
pub fn invalid(container: &ResourceContainer, which: &Selection) -> Result<BTreeSet<String>> {
    Ok(container
        .subset(which)?
        .into_iter()
        .filter(|resource| !resource.verify())
        .map(|resource| resource.name().to_owned())
        .collect())
}

/// Return `true` when every selected resource verifies.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] for an unknown name.
pub fn verify(container: &ResourceContainer, which: &Selection) -> Result<bool> {
    Ok(invalid(container, which)?.is_empty())
}

/// Fetch the selected resources, then report whether all of them verify.
///
/// Resources that already verify are skipped unless `force` is set.
/// `reporthook` is called with each resource about to be fetched.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] for an unknown name.
pub fn fetch(
    container: &mut ResourceContainer,
    which: &Selection,
    ctx: &FetchContext<'_>,
    force: bool,
    reporthook: &mut dyn FnMut(&Resource),
) -> Result<bool> {
    for name in container.select(which)? {
        let Some(resource) = container.get_mut(&name) else {
            continue;
        };
        if !force && resource.verify() {
            debug!("{name} already verifies; skipping");
            continue;
        }
        reporthook(resource);
        let outcome = resource.fetch(ctx);
        debug!("{name}: {outcome:?}");
    }
    verify(container, which)
}

/// Install the selected resources and return the names that failed.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] for an unknown name.
pub fn install(
    container: &ResourceContainer,
    which: &Selection,
    ctx: &InstallContext<'_>,
) -> Result<Vec<String>> {
    Ok(container
        .subset(which)?
        .into_iter()
        .filter(|resource| !resource.install(ctx))
        .map(|resource| resource.name().to_owned())
        .collect())
}

/// Install every selected package resource in one package-manager call.
///
/// Non-package resources in the selection are ignored. Returns `false`
/// without invoking the package manager when any selected package does not
/// verify.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] for an unknown name.
pub fn install_packages(
    container: &ResourceContainer,
    which: &Selection,
    executor: &dyn PackageExecutor,
    mirror: Option<&str>,
) -> Result<bool> {
    let packages: Vec<&Resource> = container
        .subset(which)?
        .into_iter()
        .filter(|resource| matches!(resource, Resource::Package(_)))
        .collect();
    let unverified: Vec<&str> = packages
        .iter()
        .filter(|resource| !resource.verify())
        .map(|resource| resource.name())
        .collect();
    if !unverified.is_empty() {
        warn!("not installing packages; unverified: {}", unverified.join(", "));
        return Ok(false);
    }
    let paths: Vec<PathBuf> = packages
        .iter()
        .filter_map(|resource| resource.destination())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return Ok(true);
    }
    info!("installing {} package artifacts", paths.len());
    match executor.install_artifacts(&paths, mirror) {
        Ok(()) => Ok(true),
        Err(e) => {
            warn!("package install failed: {e}");
            Ok(false)
        }
    }
}

/// Local path of the named resource.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownResource`] when the name is not declared.
pub fn resource_path(container: &ResourceContainer, name: &str) -> Result<PathBuf> {
    container
        .get(name)
        .map(|resource| resource.path().to_path_buf())
        .ok_or_else(|| ResourceError::UnknownResource {
            name: name.to_owned(),
        })
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
