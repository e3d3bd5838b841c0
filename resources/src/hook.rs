//! Helpers for code running inside a charm hook.

use crate::executor::{CommandExecutor, ExecutorError};
use log::debug;
use serde::de::DeserializeOwned;

/// Hook tool that reads the charm's configuration.
pub const CONFIG_GET: &str = "config-get";

/// Read the charm configuration option `option` through the `config-get`
/// hook tool.
///
/// The tool's YAML output is decoded into `T`. An unset option (YAML null)
/// or output that does not decode as `T` yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`ExecutorError::Spawn`] when the tool cannot be started and
/// [`ExecutorError::Failed`] when it exits unsuccessfully.
///
/// # Examples
///
/// ```no_run
/// use charm_resources::executor::SystemCommandExecutor;
/// use charm_resources::hook::config_get;
///
/// let mirror: Option<String> = config_get(&SystemCommandExecutor, "resources_mirror")?;
/// # Ok::<(), charm_resources::executor::ExecutorError>(())
/// ```
pub fn config_get<T: DeserializeOwned>(
    commands: &dyn CommandExecutor,
    option: &str,
) -> Result<Option<T>, ExecutorError> {
    let output = commands
        .run(CONFIG_GET, &[option, "--format=yaml"])
        .map_err(|source| ExecutorError::Spawn {
            command: CONFIG_GET.to_owned(),
            source,
        })?;
    if !output.status.success() {
        return Err(ExecutorError::Failed {
            command: CONFIG_GET.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    match serde_yaml::from_slice::<Option<T>>(&output.stdout) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!("config_get: cannot decode {option}: {e}");
            Ok(None)
        }
    }
}
