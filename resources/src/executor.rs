//! Package-manager integration.
//!
//! The external package manager is a black box invoked as a subprocess. The
//! core only sees the [`PackageExecutor`] seam, so fetch and install logic is
//! testable without a real tool on the host.

use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Package manager invoked by [`PipExecutor::system`].
pub const DEFAULT_PACKAGE_MANAGER: &str = "pip";

/// Errors arising from package-manager invocations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The command could not be spawned.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// The program that failed to start.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        /// The program that failed.
        command: String,
        /// Human-readable exit status.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The download directory could not be listed afterwards.
    #[error("failed to list {path}: {source}")]
    Listing {
        /// The directory that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or running the command.
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        (**self).run(cmd, args)
    }
}

/// Executes commands on the host system.
///
/// # Examples
///
/// ```no_run
/// use charm_resources::executor::{CommandExecutor, SystemCommandExecutor};
///
/// let output = SystemCommandExecutor.run("pip", &["--version"])?;
/// assert!(output.status.success());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Command::new(cmd).args(args).output()
    }
}

/// Download and install operations the package resources rely on.
pub trait PackageExecutor {
    /// Download `spec` and its dependencies into `dir` without installing.
    ///
    /// Returns the file names present in `dir` afterwards, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the package manager fails or `dir` cannot be read.
    fn download(
        &self,
        spec: &str,
        dir: &Path,
        mirror: Option<&str>,
    ) -> Result<Vec<String>, ExecutorError>;

    /// Install already-downloaded artifacts in one invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the package manager fails.
    fn install_artifacts(&self, paths: &[PathBuf], mirror: Option<&str>)
    -> Result<(), ExecutorError>;
}

/// [`PackageExecutor`] that shells out to `pip` (or a compatible tool).
#[derive(Debug, Clone)]
pub struct PipExecutor<E> {
    program: String,
    commands: E,
}

impl PipExecutor<SystemCommandExecutor> {
    /// Executor running the default package manager on the host.
    #[must_use]
    pub fn system() -> Self {
        Self::new(DEFAULT_PACKAGE_MANAGER, SystemCommandExecutor)
    }
}

impl<E: CommandExecutor> PipExecutor<E> {
    /// Executor running `program` through `commands`.
    pub fn new(program: impl Into<String>, commands: E) -> Self {
        Self {
            program: program.into(),
            commands,
        }
    }

    fn invoke(&self, args: &[&str]) -> Result<(), ExecutorError> {
        debug!("running {} {}", self.program, args.join(" "));
        let output = self
            .commands
            .run(&self.program, args)
            .map_err(|source| ExecutorError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(ExecutorError::Failed {
            command: self.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

impl<E: CommandExecutor> PackageExecutor for PipExecutor<E> {
    fn download(
        &self,
        spec: &str,
        dir: &Path,
        mirror: Option<&str>,
    ) -> Result<Vec<String>, ExecutorError> {
        let dir_arg = dir.to_string_lossy();
        let mut args = vec!["install", spec, "--download", dir_arg.as_ref()];
        push_mirror(&mut args, mirror);
        self.invoke(&args)?;
        list_dir(dir).map_err(|source| ExecutorError::Listing {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn install_artifacts(
        &self,
        paths: &[PathBuf],
        mirror: Option<&str>,
    ) -> Result<(), ExecutorError> {
        let path_args: Vec<String> = paths
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let mut args = vec!["install"];
        args.extend(path_args.iter().map(String::as_str));
        push_mirror(&mut args, mirror);
        self.invoke(&args)
    }
}

fn push_mirror<'a>(args: &mut Vec<&'a str>, mirror: Option<&'a str>) {
    if let Some(mirror) = mirror {
        args.extend(["-i", mirror]);
    }
}

/// Sorted file names directly inside `dir`.
///
/// # Errors
///
/// Returns an I/O error if `dir` cannot be read.
pub fn list_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
