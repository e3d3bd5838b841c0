//! Shared test utilities for the resources crate.

use crate::executor::{CommandExecutor, ExecutorError, PackageExecutor, list_dir};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.cast_unsigned())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "pip").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    #[expect(clippy::expect_used, reason = "a stray invocation is a test bug")]
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let call = expected.pop_front().expect("unexpected command invocation");

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);

        call.result
    }
}

/// A `download` invocation recorded by [`StubPackageExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCall {
    /// The package spec requested.
    pub spec: String,
    /// The download directory.
    pub dir: PathBuf,
    /// The index mirror, if any.
    pub mirror: Option<String>,
}

/// An `install_artifacts` invocation recorded by [`StubPackageExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    /// The artifacts handed over, in order.
    pub paths: Vec<PathBuf>,
    /// The index mirror, if any.
    pub mirror: Option<String>,
}

/// A `PackageExecutor` that writes canned release files instead of running
/// the package manager.
///
/// Each spec registered with [`with_release`](Self::with_release) maps to
/// the files a download of that spec produces. Unknown specs fail like a
/// package manager that cannot find a distribution.
#[derive(Debug, Default)]
pub struct StubPackageExecutor {
    releases: HashMap<String, Vec<(String, Vec<u8>)>>,
    failing: bool,
    downloads: RefCell<Vec<DownloadCall>>,
    installs: RefCell<Vec<InstallCall>>,
}

impl StubPackageExecutor {
    /// Creates an executor that knows no releases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor whose every invocation fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Registers the files produced by downloading `spec`.
    #[must_use]
    pub fn with_release(mut self, spec: &str, files: &[(&str, &[u8])]) -> Self {
        let files = files
            .iter()
            .map(|(name, data)| ((*name).to_owned(), data.to_vec()))
            .collect();
        self.releases.insert(spec.to_owned(), files);
        self
    }

    /// The `download` calls made so far.
    #[must_use]
    pub fn downloads(&self) -> Vec<DownloadCall> {
        self.downloads.borrow().clone()
    }

    /// The `install_artifacts` calls made so far.
    #[must_use]
    pub fn installs(&self) -> Vec<InstallCall> {
        self.installs.borrow().clone()
    }

    fn failure(reason: &str) -> ExecutorError {
        ExecutorError::Failed {
            command: "pip".to_owned(),
            status: exit_status(1).to_string(),
            stderr: reason.to_owned(),
        }
    }
}

impl PackageExecutor for StubPackageExecutor {
    fn download(
        &self,
        spec: &str,
        dir: &Path,
        mirror: Option<&str>,
    ) -> Result<Vec<String>, ExecutorError> {
        self.downloads.borrow_mut().push(DownloadCall {
            spec: spec.to_owned(),
            dir: dir.to_path_buf(),
            mirror: mirror.map(str::to_owned),
        });
        if self.failing {
            return Err(Self::failure("stub download failure"));
        }
        let files = self
            .releases
            .get(spec)
            .ok_or_else(|| Self::failure("No matching distribution found"))?;
        for (name, data) in files {
            fs::write(dir.join(name), data).map_err(|source| ExecutorError::Listing {
                path: dir.to_path_buf(),
                source,
            })?;
        }
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
        self.installs.borrow_mut().push(InstallCall {
            paths: paths.to_vec(),
            mirror: mirror.map(str::to_owned),
        });
        if self.failing {
            return Err(Self::failure("stub install failure"));
        }
        Ok(())
    }
}
