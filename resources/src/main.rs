//! Charm resource fetcher CLI entrypoint.
//!
//! Loads a resource manifest and fetches, verifies, or installs the selected
//! resources. Exits non-zero when any selected resource is left invalid.

use camino::Utf8Path;
use charm_resources::cli::{
    Cli, Command, FetchArgs, InstallArgs, ManifestArgs, ResourcePathArgs, VerifyArgs,
};
use charm_resources::container::{ResourceContainer, Selection};
use charm_resources::error::{ResourceError, Result};
use charm_resources::executor::PipExecutor;
use charm_resources::index::{IndexCache, build_index};
use charm_resources::manifest::{build_container, read_manifest};
use charm_resources::ops;
use charm_resources::resource::{FetchContext, InstallContext, Resource};
use charm_resources::retrieval::UreqRetriever;
use clap::Parser;
use log::{debug, info};
use std::io::Write;
use std::path::Path;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Install `env_logger`, letting `RUST_LOG` override the `-v` count.
fn init_logging(verbosity: u8) {
    let env = env_logger::Env::default().default_filter_or(log_level(verbosity));
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .init();
}

fn log_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Fetch(args) => run_fetch(args, stderr),
        Command::Verify(args) => run_verify(args, stderr),
        Command::Install(args) => run_install(args),
        Command::ResourcePath(args) => run_resource_path(args, stdout),
        Command::BuildIndex(args) => run_build_index(args, stderr),
    }
}

fn load_container(args: &ManifestArgs) -> Result<ResourceContainer> {
    let manifest = read_manifest(&UreqRetriever, &args.manifest)?;
    build_container(&manifest, output_dir_override(args))
}

fn output_dir_override(args: &ManifestArgs) -> Option<&Path> {
    args.output_dir.as_deref().map(Utf8Path::as_std_path)
}

fn run_fetch(args: &FetchArgs, stderr: &mut dyn Write) -> Result<()> {
    let mut container = load_container(&args.manifest)?;
    let which = args.selection.selection();
    let executor = PipExecutor::system();
    let index = IndexCache::new();
    let ctx = FetchContext {
        retriever: &UreqRetriever,
        executor: &executor,
        index: &index,
        mirror: args.base_url.as_deref(),
    };
    let quiet = args.quiet;
    ops::fetch(&mut container, &which, &ctx, args.force, &mut |resource| {
        if !quiet {
            write_stderr_line(stderr, format_args!("Fetching {}...", resource.name()));
        }
    })?;
    report_invalid(&container, &which, quiet, stderr)
}

fn run_verify(args: &VerifyArgs, stderr: &mut dyn Write) -> Result<()> {
    let container = load_container(&args.manifest)?;
    report_invalid(&container, &args.selection.selection(), args.quiet, stderr)
}

/// Turn the invalid subset into the command outcome.
fn report_invalid(
    container: &ResourceContainer,
    which: &Selection,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<()> {
    let invalid = ops::invalid(container, which)?;
    if invalid.is_empty() {
        if !quiet {
            write_stderr_line(stderr, "All resources successfully downloaded");
        }
        return Ok(());
    }
    Err(ResourceError::InvalidResources {
        names: invalid.into_iter().collect(),
    })
}

fn run_install(args: &InstallArgs) -> Result<()> {
    let container = load_container(&args.manifest)?;
    let executor = PipExecutor::system();
    let mirror = args.base_url.as_deref();
    let (packages, others): (Vec<String>, Vec<String>) = container
        .select(&args.selection.selection())?
        .into_iter()
        .partition(|name| matches!(container.get(name), Some(Resource::Package(_))));

    let mut failed = Vec::new();
    if !others.is_empty() {
        let ctx = InstallContext {
            executor: &executor,
            destination: args.destination.as_deref().map(Utf8Path::as_std_path),
            skip_top_level: args.skip_top_level,
            mirror,
        };
        failed.extend(ops::install(&container, &Selection::Named(others), &ctx)?);
    }
    if !packages.is_empty()
        && !ops::install_packages(
            &container,
            &Selection::Named(packages.clone()),
            &executor,
            mirror,
        )?
    {
        failed.extend(packages);
    }

    if failed.is_empty() {
        info!("installed all selected resources");
        return Ok(());
    }
    failed.sort();
    Err(ResourceError::InvalidResources { names: failed })
}

fn run_resource_path(args: &ResourcePathArgs, stdout: &mut dyn Write) -> Result<()> {
    let container = load_container(&args.manifest)?;
    let path = ops::resource_path(&container, &args.name)?;
    writeln!(stdout, "{}", path.display()).map_err(|source| ResourceError::WriteFailed { source })
}

fn run_build_index(args: &ManifestArgs, stderr: &mut dyn Write) -> Result<()> {
    let output_dir = match output_dir_override(args) {
        Some(dir) => dir.to_path_buf(),
        None => load_container(args)?.output_dir().to_path_buf(),
    };
    let pages = build_index(&output_dir)?;
    for page in &pages {
        debug!("wrote {}", page.display());
    }
    write_stderr_line(
        stderr,
        format_args!("Wrote {} index pages under {}", pages.len(), output_dir.display()),
    );
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charm_resources::hashing::{HashAlgorithm, compute_digest};
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    /// A manifest with one staged file resource and one missing one.
    fn stage_manifest(dir: &TempDir) -> String {
        let out = dir.path().join("out");
        fs::create_dir_all(&out).expect("create output dir");
        let present = out.join("present.txt");
        fs::write(&present, b"here").expect("stage file");
        let digest = compute_digest(&present, HashAlgorithm::Sha256).expect("digest");
        let manifest = dir.path().join("resources.yaml");
        fs::write(
            &manifest,
            format!(
                "resources:
  present:
    filename: present.txt
    hash: '{digest}'
    hash_type: sha256
optional_resources:
  absent:
    filename: absent.txt
    hash: 'ffff'
    hash_type: sha256
"
            ),
        )
        .expect("write manifest");
        manifest.display().to_string()
    }

    fn run_args(args: &[&str]) -> (Result<()>, String, String) {
        let cli = Cli::parse_from(std::iter::once("charm-resources").chain(args.iter().copied()));
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let result = run(&cli, &mut stdout, &mut stderr);
        (
            result,
            String::from_utf8(stdout).expect("stdout was not UTF-8"),
            String::from_utf8(stderr).expect("stderr was not UTF-8"),
        )
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = ResourceError::InvalidResources {
            names: vec!["a".to_owned(), "b".to_owned()],
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert_eq!(stderr_text, "Invalid or missing resources: a, b\n");
    }

    #[rstest]
    #[case::quiet(0, "warn")]
    #[case::verbose(1, "info")]
    #[case::very_verbose(2, "debug")]
    #[case::saturates(9, "trace")]
    fn log_level_follows_verbosity(#[case] verbosity: u8, #[case] expected: &str) {
        assert_eq!(log_level(verbosity), expected);
    }

    #[test]
    fn verify_reports_success_for_required_resources() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = stage_manifest(&dir);
        let out = dir.path().join("out").display().to_string();

        let (result, _, stderr) = run_args(&["verify", "-r", &manifest, "-d", &out]);

        assert!(result.is_ok());
        assert!(stderr.contains("All resources successfully downloaded"));
    }

    #[test]
    fn verify_all_names_missing_optional_resources() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = stage_manifest(&dir);
        let out = dir.path().join("out").display().to_string();

        let (result, _, stderr) = run_args(&["verify", "-q", "-a", "-r", &manifest, "-d", &out]);

        assert!(stderr.is_empty());
        let err = result.expect_err("absent resource is invalid");
        assert_eq!(err.to_string(), "Invalid or missing resources: absent");
    }

    #[test]
    fn resource_path_prints_destination() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = stage_manifest(&dir);
        let out = dir.path().join("out");
        let out_arg = out.display().to_string();

        let (result, stdout, _) =
            run_args(&["resource-path", "-r", &manifest, "-d", &out_arg, "absent"]);

        assert!(result.is_ok());
        assert_eq!(stdout.trim_end(), out.join("absent.txt").display().to_string());
    }

    #[test]
    fn unknown_resource_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = stage_manifest(&dir);

        let (result, _, _) = run_args(&["resource-path", "-r", &manifest, "nope"]);

        assert!(matches!(
            result,
            Err(ResourceError::UnknownResource { name }) if name == "nope"
        ));
    }
}
