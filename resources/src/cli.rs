//! CLI argument definitions for the charm resource fetcher.
//!
//! The binary only wires these arguments to the batch operations in
//! [`crate::ops`]; everything it does is available through the library.

use crate::container::Selection;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Manifest location used when `--resources` is not given.
pub const DEFAULT_MANIFEST: &str = "resources.yaml";

/// Fetch, verify, and install charm resources.
#[derive(Parser, Debug)]
#[command(name = "charm-resources")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, verify, and install charm resources.\n\n",
    "Resources are declared in a YAML manifest as local files, URLs, or ",
    "package-index requirements, each optionally pinned by a digest. ",
    "Fetching skips resources that already verify unless --force is given.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Fetch every required resource:\n",
    "    $ charm-resources fetch\n\n",
    "  Mirror all resources from a local server:\n",
    "    $ charm-resources fetch --all -u http://mirror.internal/resources/\n\n",
    "  Check a single resource without output:\n",
    "    $ charm-resources verify -q jdk\n\n",
    "  Print where a resource lives:\n",
    "    $ charm-resources resource-path jdk",
))]
pub struct Cli {
    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short, long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch resources that are missing or fail verification.
    Fetch(FetchArgs),

    /// Check that fetched resources are present and match their digests.
    Verify(VerifyArgs),

    /// Install fetched resources, extracting archives and installing packages.
    Install(InstallArgs),

    /// Print the local path of a named resource.
    ResourcePath(ResourcePathArgs),

    /// Write index pages for package artifacts under the output directory.
    BuildIndex(ManifestArgs),
}

/// Manifest location and output-directory override shared by subcommands.
#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// File or URL containing the resource manifest.
    #[arg(short = 'r', long = "resources", value_name = "LOCATION", default_value = DEFAULT_MANIFEST)]
    pub manifest: String,

    /// Directory holding fetched resources [default: manifest `output_dir`].
    #[arg(short = 'd', long, value_name = "DIR")]
    pub output_dir: Option<Utf8PathBuf>,
}

/// Resource selection shared by the batch subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Include optional resources as well as required ones.
    #[arg(short, long)]
    pub all: bool,

    /// Names of specific resources [default: all required, or all with --all].
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

impl SelectionArgs {
    /// Resolve the positional names and `--all` flag to a [`Selection`].
    ///
    /// # Examples
    ///
    /// ```
    /// use charm_resources::cli::SelectionArgs;
    /// use charm_resources::container::Selection;
    ///
    /// let args = SelectionArgs { all: true, names: Vec::new() };
    /// assert_eq!(args.selection(), Selection::All);
    /// ```
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection::from_names(self.names.clone(), self.all)
    }
}

/// Arguments for the fetch command.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Manifest location.
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Resources to fetch.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Base URL to fetch from; only the filename of each resource is kept.
    #[arg(short = 'u', long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Re-fetch resources that already verify.
    #[arg(short, long)]
    pub force: bool,

    /// Suppress progress output (failures are still reported).
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the verify command.
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Manifest location.
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Resources to verify.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Suppress success output (failures are still reported).
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Manifest location.
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Resources to install.
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Directory to install into [default: alongside each resource].
    #[arg(long, value_name = "DIR")]
    pub destination: Option<Utf8PathBuf>,

    /// Drop the single top-level directory of extracted archives.
    #[arg(long)]
    pub skip_top_level: bool,

    /// Package index used when installing package resources.
    #[arg(short = 'u', long, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Arguments for the resource-path command.
#[derive(Args, Debug, Clone)]
pub struct ResourcePathArgs {
    /// Manifest location.
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Name of a resource.
    #[arg(value_name = "NAME")]
    pub name: String,
}

impl Default for ManifestArgs {
    /// Reads `resources.yaml` with no output-directory override.
    ///
    /// # Examples
    ///
    /// ```
    /// use charm_resources::cli::ManifestArgs;
    ///
    /// let args = ManifestArgs::default();
    /// assert_eq!(args.manifest, "resources.yaml");
    /// assert!(args.output_dir.is_none());
    /// ```
    fn default() -> Self {
        Self {
            manifest: DEFAULT_MANIFEST.to_owned(),
            output_dir: None,
        }
    }
}

impl Command {
    /// Manifest arguments of whichever subcommand was chosen.
    #[must_use]
    pub fn manifest_args(&self) -> &ManifestArgs {
        match self {
            Self::Fetch(args) => &args.manifest,
            Self::Verify(args) => &args.manifest,
            Self::Install(args) => &args.manifest,
            Self::ResourcePath(args) => &args.manifest,
            Self::BuildIndex(args) => args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn fetch_defaults() {
        let cli = Cli::parse_from(["charm-resources", "fetch"]);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.manifest.manifest, DEFAULT_MANIFEST);
        assert!(args.manifest.output_dir.is_none());
        assert_eq!(args.selection.selection(), Selection::Required);
        assert!(!args.force);
        assert!(!args.quiet);
        assert!(args.base_url.is_none());
    }

    #[test]
    fn fetch_accepts_short_flags_and_names() {
        let cli = Cli::parse_from([
            "charm-resources",
            "-vv",
            "fetch",
            "-r",
            "http://example.test/resources.yaml",
            "-d",
            "mirror",
            "-u",
            "http://mirror.test/",
            "-f",
            "-q",
            "jdk",
            "six",
        ]);
        assert_eq!(cli.verbosity, 2);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.manifest.manifest, "http://example.test/resources.yaml");
        assert_eq!(args.manifest.output_dir, Some(Utf8PathBuf::from("mirror")));
        assert_eq!(args.base_url.as_deref(), Some("http://mirror.test/"));
        assert!(args.force && args.quiet);
        assert_eq!(
            args.selection.selection(),
            Selection::Named(vec!["jdk".to_owned(), "six".to_owned()])
        );
    }

    #[rstest]
    #[case::required(&["verify"], Selection::Required)]
    #[case::all(&["verify", "--all"], Selection::All)]
    #[case::names_win(&["verify", "-a", "jdk"], Selection::from("jdk"))]
    fn verify_selection(#[case] args: &[&str], #[case] expected: Selection) {
        let cli = Cli::parse_from(std::iter::once("charm-resources").chain(args.iter().copied()));
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.selection.selection(), expected);
    }

    #[test]
    fn install_options() {
        let cli = Cli::parse_from([
            "charm-resources",
            "install",
            "--destination",
            "/opt/app",
            "--skip-top-level",
        ]);
        let Command::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.destination, Some(Utf8PathBuf::from("/opt/app")));
        assert!(args.skip_top_level);
    }

    #[test]
    fn resource_path_requires_a_name() {
        assert!(Cli::try_parse_from(["charm-resources", "resource-path"]).is_err());
        let cli = Cli::parse_from(["charm-resources", "resource-path", "-d", "out", "jdk"]);
        let Command::ResourcePath(args) = &cli.command else {
            panic!("expected resource-path");
        };
        assert_eq!(args.name, "jdk");
        assert_eq!(
            cli.command.manifest_args().output_dir,
            Some(Utf8PathBuf::from("out"))
        );
    }

    #[test]
    fn build_index_reads_manifest_args() {
        let cli = Cli::parse_from(["charm-resources", "build-index", "-r", "other.yaml"]);
        assert_eq!(cli.command.manifest_args().manifest, "other.yaml");
    }
}
