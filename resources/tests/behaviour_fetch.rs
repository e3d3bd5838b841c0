//! BDD tests for fetching and verifying resources declared in a manifest.

use charm_resources::container::{ResourceContainer, Selection};
use charm_resources::hashing::{HashAlgorithm, compute_digest};
use charm_resources::index::{IndexCache, build_index, read_sidecar};
use charm_resources::manifest::{build_container, parse_manifest};
use charm_resources::ops;
use charm_resources::resource::FetchContext;
use charm_resources::retrieval::UreqRetriever;
use charm_resources::test_utils::StubPackageExecutor;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct FetchWorld {
    temp_dir: TempDir,
    source: Option<PathBuf>,
    mirror: Option<String>,
    container: Option<ResourceContainer>,
    executor: StubPackageExecutor,
    fetched_ok: Option<bool>,
    reported: usize,
}

impl FetchWorld {
    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn output_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    fn source(&self) -> &Path {
        self.source.as_deref().expect("source file staged")
    }

    fn load(&mut self, manifest: &str) {
        let manifest = parse_manifest(manifest, "behaviour").expect("manifest parses");
        let output_dir = self.output_dir();
        self.container =
            Some(build_container(&manifest, Some(&output_dir)).expect("container builds"));
    }

    fn fetch(&mut self, mirror: Option<&str>, force: bool) {
        let index = IndexCache::new();
        let ctx = FetchContext {
            retriever: &UreqRetriever,
            executor: &self.executor,
            index: &index,
            mirror,
        };
        let container = self.container.as_mut().expect("manifest loaded");
        let mut reported = 0;
        let ok = ops::fetch(container, &Selection::Required, &ctx, force, &mut |_| {
            reported += 1;
        })
        .expect("fetch runs");
        self.fetched_ok = Some(ok);
        self.reported = reported;
    }

    fn container(&self) -> &ResourceContainer {
        self.container.as_ref().expect("manifest loaded")
    }
}

#[fixture]
fn world() -> FetchWorld {
    FetchWorld {
        temp_dir: tempfile::tempdir().expect("temp dir"),
        source: None,
        mirror: None,
        container: None,
        executor: StubPackageExecutor::new(),
        fetched_ok: None,
        reported: 0,
    }
}

fn url_manifest(name: &str, url: &str, digest: &str) -> String {
    format!("resources:\n  {name}:\n    url: {url}\n    hash: '{digest}'\n    hash_type: sha256\n")
}

#[given("a source file \"{filename}\" containing \"{contents}\"")]
fn given_source_file(world: &mut FetchWorld, filename: String, contents: String) {
    let dir = world.root().join("sources");
    fs::create_dir_all(&dir).expect("create sources");
    let path = dir.join(filename);
    fs::write(&path, contents).expect("write source");
    world.source = Some(path);
}

#[given("a mirrored file \"{filename}\" containing \"{contents}\"")]
fn given_mirrored_file(world: &mut FetchWorld, filename: String, contents: String) {
    let dir = world.root().join("mirror");
    fs::create_dir_all(&dir).expect("create mirror");
    let path = dir.join(filename);
    fs::write(&path, contents).expect("write mirrored file");
    world.mirror = Some(format!("{}/", dir.display()));
    world.source = Some(path);
}

#[given("a manifest declaring \"{name}\" with the correct digest")]
fn given_manifest_with_digest(world: &mut FetchWorld, name: String) {
    let source = world.source().to_path_buf();
    let digest = compute_digest(&source, HashAlgorithm::Sha256).expect("digest");
    world.load(&url_manifest(&name, &source.display().to_string(), &digest));
}

#[given("a manifest declaring \"{name}\" with digest \"{digest}\"")]
fn given_manifest_with_wrong_digest(world: &mut FetchWorld, name: String, digest: String) {
    let source = world.source().display().to_string();
    world.load(&url_manifest(&name, &source, &digest));
}

#[given("a manifest declaring \"{name}\" from an unreachable host")]
fn given_manifest_from_unreachable_host(world: &mut FetchWorld, name: String) {
    let source = world.source().to_path_buf();
    let digest = compute_digest(&source, HashAlgorithm::Sha256).expect("digest");
    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .expect("UTF-8 file name");
    let url = format!("http://unreachable.invalid/dist/{filename}");
    world.load(&url_manifest(&name, &url, &digest));
}

#[given("a local package index with \"{artifact}\" and \"{dependency}\"")]
fn given_local_index(world: &mut FetchWorld, artifact: String, dependency: String) {
    let index_dir = world.root().join("index");
    let mut files = Vec::new();
    for filename in [&artifact, &dependency] {
        let package = filename
            .split_once('-')
            .map(|(package, _)| package)
            .expect("versioned file name");
        let dir = index_dir.join(package);
        fs::create_dir_all(&dir).expect("create package dir");
        let contents = format!("release {filename}").into_bytes();
        fs::write(dir.join(filename), &contents).expect("write artifact");
        files.push((filename.clone(), contents));
    }
    build_index(&index_dir).expect("index builds");

    let release: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(name, contents)| (name.as_str(), contents.as_slice()))
        .collect();
    world.executor = StubPackageExecutor::new().with_release("six==1.16.0", &release);
    world.mirror = Some(index_dir.display().to_string());
}

#[given("a manifest declaring package \"{spec}\"")]
fn given_package_manifest(world: &mut FetchWorld, spec: String) {
    let index = world.mirror.take().expect("local index built");
    world.load(&format!(
        "options:\n  index_url: {index}\nresources:\n  six:\n    pypi: {spec}\n"
    ));
}

#[when("the required resources are fetched")]
fn when_fetched(world: &mut FetchWorld) {
    world.fetch(None, false);
}

#[when("the required resources are fetched again")]
fn when_fetched_again(world: &mut FetchWorld) {
    world.fetch(None, false);
}

#[when("the required resources are fetched with force")]
fn when_fetched_with_force(world: &mut FetchWorld) {
    world.fetch(None, true);
}

#[when("the required resources are fetched from the mirror")]
fn when_fetched_from_mirror(world: &mut FetchWorld) {
    let mirror = world.mirror.clone().expect("mirror staged");
    world.fetch(Some(&mirror), false);
}

#[then("the fetch succeeds")]
fn then_fetch_succeeds(world: &mut FetchWorld) {
    assert_eq!(world.fetched_ok, Some(true));
}

#[then("the fetch fails")]
fn then_fetch_fails(world: &mut FetchWorld) {
    assert_eq!(world.fetched_ok, Some(false));
}

#[then("resource \"{name}\" verifies")]
fn then_resource_verifies(world: &mut FetchWorld, name: String) {
    let resource = world.container().get(&name).expect("resource declared");
    assert!(resource.verify(), "{name} should verify: {resource:?}");
}

#[then("the invalid resources are \"{names}\"")]
fn then_invalid_resources(world: &mut FetchWorld, names: String) {
    let expected: BTreeSet<String> = names.split(", ").map(str::to_owned).collect();
    let invalid = ops::invalid(world.container(), &Selection::Required).expect("invalid");
    assert_eq!(invalid, expected);
}

#[then("{count} resources were reported on the last fetch")]
fn then_reported(world: &mut FetchWorld, count: usize) {
    assert_eq!(world.reported, count);
}

#[then("\"{filename}\" is stored under \"{package}\" with a digest sidecar")]
fn then_dependency_rehomed(world: &mut FetchWorld, filename: String, package: String) {
    let stored = world.output_dir().join(package).join(filename);
    assert!(stored.is_file(), "{} should exist", stored.display());
    let digest = read_sidecar(&stored).expect("sidecar written");
    assert_eq!(
        compute_digest(&stored, digest.algorithm).expect("digest"),
        digest.hex
    );
}

#[scenario(
    path = "tests/features/fetch.feature",
    name = "URL resource is fetched and verified"
)]
fn scenario_url_fetch(world: FetchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fetch.feature",
    name = "Digest mismatch leaves the resource invalid"
)]
fn scenario_digest_mismatch(world: FetchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fetch.feature",
    name = "Mirror base relocates the download"
)]
fn scenario_mirror(world: FetchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fetch.feature",
    name = "Verified resources are skipped unless forced"
)]
fn scenario_force(world: FetchWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fetch.feature",
    name = "Package dependencies land in their own directories"
)]
fn scenario_package_dependencies(world: FetchWorld) {
    let _ = world;
}
