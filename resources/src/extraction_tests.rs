//! Unit tests for archive classification and installation.

use super::*;
use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use rstest::{fixture, rstest};
use std::io::Write;
use tempfile::TempDir;

/// Entries shared by the archive fixtures: every path sits under `toplevel/`.
const NESTED_ENTRIES: &[(&str, &[u8])] = &[
    ("toplevel/bin/tool", b"#!/bin/sh\n"),
    ("toplevel/README", b"readme"),
];

#[fixture]
fn temp() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn tar_builder_append<W: Write>(builder: &mut tar::Builder<W>, entries: &[(&str, &[u8])]) {
    let mut dir_header = tar::Header::new_gnu();
    dir_header.set_entry_type(tar::EntryType::Directory);
    dir_header.set_size(0);
    dir_header.set_mode(0o755);
    dir_header.set_cksum();
    builder
        .append_data(&mut dir_header, "toplevel/", io::empty())
        .expect("append dir");
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("append file");
    }
}

fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive");
    let encoder = GzEncoder::new(file, GzLevel::default());
    let mut builder = tar::Builder::new(encoder);
    tar_builder_append(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("gzip finish");
}

fn write_tar_zst(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive");
    let encoder = zstd::Encoder::new(file, 0).expect("zstd encoder");
    let mut builder = tar::Builder::new(encoder);
    tar_builder_append(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("zstd finish");
}

fn write_tar_bz2(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive");
    let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    tar_builder_append(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("bzip2 finish");
}

fn write_tar_xz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive");
    let encoder = xz2::write::XzEncoder::new(file, 6);
    let mut builder = tar::Builder::new(encoder);
    tar_builder_append(&mut builder, entries);
    let encoder = builder.into_inner().expect("tar finish");
    encoder.finish().expect("xz finish");
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    writer
        .add_directory("toplevel/", options)
        .expect("add dir");
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start file");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("zip finish");
}

fn child_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dest")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[rstest]
#[case::gzip(write_tar_gz as fn(&Path, &[(&str, &[u8])]), "bundle.tgz", Compression::Gzip)]
#[case::bzip2(write_tar_bz2 as fn(&Path, &[(&str, &[u8])]), "bundle.tar.bz2", Compression::Bzip2)]
#[case::xz(write_tar_xz as fn(&Path, &[(&str, &[u8])]), "bundle.tar.xz", Compression::Xz)]
#[case::zstd(write_tar_zst as fn(&Path, &[(&str, &[u8])]), "bundle.tar.zst", Compression::Zstd)]
fn classifies_compressed_tar(
    temp: TempDir,
    #[case] writer: fn(&Path, &[(&str, &[u8])]),
    #[case] name: &str,
    #[case] compression: Compression,
) {
    let path = temp.path().join(name);
    writer(&path, NESTED_ENTRIES);
    assert_eq!(
        classify(&path).expect("classify"),
        ArchiveKind::Tar(compression)
    );
}

#[rstest]
fn plain_bzip2_is_opaque(temp: TempDir) {
    let path = temp.path().join("notes.txt.bz2");
    let mut encoder = bzip2::write::BzEncoder::new(
        File::create(&path).expect("create"),
        bzip2::Compression::default(),
    );
    encoder.write_all(b"just some text").expect("write");
    encoder.finish().expect("finish");
    assert_eq!(classify(&path).expect("classify"), ArchiveKind::Opaque);
}

#[rstest]
fn classifies_zip_despite_extension(temp: TempDir) {
    let path = temp.path().join("plugin.egg");
    write_zip(&path, NESTED_ENTRIES);
    assert_eq!(classify(&path).expect("classify"), ArchiveKind::Zip);
}

#[rstest]
fn misnamed_tarball_is_classified_by_content(temp: TempDir) {
    let path = temp.path().join("bundle.zip");
    write_tar_gz(&path, NESTED_ENTRIES);
    assert_eq!(
        classify(&path).expect("classify"),
        ArchiveKind::Tar(Compression::Gzip)
    );
}

#[rstest]
fn plain_gzip_is_opaque(temp: TempDir) {
    let path = temp.path().join("notes.txt.gz");
    let mut encoder = GzEncoder::new(File::create(&path).expect("create"), GzLevel::default());
    encoder.write_all(b"just some text").expect("write");
    encoder.finish().expect("finish");
    assert_eq!(classify(&path).expect("classify"), ArchiveKind::Opaque);
}

#[rstest]
#[case::tar_gz(write_tar_gz as fn(&Path, &[(&str, &[u8])]), "bundle.tgz")]
#[case::tar_zst(write_tar_zst as fn(&Path, &[(&str, &[u8])]), "bundle.tar.zst")]
#[case::tar_bz2(write_tar_bz2 as fn(&Path, &[(&str, &[u8])]), "bundle.tar.bz2")]
#[case::tar_xz(write_tar_xz as fn(&Path, &[(&str, &[u8])]), "bundle.tar.xz")]
#[case::zip(write_zip as fn(&Path, &[(&str, &[u8])]), "bundle.zip")]
fn skip_top_level_collapses_shared_directory(
    temp: TempDir,
    #[case] writer: fn(&Path, &[(&str, &[u8])]),
    #[case] name: &str,
) {
    let archive = temp.path().join(name);
    writer(&archive, NESTED_ENTRIES);
    let dest = temp.path().join("out");

    install_artifact(&archive, &dest, true).expect("install");

    assert_eq!(child_names(&dest), vec!["README", "bin"]);
    assert_eq!(
        fs::read(dest.join("bin").join("tool")).expect("read tool"),
        b"#!/bin/sh\n"
    );
}

#[rstest]
#[case::tar_gz(write_tar_gz as fn(&Path, &[(&str, &[u8])]), "bundle.tgz")]
#[case::zip(write_zip as fn(&Path, &[(&str, &[u8])]), "bundle.zip")]
fn without_skip_top_level_keeps_directory(
    temp: TempDir,
    #[case] writer: fn(&Path, &[(&str, &[u8])]),
    #[case] name: &str,
) {
    let archive = temp.path().join(name);
    writer(&archive, NESTED_ENTRIES);
    let dest = temp.path().join("out");

    install_artifact(&archive, &dest, false).expect("install");

    assert_eq!(child_names(&dest), vec!["toplevel"]);
    assert!(dest.join("toplevel").join("README").is_file());
}

#[rstest]
fn skip_top_level_is_ignored_for_mixed_roots(temp: TempDir) {
    let archive = temp.path().join("mixed.zip");
    write_zip(&archive, &[("toplevel/a", b"a"), ("other/b", b"b")]);
    let dest = temp.path().join("out");

    install_artifact(&archive, &dest, true).expect("install");

    assert_eq!(child_names(&dest), vec!["other", "toplevel"]);
}

#[rstest]
fn opaque_artifact_is_copied_verbatim(temp: TempDir) {
    let artifact = temp.path().join("tool.jar.sha");
    fs::write(&artifact, b"opaque bytes").expect("write artifact");
    let dest = temp.path().join("nested").join("out");

    let kind = install_artifact(&artifact, &dest, true).expect("install");

    assert_eq!(kind, ArchiveKind::Opaque);
    assert_eq!(
        fs::read(dest.join("tool.jar.sha")).expect("read copy"),
        b"opaque bytes"
    );
}

#[rstest]
#[case::parent_dir("../escape.txt")]
#[case::nested_parent("foo/../../escape.txt")]
fn rejects_path_traversal(#[case] bad_path: &str) {
    let result = validate_entry_path(Path::new(bad_path));
    assert!(
        matches!(result, Err(ExtractionError::PathTraversal { .. })),
        "expected PathTraversal for {bad_path}"
    );
}

#[test]
fn rejects_absolute_path() {
    let result = validate_entry_path(Path::new("/etc/passwd"));
    assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
}

#[test]
fn common_top_level_ignores_lone_files() {
    let entries = vec![(PathBuf::from("README"), false)];
    assert_eq!(common_top_level(&entries), None);
}

#[test]
fn common_top_level_tolerates_dot_prefix() {
    let entries = vec![
        (PathBuf::from("./"), true),
        (PathBuf::from("./pkg/"), true),
        (PathBuf::from("./pkg/setup.py"), false),
    ];
    assert_eq!(common_top_level(&entries), Some(PathBuf::from("pkg")));
}
