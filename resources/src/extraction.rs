//! Archive installation for fetched artifacts.
//!
//! Artifacts are classified by file signature rather than by extension:
//! tar archives (plain, or gzip, bzip2, xz, or zstd compressed) and zip
//! archives are extracted, anything else is copied verbatim. Every entry
//! path is validated before extraction to prevent zip-slip attacks.

use log::debug;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [b'P', b'K', 0x05, 0x06];
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_BLOCK: usize = 512;

/// Compression layer wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed tar.
    None,
    /// gzip (`.tar.gz`, `.tgz`).
    Gzip,
    /// bzip2 (`.tar.bz2`).
    Bzip2,
    /// xz (`.tar.xz`).
    Xz,
    /// Zstandard (`.tar.zst`).
    Zstd,
}

/// Signature-based classification of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A tar archive, possibly compressed.
    Tar(Compression),
    /// A zip archive (including eggs and wheels).
    Zip,
    /// Not a recognised archive; copied verbatim on install.
    Opaque,
}

/// Errors arising from archive installation.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction or copying.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container could not be read.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The artifact path has no file name to copy under.
    #[error("artifact path has no file name: {path}")]
    MissingFileName {
        /// The artifact path.
        path: String,
    },
}

/// Classify the artifact at `path` by its leading bytes.
///
/// Compressed streams are only reported as tar when the decompressed
/// header carries the `ustar` magic, so a lone `.gz` file is opaque.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn classify(path: &Path) -> io::Result<ArchiveKind> {
    let head = read_prefix(File::open(path)?, TAR_BLOCK)?;
    if head.starts_with(&ZIP_MAGIC) || head.starts_with(&ZIP_EMPTY_MAGIC) {
        return Ok(ArchiveKind::Zip);
    }
    if head.starts_with(&GZIP_MAGIC) {
        let decoded = read_prefix(flate2::read::GzDecoder::new(File::open(path)?), TAR_BLOCK);
        return Ok(tar_or_opaque(decoded.ok().as_deref(), Compression::Gzip));
    }
    if head.starts_with(BZIP2_MAGIC) {
        let decoded = read_prefix(bzip2::read::BzDecoder::new(File::open(path)?), TAR_BLOCK);
        return Ok(tar_or_opaque(decoded.ok().as_deref(), Compression::Bzip2));
    }
    if head.starts_with(&XZ_MAGIC) {
        let decoded = read_prefix(xz2::read::XzDecoder::new(File::open(path)?), TAR_BLOCK);
        return Ok(tar_or_opaque(decoded.ok().as_deref(), Compression::Xz));
    }
    if head.starts_with(&ZSTD_MAGIC) {
        let decoded = zstd::Decoder::new(File::open(path)?)
            .and_then(|decoder| read_prefix(decoder, TAR_BLOCK));
        return Ok(tar_or_opaque(decoded.ok().as_deref(), Compression::Zstd));
    }
    Ok(tar_or_opaque(Some(&head), Compression::None))
}

fn tar_or_opaque(header: Option<&[u8]>, compression: Compression) -> ArchiveKind {
    let is_tar = header
        .and_then(|bytes| bytes.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()))
        .is_some_and(|magic| magic == TAR_MAGIC);
    if is_tar {
        ArchiveKind::Tar(compression)
    } else {
        ArchiveKind::Opaque
    }
}

fn read_prefix(reader: impl Read, limit: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(limit);
    reader.take(limit as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Install `artifact` into `dest_dir`.
///
/// Archives are extracted; opaque files are copied under their original
/// name. With `skip_top_level`, a single leading directory shared by every
/// entry is stripped so its contents land directly in `dest_dir`.
/// `dest_dir` is created if needed.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] if any entry escapes
/// `dest_dir`, or an I/O or zip error if reading or writing fails.
pub fn install_artifact(
    artifact: &Path,
    dest_dir: &Path,
    skip_top_level: bool,
) -> Result<ArchiveKind, ExtractionError> {
    fs::create_dir_all(dest_dir)?;
    let kind = classify(artifact)?;
    debug!(
        "install_artifact: {} classified as {kind:?}",
        artifact.display()
    );
    match kind {
        ArchiveKind::Tar(compression) => {
            extract_tar(artifact, compression, dest_dir, skip_top_level)?;
        }
        ArchiveKind::Zip => extract_zip(artifact, dest_dir, skip_top_level)?,
        ArchiveKind::Opaque => copy_opaque(artifact, dest_dir)?,
    }
    Ok(kind)
}

fn open_tar(path: &Path, compression: Compression) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Compression::Zstd => Box::new(zstd::Decoder::with_buffer(file)?),
    };
    Ok(tar::Archive::new(reader))
}

fn extract_tar(
    path: &Path,
    compression: Compression,
    dest_dir: &Path,
    skip_top_level: bool,
) -> Result<(), ExtractionError> {
    let prefix = if skip_top_level {
        let mut listing = Vec::new();
        for entry in open_tar(path, compression)?.entries()? {
            let entry = entry?;
            let is_dir = entry.header().entry_type().is_dir();
            listing.push((entry.path()?.into_owned(), is_dir));
        }
        common_top_level(&listing)
    } else {
        None
    };

    let mut archive = open_tar(path, compression)?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;
        let Some(relative) = strip_top_level(&entry_path, prefix.as_deref()) else {
            continue;
        };
        let dest_path = dest_dir.join(&relative);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest_path)?;
    }
    Ok(())
}

fn extract_zip(path: &Path, dest_dir: &Path, skip_top_level: bool) -> Result<(), ExtractionError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;

    let prefix = if skip_top_level {
        let listing: Vec<(PathBuf, bool)> = archive
            .file_names()
            .map(|name| (PathBuf::from(name), name.ends_with('/')))
            .collect();
        common_top_level(&listing)
    } else {
        None
    };

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let entry_path = PathBuf::from(file.name());
        validate_entry_path(&entry_path)?;
        let Some(relative) = strip_top_level(&entry_path, prefix.as_deref()) else {
            continue;
        };
        let dest_path = dest_dir.join(&relative);
        if file.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest_path)?;
        io::copy(&mut file, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn copy_opaque(artifact: &Path, dest_dir: &Path) -> Result<(), ExtractionError> {
    let name = artifact
        .file_name()
        .ok_or_else(|| ExtractionError::MissingFileName {
            path: artifact.display().to_string(),
        })?;
    let target = dest_dir.join(name);
    if target.as_path() != artifact {
        fs::copy(artifact, target)?;
    }
    Ok(())
}

/// Return the single leading directory shared by every entry, if any.
///
/// Entries that consist only of the leading segment must be directories;
/// a lone top-level file means there is nothing to collapse.
fn common_top_level(entries: &[(PathBuf, bool)]) -> Option<PathBuf> {
    let mut shared: Option<PathBuf> = None;
    for (path, is_dir) in entries {
        let mut components = normal_components(path);
        let Some(first) = components.next() else {
            continue;
        };
        if components.next().is_none() && !is_dir {
            return None;
        }
        let first = PathBuf::from(first);
        if *shared.get_or_insert_with(|| first.clone()) != first {
            return None;
        }
    }
    shared
}

/// Strip `prefix` from `path`, returning `None` when nothing remains.
fn strip_top_level(path: &Path, prefix: Option<&Path>) -> Option<PathBuf> {
    let mut components = normal_components(path);
    if prefix.is_some() {
        components.next();
    }
    let relative: PathBuf = components.collect();
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn normal_components(path: &Path) -> impl Iterator<Item = &std::ffi::OsStr> {
    path.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part),
        _ => None,
    })
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
