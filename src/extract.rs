//! Archive extraction dispatched on file extension.
//!
//! Supported inputs: `.zip`, `.tar.gz`/`.tgz`, `.tar.bz2`, plain `.tar`, and
//! anything else treated as a single raw executable copied verbatim. Callers
//! only invoke extraction when the destination does not exist yet; the cache
//! contract lives one level up in the verification loop.
//!
//! Entry paths are never trusted: an absolute member path or one that walks
//! out of the destination via `..` is rejected even though registry archives
//! are nominally curated.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry escapes destination: {0}")]
    UnsafePath(PathBuf),
    #[error("archive has no usable file name: {0}")]
    BadArchiveName(PathBuf),
}

/// How an archive file will be unpacked, keyed purely on its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarBz2,
    Tar,
    RawFile,
}

pub fn detect_format(file_name: &str) -> ArchiveFormat {
    if file_name.ends_with(".zip") {
        ArchiveFormat::Zip
    } else if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        ArchiveFormat::TarGz
    } else if file_name.ends_with(".tar.bz2") {
        ArchiveFormat::TarBz2
    } else if file_name.ends_with(".tar") {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::RawFile
    }
}

/// Extract `archive` into `dest`, creating `dest` as needed.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    std::fs::create_dir_all(dest)?;

    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ExtractError::BadArchiveName(archive.to_path_buf()))?;

    match detect_format(&file_name) {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => {
            extract_tar(flate2::read::GzDecoder::new(File::open(archive)?), dest)
        }
        ArchiveFormat::TarBz2 => {
            extract_tar(bzip2::read::BzDecoder::new(File::open(archive)?), dest)
        }
        ArchiveFormat::Tar => extract_tar(File::open(archive)?, dest),
        ArchiveFormat::RawFile => {
            // Raw single-file distribution: copy by name, no unpacking.
            std::fs::copy(archive, dest.join(&file_name))?;
            Ok(())
        }
    }
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        ensure_contained(&path)?;
        entry.unpack_in(dest)?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let raw_name = PathBuf::from(entry.name());
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::UnsafePath(raw_name));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

fn ensure_contained(path: &Path) -> Result<(), ExtractError> {
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(ExtractError::UnsafePath(path.to_path_buf()));
            }
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(ExtractError::UnsafePath(path.to_path_buf()));
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
        }
    }
    Ok(())
}
