//! Zip and gzip-tar staging archives.
//!
//! Both directions run the blocking codecs under `spawn_blocking`. Packing
//! writes through a [`SyncIoBridge`] into the channel writer as entries are
//! discovered, so the archive is never held in memory.

use crate::differ::{DiffEntry, changed_since};
use dfk_common::{ArchiveFormat, ByteWriter};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::io::SyncIoBridge;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn join_error(e: tokio::task::JoinError) -> io::Error {
    io::Error::other(format!("archive worker failed: {}", e))
}

/// Unpack a complete in-memory archive into `dest`.
pub async fn extract(format: ArchiveFormat, data: Vec<u8>, dest: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || extract_blocking(format, &data, &dest))
        .await
        .map_err(join_error)?
}

fn extract_blocking(format: ArchiveFormat, data: &[u8], dest: &Path) -> io::Result<()> {
    match format {
        ArchiveFormat::Zip => {
            let mut archive = ZipArchive::new(Cursor::new(data)).map_err(io::Error::other)?;
            debug!("Extracting {} zip entries into {}", archive.len(), dest.display());
            archive.extract(dest).map_err(io::Error::other)
        }
        ArchiveFormat::TarGz => {
            debug!("Extracting gzip tarball into {}", dest.display());
            tar::Archive::new(GzDecoder::new(data)).unpack(dest)
        }
    }
}

/// Stream every file under `root` modified at or after `since` into
/// `writer`, paths relative to the root's contents. Returns the number of
/// entries written.
pub async fn pack(
    format: ArchiveFormat,
    root: PathBuf,
    since: SystemTime,
    writer: ByteWriter,
) -> io::Result<usize> {
    let mut bridge = SyncIoBridge::new(writer);
    tokio::task::spawn_blocking(move || -> io::Result<usize> {
        let entries = changed_since(&root, since)?;
        let count = match format {
            ArchiveFormat::TarGz => write_tgz(entries, &mut bridge)?,
            ArchiveFormat::Zip => write_zip(entries, &mut bridge)?,
        };
        bridge.flush()?;
        bridge.shutdown()?;
        Ok(count)
    })
    .await
    .map_err(join_error)?
}

fn write_tgz<I, W>(entries: I, out: W) -> io::Result<usize>
where
    I: Iterator<Item = io::Result<DiffEntry>>,
    W: Write,
{
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));
    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        builder.append_path_with_name(&entry.path, &entry.relative)?;
        count += 1;
    }
    builder.into_inner()?.finish()?;
    Ok(count)
}

fn write_zip<I, W>(entries: I, out: W) -> io::Result<usize>
where
    I: Iterator<Item = io::Result<DiffEntry>>,
    W: Write,
{
    let mut zip = ZipWriter::new_stream(out);
    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        let options = file_options(&entry.path)?;
        zip.start_file(entry.relative.as_str(), options)
            .map_err(io::Error::other)?;
        io::copy(&mut File::open(&entry.path)?, &mut zip)?;
        count += 1;
    }
    zip.finish().map_err(io::Error::other)?;
    Ok(count)
}

#[cfg(unix)]
fn file_options(path: &Path) -> io::Result<SimpleFileOptions> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode))
}

#[cfg(not(unix))]
fn file_options(_path: &Path) -> io::Result<SimpleFileOptions> {
    Ok(SimpleFileOptions::default().compression_method(CompressionMethod::Deflated))
}
