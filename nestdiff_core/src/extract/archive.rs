use super::ExtractionBackend;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use nestdiff_common::NestDiffError;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};
use xz2::read::XzDecoder;
use zip::ZipArchive;

fn extraction_error(tool: &str, artifact: &Path, reason: impl ToString) -> NestDiffError {
    NestDiffError::Extraction {
        tool: tool.to_string(),
        artifact: artifact.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// In-process ZIP extraction
pub struct ZipBackend;

impl ExtractionBackend for ZipBackend {
    fn name(&self) -> &str {
        "zip"
    }

    fn extract(&self, artifact: &Path, dest: &Path) -> Result<(), NestDiffError> {
        let file = File::open(artifact)?;
        let mut archive = ZipArchive::new(file).map_err(|e| extraction_error("zip", artifact, e))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| extraction_error("zip", artifact, e))?;

            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!("Skipping zip entry escaping the archive root: {}", entry.name());
                continue;
            };
            let target = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }

        debug!("Unpacked {} zip entries from {}", archive.len(), artifact.display());
        Ok(())
    }
}

/// Compression wrapped around a tarball, detected from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl TarCompression {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tzst") || name.ends_with(".tar.zst") {
            TarCompression::Zstd
        } else if name.ends_with(".txz") || name.ends_with(".tar.xz") {
            TarCompression::Xz
        } else if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            TarCompression::Gzip
        } else if name.ends_with(".tbz2") || name.ends_with(".tbz") || name.ends_with(".tar.bz2") {
            TarCompression::Bzip2
        } else {
            TarCompression::None
        }
    }
}

/// In-process extraction of plain and compressed tarballs.
///
/// Entries that cannot be unpacked (device nodes, dangling hard links)
/// are skipped with a warning instead of failing the whole archive.
pub struct TarBackend;

impl TarBackend {
    fn open_reader(artifact: &Path) -> Result<Box<dyn Read>, NestDiffError> {
        let file = File::open(artifact)?;
        let reader: Box<dyn Read> = match TarCompression::detect(artifact) {
            TarCompression::None => Box::new(file),
            TarCompression::Gzip => Box::new(GzDecoder::new(file)),
            TarCompression::Bzip2 => Box::new(BzDecoder::new(file)),
            TarCompression::Xz => Box::new(XzDecoder::new(file)),
            TarCompression::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
        };
        Ok(reader)
    }
}

impl ExtractionBackend for TarBackend {
    fn name(&self) -> &str {
        "tar"
    }

    fn extract(&self, artifact: &Path, dest: &Path) -> Result<(), NestDiffError> {
        let mut archive = tar::Archive::new(Self::open_reader(artifact)?);
        let mut unpacked = 0usize;
        let mut skipped = 0usize;

        for entry in archive.entries().map_err(|e| extraction_error("tar", artifact, e))? {
            let mut entry = entry.map_err(|e| extraction_error("tar", artifact, e))?;
            match entry.unpack_in(dest) {
                Ok(true) => unpacked += 1,
                Ok(false) => {
                    skipped += 1;
                    debug!("Refused tar entry outside destination: {:?}", entry.path().ok());
                }
                Err(e) => {
                    skipped += 1;
                    debug!("Failed to unpack tar entry {:?}: {}", entry.path().ok(), e);
                }
            }
        }

        if unpacked == 0 && skipped == 0 {
            return Err(extraction_error("tar", artifact, "archive contains no entries"));
        }
        if skipped > 0 {
            warn!("Skipped {} of {} entries in {}", skipped, unpacked + skipped, artifact.display());
        }
        Ok(())
    }
}
