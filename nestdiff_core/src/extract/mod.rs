//! Populating staging directories from containers.
//!
//! Dispatch order: directories are aliased, `.apk` goes to the package
//! decompiler, `.zip` is unpacked (collapsing a single wrapping root),
//! `.jar` goes to the bytecode decompiler and everything else is treated
//! as a tarball.

pub mod archive;
pub mod command;

use crate::staging::{StagingCache, StagingDir};
use nestdiff_common::{NestDiffError, PopulateStatus, ToolConfig};
use std::fs;
use std::path::Path;
use std::sync::PoisonError;
use tracing::{debug, info};

pub use archive::{TarBackend, TarCompression, ZipBackend};
pub use command::CommandBackend;

/// Provenance sentinel written into every extracted staging directory
pub const PATH_TOKEN_FILE: &str = "__path__.txt";

/// Extensions whose files are fed back into the comparison
pub const CONTAINER_EXTENSIONS: &[&str] = &[".tzst", ".txz", ".apk", ".zip", ".jar"];

/// Whether a changed or added path must be compared recursively
pub fn is_container(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    CONTAINER_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Something able to unpack one kind of artifact into a directory
pub trait ExtractionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Populate `dest` (an existing, empty directory) from `artifact`
    fn extract(&self, artifact: &Path, dest: &Path) -> Result<(), NestDiffError>;
}

/// Which backend handles an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRoute {
    Alias,
    Decompile,
    Unzip,
    DecompileJar,
    Untar,
}

impl ExtractionRoute {
    pub fn for_artifact(path: &Path, is_dir: bool) -> Self {
        if is_dir {
            return ExtractionRoute::Alias;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".apk") {
            ExtractionRoute::Decompile
        } else if name.ends_with(".zip") {
            ExtractionRoute::Unzip
        } else if name.ends_with(".jar") {
            ExtractionRoute::DecompileJar
        } else {
            ExtractionRoute::Untar
        }
    }
}

/// Backend table used by [`ArchiveExtractor`]
pub struct Backends {
    pub apk: Box<dyn ExtractionBackend>,
    pub zip: Box<dyn ExtractionBackend>,
    pub jar: Box<dyn ExtractionBackend>,
    pub tar: Box<dyn ExtractionBackend>,
}

impl Backends {
    pub fn from_tools(tools: &ToolConfig) -> Self {
        Self {
            apk: Box::new(CommandBackend::jadx(&tools.jadx)),
            zip: Box::new(ZipBackend),
            jar: Box::new(CommandBackend::jd_cli(&tools.jd_cli)),
            tar: Box::new(TarBackend),
        }
    }
}

pub struct ArchiveExtractor {
    backends: Backends,
}

impl ArchiveExtractor {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Populate the staging directory of `staging` exactly once.
    ///
    /// An existing staging directory is never touched again. Extraction
    /// happens in a temporary sibling that is renamed into place, so a
    /// failed extraction leaves nothing behind.
    pub fn populate(
        &self,
        cache: &StagingCache,
        staging: &StagingDir,
    ) -> Result<PopulateStatus, NestDiffError> {
        let lock = cache.key_lock(&staging.key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if fs::symlink_metadata(&staging.path).is_ok() {
            debug!("Staging directory {} already populated", staging.key);
            return Ok(PopulateStatus::AlreadyPopulated);
        }

        let artifact = &staging.artifact;
        let route = ExtractionRoute::for_artifact(&artifact.path, artifact.is_dir());
        let backend = match route {
            ExtractionRoute::Alias => {
                link_directory(&artifact.path, &staging.path)?;
                info!("Linked {} -> {}", staging.path.display(), artifact.path.display());
                return Ok(PopulateStatus::Aliased);
            }
            ExtractionRoute::Decompile => &self.backends.apk,
            ExtractionRoute::Unzip => &self.backends.zip,
            ExtractionRoute::DecompileJar => &self.backends.jar,
            ExtractionRoute::Untar => &self.backends.tar,
        };

        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", staging.key))
            .suffix(".partial")
            .tempdir_in(cache.root())?;

        info!(
            "Extracting {} with {} into {}",
            artifact.path.display(),
            backend.name(),
            staging.key
        );
        backend.extract(&artifact.path, partial.path())?;

        if route == ExtractionRoute::Unzip && flatten_single_root(partial.path())? {
            debug!("Collapsed single wrapping directory of {}", artifact.path.display());
        }
        fs::write(
            partial.path().join(PATH_TOKEN_FILE),
            artifact.path.to_string_lossy().as_bytes(),
        )?;

        // After a successful rename the temp guard points at nothing and its drop is a no-op.
        match fs::rename(partial.path(), &staging.path) {
            Ok(()) => Ok(PopulateStatus::Populated),
            Err(_) if staging.path.exists() => {
                debug!("Staging directory {} was populated concurrently", staging.key);
                Ok(PopulateStatus::AlreadyPopulated)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Move the contents of a lone top-level directory up into `dir`.
///
/// Returns whether anything was moved.
pub fn flatten_single_root(dir: &Path) -> Result<bool, NestDiffError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(false);
    }

    // Renamed first so a child with the same name as the wrapper cannot collide
    let wrapper = dir.join(".nestdiff-flatten");
    fs::rename(entries.remove(0).path(), &wrapper)?;
    for child in fs::read_dir(&wrapper)? {
        let child = child?;
        fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    fs::remove_dir(&wrapper)?;

    Ok(true)
}

#[cfg(unix)]
fn link_directory(source: &Path, link: &Path) -> Result<(), NestDiffError> {
    std::os::unix::fs::symlink(source, link)?;
    Ok(())
}

#[cfg(windows)]
fn link_directory(source: &Path, link: &Path) -> Result<(), NestDiffError> {
    std::os::windows::fs::symlink_dir(source, link)?;
    Ok(())
}
