use nestdiff_common::{Artifact, ArtifactKey, CacheKey, NestDiffError};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// An artifact together with the staging directory reserved for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDir {
    pub artifact: Artifact,
    pub key: ArtifactKey,
    pub path: PathBuf,
}

/// Maps artifacts to deterministic staging directories under one working root.
///
/// File checksums are memoized for the lifetime of the cache, keyed on
/// path, size and modification time. Each key also owns a mutex so that
/// population of one staging directory is serialized.
pub struct StagingCache {
    root: PathBuf,
    keys: RwLock<HashMap<CacheKey, ArtifactKey>>,
    locks: Mutex<HashMap<ArtifactKey, Arc<Mutex<()>>>>,
    checksums_computed: AtomicUsize,
}

impl StagingCache {
    pub fn new(root: PathBuf) -> Result<Self, NestDiffError> {
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            keys: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            checksums_computed: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` to its staging directory. Nothing is created on disk.
    pub fn resolve(&self, path: &Path) -> Result<StagingDir, NestDiffError> {
        let artifact = Artifact::discover(path).map_err(|source| NestDiffError::ArtifactUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let key = self.key_for(&artifact)?;
        let staging_path = self.root.join(key.as_str());

        Ok(StagingDir {
            artifact,
            key,
            path: staging_path,
        })
    }

    /// Compute (or recall) the key of an artifact
    pub fn key_for(&self, artifact: &Artifact) -> Result<ArtifactKey, NestDiffError> {
        let basename = artifact.file_name();

        if artifact.is_dir() {
            let path_string = artifact.path.to_string_lossy();
            return Ok(ArtifactKey::for_directory(
                &basename,
                crc32fast::hash(path_string.as_bytes()),
            ));
        }

        let unreadable = |source| NestDiffError::ArtifactUnreadable {
            path: artifact.path.clone(),
            source,
        };
        let metadata = fs::metadata(&artifact.path).map_err(unreadable)?;
        let cache_key = CacheKey {
            path: artifact.path.clone(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        };

        if let Some(key) = self.cached(&cache_key) {
            debug!("Checksum cache hit for {:?}", artifact.path);
            return Ok(key);
        }

        let checksum = crc32_file(&artifact.path).map_err(unreadable)?;
        self.checksums_computed.fetch_add(1, Ordering::Relaxed);
        let key = ArtifactKey::for_file(&basename, checksum);

        if let Ok(mut keys) = self.keys.write() {
            keys.insert(cache_key, key.clone());
        }

        Ok(key)
    }

    /// Mutex guarding population of the staging directory for `key`
    pub fn key_lock(&self, key: &ArtifactKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Number of file checksums actually computed (cache misses)
    pub fn checksums_computed(&self) -> usize {
        self.checksums_computed.load(Ordering::Relaxed)
    }

    fn cached(&self, cache_key: &CacheKey) -> Option<ArtifactKey> {
        self.keys.read().ok()?.get(cache_key).cloned()
    }
}

fn crc32_file(path: &Path) -> std::io::Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0; 64 * 1024]; // 64KB buffer

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}
