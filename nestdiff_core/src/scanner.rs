use crate::extract::PATH_TOKEN_FILE;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::{Parallelism, WalkDir};
use nestdiff_common::{AppConfig, NestDiffError, TreeSnapshot};
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::{debug, warn};

/// Directory names holding version-control metadata
const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Builds [`TreeSnapshot`]s of staging directories using jwalk
pub struct SnapshotScanner {
    custom_ignore: Option<Gitignore>,
    parallelism: Parallelism,
}

impl SnapshotScanner {
    /// Scanner walking on a pool of its own, never on the caller's rayon pool.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parallelism(config, Self::dedicated_pool())
    }

    pub fn with_parallelism(config: &AppConfig, parallelism: Parallelism) -> Self {
        Self {
            custom_ignore: Self::build_custom_ignore(&config.ignore_patterns),
            parallelism,
        }
    }

    fn dedicated_pool() -> Parallelism {
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("nestdiff-walk-{}", i))
            .build();
        match pool {
            Ok(pool) => Parallelism::RayonExistingPool {
                pool: Arc::new(pool),
                busy_timeout: None,
            },
            Err(e) => {
                warn!("Could not start walk thread pool, walking serially: {}", e);
                Parallelism::Serial
            }
        }
    }

    /// Build a Gitignore from custom ignore patterns in config
    fn build_custom_ignore(patterns: &[String]) -> Option<Gitignore> {
        if patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            if let Err(err) = builder.add_line(None, pattern) {
                debug!("Failed to add ignore pattern '{}': {}", pattern, err);
            }
        }

        match builder.build() {
            Ok(ignore) => Some(ignore),
            Err(e) => {
                debug!("Failed to build custom ignore: {}", e);
                None
            }
        }
    }

    /// Walk `dir` recursively, recording every regular file with its size.
    ///
    /// Symlinks, special files, version-control metadata and the staging
    /// provenance sentinel are left out. A symlinked root is followed.
    pub fn snapshot(&self, dir: &Path) -> Result<TreeSnapshot, NestDiffError> {
        let root = fs::canonicalize(dir)?;
        let mut snapshot = TreeSnapshot::new();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .skip_hidden(false)
            .parallelism(self.parallelism.clone());

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                // A failure at the root means nothing was walked at all
                Err(e) if e.is_busy() || e.depth() == 0 => {
                    return Err(NestDiffError::Walk(format!("{}: {}", root.display(), e)));
                }
                Err(e) => {
                    debug!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative_path = path
                .strip_prefix(&root)
                .map_err(|e| NestDiffError::Path(e.to_string()))?;

            if relative_path == Path::new(PATH_TOKEN_FILE) || is_vcs_path(relative_path) {
                continue;
            }
            if self.should_ignore_with_parents(relative_path) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!("Skipping {:?}: {}", relative_path, e);
                    continue;
                }
            };

            snapshot.insert(canonical_path(relative_path), size);
        }

        debug!("Snapshot of {:?}: {} files", dir, snapshot.len());
        Ok(snapshot)
    }

    /// Check if a path or any of its parent directories should be ignored
    fn should_ignore_with_parents(&self, path: &Path) -> bool {
        let Some(ref custom_ignore) = self.custom_ignore else {
            return false;
        };

        if custom_ignore.matched(path, false).is_ignore() {
            return true;
        }

        let mut current = path;
        while let Some(parent) = current.parent() {
            if !parent.as_os_str().is_empty() && custom_ignore.matched(parent, true).is_ignore() {
                return true;
            }
            current = parent;
        }
        false
    }
}

fn is_vcs_path(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => VCS_DIRS.iter().any(|vcs| name == *vcs),
        _ => false,
    })
}

/// `/`-joined form of a relative path, independent of the platform separator
fn canonical_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner() -> SnapshotScanner {
        SnapshotScanner::new(&AppConfig::default())
    }

    #[test]
    fn test_snapshot_sizes_and_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir_all(temp.path().join("lib/arm64")).unwrap();
        fs::write(temp.path().join("lib/arm64/libx.so"), b"elf").unwrap();
        fs::create_dir(temp.path().join("empty")).unwrap();

        let snapshot = scanner().snapshot(temp.path()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a.txt"), Some(10));
        assert_eq!(snapshot.get("lib/arm64/libx.so"), Some(3));
    }

    #[test]
    fn test_snapshot_skips_vcs_and_sentinel() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git/objects")).unwrap();
        fs::write(temp.path().join(".git/objects/ab"), b"blob").unwrap();
        fs::write(temp.path().join(PATH_TOKEN_FILE), b"/src/app.apk").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub").join(PATH_TOKEN_FILE), b"kept").unwrap();
        fs::write(temp.path().join(".hidden"), b"kept").unwrap();

        let snapshot = scanner().snapshot(temp.path()).unwrap();

        assert_eq!(snapshot.sorted_paths(), vec![".hidden", "sub/__path__.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_skips_symlinks_but_follows_root() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        fs::create_dir(&tree).unwrap();
        fs::write(tree.join("real.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(tree.join("real.txt"), tree.join("link.txt")).unwrap();

        let alias = temp.path().join("alias");
        std::os::unix::fs::symlink(&tree, &alias).unwrap();

        let snapshot = scanner().snapshot(&alias).unwrap();
        assert_eq!(snapshot.sorted_paths(), vec!["real.txt"]);
    }

    #[test]
    fn test_snapshot_ignore_patterns() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("keep.txt"), b"k").unwrap();
        fs::write(temp.path().join("drop.log"), b"d").unwrap();
        fs::create_dir(temp.path().join("build")).unwrap();
        fs::write(temp.path().join("build/out.txt"), b"o").unwrap();

        let mut config = AppConfig::default();
        config.ignore_patterns = vec!["*.log".to_string(), "build/".to_string()];
        let snapshot = SnapshotScanner::new(&config).snapshot(temp.path()).unwrap();

        assert_eq!(snapshot.sorted_paths(), vec!["keep.txt"]);
    }

    #[test]
    fn test_snapshot_inside_single_thread_pool() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("a/b/deep.txt"), b"deep").unwrap();
        fs::write(temp.path().join("top.txt"), b"top").unwrap();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let snapshot = pool.install(|| scanner().snapshot(temp.path())).unwrap();

        assert_eq!(snapshot.sorted_paths(), vec!["a/b/deep.txt", "top.txt"]);
    }

    #[test]
    fn test_busy_walk_is_error_not_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"a").unwrap();

        let shared = SnapshotScanner::with_parallelism(
            &AppConfig::default(),
            Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(50),
            },
        );
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let result = pool.install(|| shared.snapshot(temp.path()));

        assert!(matches!(result, Err(NestDiffError::Walk(_))));
    }

    #[test]
    fn test_snapshot_missing_dir_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(scanner().snapshot(&temp.path().join("missing")).is_err());
    }
}
