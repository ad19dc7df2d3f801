use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Whether an artifact is a plain file or a directory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    File,
    Directory,
}

/// A file or directory handed to the engine for staging
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    /// Inspect `path` on disk. Symlinks are followed.
    pub fn discover(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let kind = if metadata.is_dir() {
            ArtifactKind::Directory
        } else {
            ArtifactKind::File
        };
        Ok(Self {
            kind,
            path: path.to_path_buf(),
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ArtifactKind::Directory
    }

    /// Final path component, lossily converted
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string())
    }
}

/// Deterministic name of a staging directory.
///
/// Files are keyed as `<basename>_<crc32 of contents>`, directories as
/// `<basename>_D_<crc32 of the path string>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn for_file(basename: &str, checksum: u32) -> Self {
        Self(format!("{}_{}", basename, checksum))
    }

    pub fn for_directory(basename: &str, path_checksum: u32) -> Self {
        Self(format!("{}_D_{}", basename, path_checksum))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Memoization key for artifact checksums
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Flat view of a staged tree: relative path (`/`-separated) to byte size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    entries: HashMap<String, u64>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, size: u64) {
        self.entries.insert(path.into(), size);
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths in lexicographic order
    pub fn sorted_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for TreeSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(p, s)| (p.into(), s)).collect(),
        }
    }
}

/// Classification of a path present in at least one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// What `populate` did to a staging directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulateStatus {
    /// Freshly extracted during this call
    Populated,
    /// Directory existed already; extraction skipped
    AlreadyPopulated,
    /// Staging directory is a link to a source directory
    Aliased,
}

/// Program names of the external backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub jadx: String,
    pub jd_cli: String,
    pub nm: String,
    pub objdump: String,
    pub aarch64_objdump: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            jadx: "jadx".to_string(),
            jd_cli: "jd-cli".to_string(),
            nm: "nm".to_string(),
            objdump: "objdump".to_string(),
            aarch64_objdump: "aarch64-linux-gnu-objdump".to_string(),
        }
    }
}

/// Extra knobs for the noise classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Java namespaces owned by the project under comparison; never noise
    pub project_namespaces: Vec<String>,
    /// Additional glob patterns treated as noise
    pub extra_patterns: Vec<String>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            project_namespaces: vec!["com/winlator/".to_string()],
            extra_patterns: Vec::new(),
        }
    }
}

/// Alternate name to try when an "old" artifact cannot be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub from_suffix: String,
    pub to_suffix: String,
}

impl AliasRule {
    pub fn new(from_suffix: &str, to_suffix: &str) -> Self {
        Self {
            from_suffix: from_suffix.to_string(),
            to_suffix: to_suffix.to_string(),
        }
    }

    /// Rewrite `path` if its string form ends with `from_suffix`
    pub fn apply(&self, path: &Path) -> Option<PathBuf> {
        let text = path.to_str()?;
        let stem = text.strip_suffix(self.from_suffix.as_str())?;
        Some(PathBuf::from(format!("{}{}", stem, self.to_suffix)))
    }
}

/// Which external binary inspections to run on native objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOptions {
    #[serde(default)]
    pub nm: bool,
    #[serde(default)]
    pub objdump: bool,
    #[serde(default)]
    pub disassemble: bool,
}

impl InspectOptions {
    pub fn any(&self) -> bool {
        self.nm || self.objdump || self.disassemble
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Staging root; one subdirectory per artifact key
    pub working_dir: Option<PathBuf>,

    /// Preview allowance for added text files
    pub preview_lines: usize,

    /// Preview allowance for added source files
    pub source_preview_lines: usize,

    /// Maximum nesting depth of container recursion
    pub max_depth: usize,

    /// Gitignore-style patterns dropped from snapshots
    pub ignore_patterns: Vec<String>,

    pub noise: NoiseConfig,

    pub tools: ToolConfig,

    pub old_aliases: Vec<AliasRule>,

    pub inspect: InspectOptions,

    /// Enable portable mode (config alongside binary)
    pub portable_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            preview_lines: 20,
            source_preview_lines: 5000,
            max_depth: 8,
            ignore_patterns: Vec::new(),
            noise: NoiseConfig::default(),
            tools: ToolConfig::default(),
            old_aliases: vec![
                AliasRule::new("rootfs.txz", "imagefs.txz"),
                AliasRule::new("rootfs_patches.tzst", "imagefs_patches.tzst"),
            ],
            inspect: InspectOptions::default(),
            portable_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_format() {
        assert_eq!(ArtifactKey::for_file("app.apk", 42).as_str(), "app.apk_42");
        assert_eq!(ArtifactKey::for_directory("tree", 7).to_string(), "tree_D_7");
    }

    #[test]
    fn test_alias_rule_apply() {
        let rule = AliasRule::new("rootfs.txz", "imagefs.txz");
        assert_eq!(
            rule.apply(Path::new("/w/app_1/assets/rootfs.txz")),
            Some(PathBuf::from("/w/app_1/assets/imagefs.txz"))
        );
        assert_eq!(rule.apply(Path::new("/w/app_1/assets/other.txz")), None);
    }

    #[test]
    fn test_snapshot_sorted_paths() {
        let snapshot: TreeSnapshot = [("b.txt", 1), ("a/z.txt", 2), ("a.txt", 3)]
            .into_iter()
            .collect();
        assert_eq!(snapshot.sorted_paths(), vec!["a.txt", "a/z.txt", "b.txt"]);
        assert_eq!(snapshot.get("a/z.txt"), Some(2));
        assert!(!snapshot.contains("c.txt"));
    }

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.old_aliases.len(), 2);
    }

    #[test]
    fn test_config_partial_toml() {
        let config: AppConfig = toml::from_str(
            "preview_lines = 3\n[tools]\njadx = \"/opt/jadx/bin/jadx\"\n",
        )
        .unwrap();
        assert_eq!(config.preview_lines, 3);
        assert_eq!(config.source_preview_lines, 5000);
        assert_eq!(config.tools.jadx, "/opt/jadx/bin/jadx");
        assert_eq!(config.tools.nm, "nm");
    }
}
