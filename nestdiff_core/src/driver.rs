//! Level-by-level comparison of two artifacts and every container nested inside them.
//!
//! Each level runs resolve, extract, snapshot, diff, classify and render,
//! then recurses into added or changed containers. Recursion is bounded by
//! `max_depth` and by the set of staging-key pairs already compared, so a
//! container that reproduces itself terminates.

use crate::classifier::{is_source_file, FileClassifier};
use crate::comparison::diff_snapshots;
use crate::extract::{is_container, ArchiveExtractor, Backends};
use crate::inspect::BinaryInspector;
use crate::report::{ComparisonReport, Detail, NestedComparison, NestedOutcome, ReportEntry, StagedSide};
use crate::scanner::SnapshotScanner;
use crate::staging::{StagingCache, StagingDir};
use crate::text_diff::{read_preview, TextDiffEngine};
use nestdiff_common::{AliasRule, AppConfig, ArtifactKey, ChangeKind, ChangeRecord, NestDiffError, TreeSnapshot};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type VisitedPairs = HashSet<(Option<ArtifactKey>, ArtifactKey)>;

pub struct RecursionDriver {
    cache: StagingCache,
    extractor: ArchiveExtractor,
    scanner: SnapshotScanner,
    classifier: FileClassifier,
    text_diff: TextDiffEngine,
    inspector: BinaryInspector,
    preview_lines: usize,
    source_preview_lines: usize,
    max_depth: usize,
    old_aliases: Vec<AliasRule>,
}

impl RecursionDriver {
    pub fn new(config: &AppConfig, work_dir: PathBuf) -> Result<Self, NestDiffError> {
        Self::with_backends(config, work_dir, Backends::from_tools(&config.tools))
    }

    pub fn with_backends(
        config: &AppConfig,
        work_dir: PathBuf,
        backends: Backends,
    ) -> Result<Self, NestDiffError> {
        Ok(Self {
            cache: StagingCache::new(work_dir)?,
            extractor: ArchiveExtractor::new(backends),
            scanner: SnapshotScanner::new(config),
            classifier: FileClassifier::new(&config.noise)?,
            text_diff: TextDiffEngine::new(),
            inspector: BinaryInspector::new(config.inspect, config.tools.clone()),
            preview_lines: config.preview_lines,
            source_preview_lines: config.source_preview_lines,
            max_depth: config.max_depth,
            old_aliases: config.old_aliases.clone(),
        })
    }

    pub fn cache(&self) -> &StagingCache {
        &self.cache
    }

    /// Compare `old` against `new`, recursing into nested containers.
    ///
    /// An unreadable `old` falls back to the alias rules and then to an
    /// added-only comparison. Only an unreadable `new` is an error.
    pub fn compare(&self, old: Option<&Path>, new: &Path) -> Result<ComparisonReport, NestDiffError> {
        let (old_staging, new_staging) = self.resolve_pair(old, new)?;
        let mut visited = VisitedPairs::new();
        Ok(self.compare_staged(old_staging.as_ref(), &new_staging, 0, &mut visited))
    }

    /// List everything inside one artifact
    pub fn analyze(&self, artifact: &Path) -> Result<ComparisonReport, NestDiffError> {
        self.compare(None, artifact)
    }

    fn resolve_pair(
        &self,
        old: Option<&Path>,
        new: &Path,
    ) -> Result<(Option<StagingDir>, StagingDir), NestDiffError> {
        let new_staging = self.cache.resolve(new)?;
        let old_staging = old.and_then(|path| self.resolve_old(path));
        Ok((old_staging, new_staging))
    }

    fn resolve_old(&self, path: &Path) -> Option<StagingDir> {
        let err = match self.cache.resolve(path) {
            Ok(staging) => return Some(staging),
            Err(e) => e,
        };
        debug!("Old side unavailable: {}", err);

        for rule in &self.old_aliases {
            let Some(alternate) = rule.apply(path) else {
                continue;
            };
            if let Ok(staging) = self.cache.resolve(&alternate) {
                info!("Using {} in place of {}", alternate.display(), path.display());
                return Some(staging);
            }
        }
        None
    }

    fn compare_staged(
        &self,
        old: Option<&StagingDir>,
        new: &StagingDir,
        depth: usize,
        visited: &mut VisitedPairs,
    ) -> ComparisonReport {
        visited.insert((old.map(|s| s.key.clone()), new.key.clone()));

        let (old_staged, (new_side, new_snapshot)) =
            rayon::join(|| old.map(|staging| self.stage(staging)), || self.stage(new));
        let (old_side, old_snapshot) = match old_staged {
            Some((side, snapshot)) => (Some(side), Some(snapshot)),
            None => (None, None),
        };

        let changes = diff_snapshots(old_snapshot.as_ref(), &new_snapshot);
        let old_root = old.map(|staging| staging.path.as_path());

        let entries = changes
            .iter()
            .map(|record| self.entry_for(record, old_root, &new.path))
            .collect();

        let mut nested = Vec::new();
        for record in changes.iter().filter(|r| r.kind != ChangeKind::Deleted) {
            if !is_container(&record.path) {
                continue;
            }
            let outcome = self.compare_nested(&record.path, old_root, &new.path, depth + 1, visited);
            nested.push(NestedComparison {
                path: record.path.clone(),
                outcome,
            });
        }

        ComparisonReport {
            old: old_side,
            new: new_side,
            entries,
            nested,
        }
    }

    fn compare_nested(
        &self,
        relative: &str,
        old_root: Option<&Path>,
        new_root: &Path,
        depth: usize,
        visited: &mut VisitedPairs,
    ) -> NestedOutcome {
        if depth > self.max_depth {
            warn!("Recursion limit reached at {}", relative);
            return NestedOutcome::DepthLimit;
        }

        let old_path = old_root.map(|root| root.join(relative));
        let (old, new) = match self.resolve_pair(old_path.as_deref(), &new_root.join(relative)) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping nested {}: {}", relative, e);
                return NestedOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let pair = (old.as_ref().map(|s| s.key.clone()), new.key.clone());
        if visited.contains(&pair) {
            debug!("{} already compared as {}", relative, new.key);
            return NestedOutcome::AlreadyCompared;
        }

        let report = self.compare_staged(old.as_ref(), &new, depth, visited);
        NestedOutcome::Compared(Box::new(report))
    }

    /// Populate and snapshot one side, degrading to an empty tree on failure
    fn stage(&self, staging: &StagingDir) -> (StagedSide, TreeSnapshot) {
        let mut side = StagedSide {
            artifact: staging.artifact.path.clone(),
            key: staging.key.clone(),
            staging_dir: staging.path.clone(),
            status: None,
            warning: None,
        };

        match self.extractor.populate(&self.cache, staging) {
            Ok(status) => side.status = Some(status),
            Err(e) => {
                warn!("Could not inspect {}: {}", staging.artifact.path.display(), e);
                side.warning = Some(e.to_string());
                return (side, TreeSnapshot::new());
            }
        }

        match self.scanner.snapshot(&staging.path) {
            Ok(snapshot) => (side, snapshot),
            Err(e) => {
                warn!("Could not scan {}: {}", staging.path.display(), e);
                side.warning = Some(e.to_string());
                (side, TreeSnapshot::new())
            }
        }
    }

    fn entry_for(&self, record: &ChangeRecord, old_root: Option<&Path>, new_root: &Path) -> ReportEntry {
        let noise = self.classifier.is_noise(&record.path);
        let detail = if noise {
            Detail::None
        } else {
            match (record.kind, old_root) {
                (ChangeKind::Added, _) => self.added_detail(&record.path, new_root),
                (ChangeKind::Changed, Some(old_root)) => {
                    self.changed_detail(&record.path, old_root, new_root)
                }
                _ => Detail::None,
            }
        };

        ReportEntry {
            path: record.path.clone(),
            kind: record.kind,
            noise,
            detail,
        }
    }

    fn added_detail(&self, relative: &str, new_root: &Path) -> Detail {
        let file = new_root.join(relative);
        let limit = if is_source_file(relative) {
            self.source_preview_lines
        } else {
            self.preview_lines
        };
        if let Some((lines, truncated)) = read_preview(&file, limit) {
            return Detail::Preview { lines, truncated };
        }

        if self.inspector.applies_to(relative) {
            let lines = self.inspector.inspect(&file);
            if !lines.is_empty() {
                return Detail::Inspection { lines };
            }
        }
        Detail::None
    }

    fn changed_detail(&self, relative: &str, old_root: &Path, new_root: &Path) -> Detail {
        let old_file = old_root.join(relative);
        let new_file = new_root.join(relative);

        let lines = match self.text_diff.compare_files(&old_file, &new_file, relative) {
            Some(lines) => lines,
            None if self.inspector.applies_to(relative) => {
                let old_dump = self.inspector.inspect(&old_file).join("\n");
                let new_dump = self.inspector.inspect(&new_file).join("\n");
                self.text_diff.unified_diff(
                    &old_dump,
                    &new_dump,
                    &format!("old/{}", relative),
                    &format!("new/{}", relative),
                )
            }
            None => Vec::new(),
        };

        if lines.is_empty() {
            Detail::None
        } else {
            Detail::Diff { lines }
        }
    }
}
