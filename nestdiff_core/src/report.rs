//! Structured comparison results and their line-oriented text rendering.

use crate::comparison::ChangeSummary;
use nestdiff_common::{ArtifactKey, ChangeKind, PopulateStatus};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

const DETAIL_INDENT: &str = "    ";

/// One side of a comparison after staging
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedSide {
    /// Artifact actually staged (after alias fallback)
    pub artifact: PathBuf,
    pub key: ArtifactKey,
    pub staging_dir: PathBuf,
    /// `None` when the staging directory could not be populated
    pub status: Option<PopulateStatus>,
    /// Why this side degraded to an empty tree, if it did
    pub warning: Option<String>,
}

/// Content rendered under a change line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Detail {
    None,
    /// Head of an added text file
    Preview { lines: Vec<String>, truncated: bool },
    /// Unified diff of a changed text file, or of the inspections of a changed binary
    Diff { lines: Vec<String> },
    /// Tool output for an added binary
    Inspection { lines: Vec<String> },
}

impl Detail {
    pub fn is_none(&self) -> bool {
        matches!(self, Detail::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub path: String,
    pub kind: ChangeKind,
    pub noise: bool,
    pub detail: Detail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NestedOutcome {
    Compared(Box<ComparisonReport>),
    DepthLimit,
    AlreadyCompared,
    Failed { reason: String },
}

/// A container inside the current level that was (or was not) compared recursively
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedComparison {
    pub path: String,
    pub outcome: NestedOutcome,
}

/// Result of comparing one artifact pair, including every nested level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    /// `None` when there was no old artifact to compare against
    pub old: Option<StagedSide>,
    pub new: StagedSide,
    pub entries: Vec<ReportEntry>,
    pub nested: Vec<NestedComparison>,
}

impl ComparisonReport {
    /// Change counts of this level and all nested levels
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for entry in &self.entries {
            summary.count(entry.kind);
        }
        for nested in &self.nested {
            if let NestedOutcome::Compared(report) = &nested.outcome {
                summary.merge(report.summary());
            }
        }
        summary
    }

    pub fn nested_reports(&self) -> impl Iterator<Item = (&str, &ComparisonReport)> {
        self.nested.iter().filter_map(|nested| match &nested.outcome {
            NestedOutcome::Compared(report) => Some((nested.path.as_str(), report.as_ref())),
            _ => None,
        })
    }

    /// Look up the entry for `path` at this level
    pub fn entry(&self, path: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

/// Write the human-readable report
pub fn render_text<W: Write>(report: &ComparisonReport, out: &mut W) -> io::Result<()> {
    let old_artifact = report
        .old
        .as_ref()
        .map(|side| side.artifact.display().to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let old_staging = report
        .old
        .as_ref()
        .map(|side| side.staging_dir.display().to_string())
        .unwrap_or_else(|| "N/A".to_string());

    writeln!(
        out,
        "# Processing files: {} vs {}",
        old_artifact,
        report.new.artifact.display()
    )?;
    writeln!(
        out,
        "  Staging directories: {} vs {}",
        old_staging,
        report.new.staging_dir.display()
    )?;

    for side in report.old.iter().chain(std::iter::once(&report.new)) {
        if let Some(warning) = &side.warning {
            writeln!(
                out,
                "  Warning: could not inspect {}: {}",
                side.artifact.display(),
                warning
            )?;
        }
    }

    if report.entries.is_empty() {
        if report.old.is_none() {
            writeln!(out, "{}No files found", DETAIL_INDENT)?;
        } else {
            writeln!(out, "{}No changes found", DETAIL_INDENT)?;
        }
    }

    for entry in &report.entries {
        match entry.kind {
            ChangeKind::Changed => writeln!(out, "  ~ {}: changed", entry.path)?,
            ChangeKind::Added => writeln!(out, "  + {}", entry.path)?,
            ChangeKind::Deleted => writeln!(out, "  - {}: deleted", entry.path)?,
        }
        render_detail(&entry.detail, out)?;
    }

    for nested in &report.nested {
        writeln!(out, "  Processing file: {}", nested.path)?;
        match &nested.outcome {
            NestedOutcome::Compared(inner) => render_text(inner, out)?,
            NestedOutcome::DepthLimit => writeln!(out, "{}recursion limit reached", DETAIL_INDENT)?,
            NestedOutcome::AlreadyCompared => {
                writeln!(out, "{}already compared above", DETAIL_INDENT)?
            }
            NestedOutcome::Failed { reason } => {
                writeln!(out, "{}could not inspect: {}", DETAIL_INDENT, reason)?
            }
        }
    }

    Ok(())
}

fn render_detail<W: Write>(detail: &Detail, out: &mut W) -> io::Result<()> {
    let lines = match detail {
        Detail::None => return Ok(()),
        Detail::Preview { lines, .. } | Detail::Diff { lines } | Detail::Inspection { lines } => lines,
    };
    for line in lines {
        writeln!(out, "{}{}", DETAIL_INDENT, line.trim_end())?;
    }
    if let Detail::Preview { truncated: true, .. } = detail {
        writeln!(out, "{}...", DETAIL_INDENT)?;
    }
    Ok(())
}
