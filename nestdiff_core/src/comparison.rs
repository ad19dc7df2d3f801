use nestdiff_common::{ChangeKind, ChangeRecord, TreeSnapshot};
use serde::Serialize;
use tracing::debug;

/// Classify every path of two snapshots.
///
/// A missing `old` snapshot is treated as empty. Files are compared by
/// size only. Deletions and changes come first in `old` path order,
/// followed by additions in `new` path order; unchanged paths are omitted.
pub fn diff_snapshots(old: Option<&TreeSnapshot>, new: &TreeSnapshot) -> Vec<ChangeRecord> {
    let empty = TreeSnapshot::new();
    let old = old.unwrap_or(&empty);
    let mut changes = Vec::new();

    for path in old.sorted_paths() {
        match (old.get(path), new.get(path)) {
            (_, None) => changes.push(ChangeRecord::new(path, ChangeKind::Deleted)),
            (Some(old_size), Some(new_size)) if old_size != new_size => {
                changes.push(ChangeRecord::new(path, ChangeKind::Changed))
            }
            _ => {}
        }
    }

    for path in new.sorted_paths() {
        if !old.contains(path) {
            changes.push(ChangeRecord::new(path, ChangeKind::Added));
        }
    }

    debug!(
        "{} old / {} new files produced {} changes",
        old.len(),
        new.len(),
        changes.len()
    );
    changes
}

/// Per-kind counts of change records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
}

impl ChangeSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ChangeRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.count(record.kind);
        }
        summary
    }

    pub fn count(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Changed => self.changed += 1,
            ChangeKind::Deleted => self.deleted += 1,
        }
    }

    pub fn merge(&mut self, other: ChangeSummary) {
        self.added += other.added;
        self.changed += other.changed;
        self.deleted += other.deleted;
    }
}
