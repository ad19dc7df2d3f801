pub mod staging;
pub mod extract;
pub mod scanner;
pub mod comparison;
pub mod classifier;
pub mod text_diff;
pub mod inspect;
pub mod report;
pub mod driver;

pub use staging::{StagingCache, StagingDir};
pub use extract::{is_container, ArchiveExtractor, Backends, ExtractionBackend};
pub use scanner::SnapshotScanner;
pub use comparison::{diff_snapshots, ChangeSummary};
pub use classifier::{is_source_file, FileClassifier};
pub use text_diff::{looks_like_text, read_preview, read_text, TextDiffEngine};
pub use inspect::{is_native_object, BinaryInspector};
pub use report::{
    render_text, ComparisonReport, Detail, NestedComparison, NestedOutcome, ReportEntry, StagedSide,
};
pub use driver::RecursionDriver;
