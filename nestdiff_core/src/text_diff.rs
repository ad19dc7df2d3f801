use similar::TextDiff;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Bytes inspected before a file is trusted to be text
const SNIFF_LEN: u64 = 8 * 1024;

/// Whether the head of a file decodes as UTF-8 without NUL bytes
pub fn looks_like_text(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    if file.take(SNIFF_LEN).read_to_end(&mut head).is_err() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(&head) {
        Ok(_) => true,
        // multi-byte character cut at the end of the window
        Err(e) => e.error_len().is_none(),
    }
}

/// Read a whole file as UTF-8 text.
///
/// Returns `None` for anything that cannot be read as text; callers treat
/// that as binary content. Binary files are rejected from their head alone.
pub fn read_text(path: &Path) -> Option<String> {
    if !looks_like_text(path) {
        return None;
    }
    fs::read_to_string(path).ok()
}

/// The first `limit` lines of a text file, and whether more follow.
///
/// Reads no further than line `limit + 1`. Invalid UTF-8 within that
/// range means the file is binary.
pub fn read_preview(path: &Path, limit: usize) -> Option<(Vec<String>, bool)> {
    if !looks_like_text(path) {
        return None;
    }
    let reader = BufReader::new(File::open(path).ok()?);

    let mut lines = Vec::new();
    for line in reader.lines().take(limit.saturating_add(1)) {
        lines.push(line.ok()?);
    }
    let truncated = lines.len() > limit;
    lines.truncate(limit);
    Some((lines, truncated))
}

/// Configuration for text comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextDiffConfig {
    /// Unchanged lines shown around each hunk
    pub context_radius: usize,
    /// Normalize line endings (CRLF vs LF)
    pub normalize_line_endings: bool,
}

impl Default for TextDiffConfig {
    fn default() -> Self {
        Self {
            context_radius: 3,
            normalize_line_endings: true,
        }
    }
}

/// Renders line-oriented unified diffs
#[derive(Debug, Clone, Default)]
pub struct TextDiffEngine {
    config: TextDiffConfig,
}

impl TextDiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TextDiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TextDiffConfig {
        &self.config
    }

    fn preprocess_text(&self, text: &str) -> String {
        if self.config.normalize_line_endings {
            text.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            text.to_string()
        }
    }

    /// Unified diff of two texts, one output line per element, without
    /// trailing newlines. Identical inputs give an empty vector.
    pub fn unified_diff(&self, old: &str, new: &str, old_label: &str, new_label: &str) -> Vec<String> {
        let old = self.preprocess_text(old);
        let new = self.preprocess_text(new);
        if old == new {
            return Vec::new();
        }

        let diff = TextDiff::from_lines(&old, &new);
        let rendered = diff
            .unified_diff()
            .context_radius(self.config.context_radius)
            .header(old_label, new_label)
            .to_string();

        rendered.lines().map(str::to_string).collect()
    }

    /// Unified diff of two files, or `None` when either side is not text
    pub fn compare_files(&self, old_path: &Path, new_path: &Path, label: &str) -> Option<Vec<String>> {
        let old = read_text(old_path)?;
        let new = read_text(new_path)?;
        Some(self.unified_diff(
            &old,
            &new,
            &format!("old/{}", label),
            &format!("new/{}", label),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unified_diff_lines() {
        let engine = TextDiffEngine::new();
        let lines = engine.unified_diff(
            "line1\nline2\nline3\n",
            "line1\nline2_modified\nline3\n",
            "old/a.txt",
            "new/a.txt",
        );

        assert_eq!(lines[0], "--- old/a.txt");
        assert_eq!(lines[1], "+++ new/a.txt");
        assert!(lines.iter().any(|l| l.starts_with("@@")));
        assert!(lines.contains(&"-line2".to_string()));
        assert!(lines.contains(&"+line2_modified".to_string()));
        assert!(lines.iter().all(|l| !l.ends_with('\n')));
    }

    #[test]
    fn test_line_endings_are_normalized() {
        let engine = TextDiffEngine::new();
        assert!(engine.unified_diff("a\r\nb\r\n", "a\nb\n", "x", "y").is_empty());

        let strict = TextDiffEngine::with_config(TextDiffConfig {
            normalize_line_endings: false,
            ..TextDiffConfig::default()
        });
        assert!(!strict.unified_diff("a\r\nb\r\n", "a\nb\n", "x", "y").is_empty());
    }

    #[test]
    fn test_compare_files_binary_side() {
        let temp = TempDir::new().unwrap();
        let text = temp.path().join("a.txt");
        let binary = temp.path().join("b.bin");
        fs::write(&text, b"hello\n").unwrap();
        fs::write(&binary, [0xffu8, 0xfe, 0x00, 0x81]).unwrap();

        let engine = TextDiffEngine::new();
        assert!(engine.compare_files(&text, &binary, "a.txt").is_none());
        assert!(read_text(&binary).is_none());
        assert_eq!(read_text(&text).as_deref(), Some("hello\n"));
    }

    #[test]
    fn test_preview_is_bounded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mixed.log");
        let mut content = "line\n".repeat(4000).into_bytes();
        content.extend_from_slice(&[0xff; 64]);
        fs::write(&path, &content).unwrap();

        let (lines, truncated) = read_preview(&path, 3).unwrap();
        assert_eq!(lines, vec!["line", "line", "line"]);
        assert!(truncated);
        // the full read hits the invalid tail
        assert!(read_text(&path).is_none());
    }

    #[test]
    fn test_preview_of_short_and_binary_files() {
        let temp = TempDir::new().unwrap();
        let short = temp.path().join("short.txt");
        let binary = temp.path().join("lib.so");
        fs::write(&short, b"a\r\nb\n").unwrap();
        fs::write(&binary, b"\x7fELF\x02\x01\x01\x00\x00rest").unwrap();

        assert_eq!(
            read_preview(&short, 5),
            Some((vec!["a".to_string(), "b".to_string()], false))
        );
        assert_eq!(read_preview(&short, 2).map(|(_, t)| t), Some(false));
        assert!(read_preview(&binary, 5).is_none());
        assert!(!looks_like_text(&binary));
        assert!(read_text(&binary).is_none());
    }

    #[test]
    fn test_sniff_tolerates_split_character() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("utf8.txt");
        // 'é' is two bytes; place it across the sniff boundary
        let mut content = vec![b'x'; SNIFF_LEN as usize - 1];
        content.extend_from_slice("é\n".as_bytes());
        fs::write(&path, &content).unwrap();

        assert!(looks_like_text(&path));
        assert!(read_text(&path).is_some());
    }

    #[test]
    fn test_compare_files_labels() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("old.txt");
        let new = temp.path().join("new.txt");
        fs::write(&old, b"one\n").unwrap();
        fs::write(&new, b"one\ntwo\n").unwrap();

        let lines = TextDiffEngine::new()
            .compare_files(&old, &new, "conf/app.ini")
            .unwrap();
        assert_eq!(lines[0], "--- old/conf/app.ini");
        assert_eq!(lines[1], "+++ new/conf/app.ini");
        assert!(lines.contains(&"+two".to_string()));
    }
}
