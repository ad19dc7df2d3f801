//! Noise classification of relative paths.
//!
//! The policy is a table of rules. A rule matches when every pattern in
//! `all_of` matches and no pattern in `none_of` does; a path is noise when
//! any rule matches. Patterns are globs where `*` also crosses `/`, so
//! `*foo*` reads as "contains foo". Classification never touches the
//! filesystem.

use glob::Pattern;
use nestdiff_common::{NestDiffError, NoiseConfig};

/// Java namespaces of bundled third-party code
const VENDOR_JAVA_PREFIXES: &[&str] = &[
    "androidx/",
    "com/google/",
    "com/android/",
    "org/apache/",
    "org/tukaani/",
];

/// (rule name, patterns that must all match)
const BUILTIN_RULES: &[(&str, &[&str])] = &[
    ("android-resource-xml", &["*.xml", "*src/main/res*"]),
    ("shader-source", &["*src/main*", "*/Shaders/*"]),
    ("build-metadata", &["*META-INF*"]),
    ("locales", &["*locales*"]),
    ("fontconfig", &["*fontconfig*"]),
    ("resource-ids", &["*R.java*"]),
];

const SOURCE_EXTENSIONS: &[&str] = &[".java", ".kt", ".c", ".cc", ".cpp", ".h", ".hpp"];

/// Whether a path looks like hand-written source, which gets a larger preview allowance
pub fn is_source_file(path: &str) -> bool {
    SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[derive(Debug, Clone)]
pub struct NoiseRule {
    name: String,
    all_of: Vec<Pattern>,
    none_of: Vec<Pattern>,
}

impl NoiseRule {
    pub fn new(name: &str, all_of: &[&str], none_of: &[Pattern]) -> Result<Self, NestDiffError> {
        let all_of = all_of
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            all_of,
            none_of: none_of.to_vec(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, path: &str) -> bool {
        self.all_of.iter().all(|p| p.matches(path)) && !self.none_of.iter().any(|p| p.matches(path))
    }
}

/// Decides which changed paths are generated or vendored content
#[derive(Debug, Clone)]
pub struct FileClassifier {
    rules: Vec<NoiseRule>,
}

impl FileClassifier {
    pub fn new(config: &NoiseConfig) -> Result<Self, NestDiffError> {
        let project_owned = config
            .project_namespaces
            .iter()
            .map(|ns| compile(&format!("*{}*", Pattern::escape(ns))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rules = Vec::new();
        for prefix in VENDOR_JAVA_PREFIXES {
            let contains = format!("*{}*", prefix);
            rules.push(NoiseRule::new(
                &format!("vendor-java:{}", prefix),
                &["*.java", contains.as_str()],
                &project_owned,
            )?);
        }
        for (name, all_of) in BUILTIN_RULES {
            rules.push(NoiseRule::new(name, all_of, &[])?);
        }
        for pattern in &config.extra_patterns {
            rules.push(NoiseRule::new(&format!("custom:{}", pattern), &[pattern.as_str()], &[])?);
        }

        Ok(Self { rules })
    }

    pub fn is_noise(&self, path: &str) -> bool {
        self.matching_rule(path).is_some()
    }

    /// Name of the first rule that classifies `path` as noise
    pub fn matching_rule(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(NoiseRule::name)
    }
}

fn compile(pattern: &str) -> Result<Pattern, NestDiffError> {
    Pattern::new(pattern)
        .map_err(|e| NestDiffError::Config(format!("invalid noise pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FileClassifier {
        FileClassifier::new(&NoiseConfig::default()).unwrap()
    }

    #[test]
    fn test_vendor_java_is_noise() {
        let c = classifier();
        assert!(c.is_noise("androidx/widget/Foo.java"));
        assert!(c.is_noise("sources/com/google/gson/Gson.java"));
        assert!(c.is_noise("sources/org/tukaani/xz/XZ.java"));
        assert_eq!(c.matching_rule("androidx/widget/Foo.java"), Some("vendor-java:androidx/"));
    }

    #[test]
    fn test_vendor_prefix_only_applies_to_java() {
        let c = classifier();
        assert!(!c.is_noise("androidx/widget/notes.txt"));
        assert!(!c.is_noise("lib/arm64/com/google/libfoo.so"));
    }

    #[test]
    fn test_project_java_is_never_vendor_noise() {
        let c = classifier();
        assert!(!c.is_noise("sources/com/winlator/MainActivity.java"));
        assert!(!c.is_noise("sources/com/winlator/androidx/Shim.java"));
        assert!(!c.is_noise("sources/com/example/Other.java"));
    }

    #[test]
    fn test_builtin_rules() {
        let c = classifier();
        assert!(c.is_noise("app/src/main/res/layout/main.xml"));
        assert!(!c.is_noise("app/src/main/AndroidManifest.xml"));
        assert!(c.is_noise("app/src/main/assets/Shaders/blit.frag"));
        assert!(!c.is_noise("assets/Shaders/blit.frag"));
        assert!(c.is_noise("META-INF/MANIFEST.MF"));
        assert!(c.is_noise("resources/assets/locales/de.json"));
        assert!(c.is_noise("etc/fontconfig/fonts.conf"));
        assert!(c.is_noise("sources/com/winlator/R.java"));
    }

    #[test]
    fn test_extra_patterns() {
        let config = NoiseConfig {
            extra_patterns: vec!["*usr/share*".to_string()],
            ..NoiseConfig::default()
        };
        let c = FileClassifier::new(&config).unwrap();
        assert!(c.is_noise("usr/share/doc/README"));
        assert_eq!(c.matching_rule("usr/share/doc/README"), Some("custom:*usr/share*"));
    }

    #[test]
    fn test_invalid_extra_pattern() {
        let config = NoiseConfig {
            extra_patterns: vec!["[".to_string()],
            ..NoiseConfig::default()
        };
        assert!(matches!(FileClassifier::new(&config), Err(NestDiffError::Config(_))));
    }

    #[test]
    fn test_classification_is_stable() {
        let c = classifier();
        for path in ["androidx/a/B.java", "bin/app", "META-INF/x"] {
            assert_eq!(c.is_noise(path), c.is_noise(path));
        }
    }

    #[test]
    fn test_source_files() {
        assert!(is_source_file("a/B.java"));
        assert!(is_source_file("jni/main.cpp"));
        assert!(is_source_file("include/x.h"));
        assert!(!is_source_file("res/values.xml"));
        assert!(!is_source_file("lib.so"));
    }
}
