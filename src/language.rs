//! Extension to language classification.
//!
//! The table is plain data owned by a [`LanguageClassifier`]; callers build it from
//! configuration (see [`crate::config::LanguagesConfig`]) and share it behind an `Arc`.

use std::collections::{BTreeSet, HashMap};

/// Built-in extension table (lowercase extension, no leading dot).
pub const DEFAULT_EXTENSIONS: &[(&str, &str)] = &[
    ("c", "C"),
    ("cpp", "C++"),
    ("hs", "Haskell"),
    ("java", "Java"),
    ("js", "Javascript"),
    ("jsx", "Javascript"),
    ("py", "Python"),
    ("rs", "Rust"),
    ("rust", "Rust"),
    ("sql", "SQL"),
];

#[derive(Debug, Clone)]
pub struct LanguageClassifier {
    extensions: HashMap<String, String>,
}

impl Default for LanguageClassifier {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl LanguageClassifier {
    pub fn new(extensions: HashMap<String, String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|(ext, lang)| (normalize_extension(&ext), lang))
            .collect();
        Self { extensions }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
                .collect(),
        )
    }

    /// Language for `file_name`, or `None` when its extension is not in the table.
    pub fn classify(&self, file_name: &str) -> Option<&str> {
        let ext = extension_of(file_name)?;
        self.extensions.get(&ext).map(String::as_str)
    }

    /// Distinct language labels, sorted.
    pub fn languages(&self) -> BTreeSet<&str> {
        self.extensions.values().map(String::as_str).collect()
    }

    /// (extension, language) pairs sorted by extension.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self
            .extensions
            .iter()
            .map(|(ext, lang)| (ext.as_str(), lang.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Text after the last `.` of the final path component, lowercased.
fn extension_of(file_name: &str) -> Option<String> {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}
