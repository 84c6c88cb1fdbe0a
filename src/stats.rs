//! Per-language accumulation.
//!
//! [`LanguageTotals`] is owned by exactly one task during a run. Merging is plain
//! addition per language, so the order results arrive in never changes the totals.

use crate::language::LanguageClassifier;
use crate::models::{FileChange, LanguageStat, StatReport};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LanguageTotals {
    classifier: Arc<LanguageClassifier>,
    stats: HashMap<String, LanguageStat>,
    unclassified: u64,
}

impl LanguageTotals {
    /// Starts one zeroed accumulator per language known to `classifier`.
    pub fn new(classifier: Arc<LanguageClassifier>) -> Self {
        let stats = classifier
            .languages()
            .into_iter()
            .map(|lang| (lang.to_string(), LanguageStat::default()))
            .collect();

        Self {
            classifier,
            stats,
            unclassified: 0,
        }
    }

    /// Adds `change` to its language. Returns false when the file is unclassified.
    pub fn merge(&mut self, change: &FileChange) -> bool {
        match self.classifier.classify(&change.file_name) {
            Some(lang) => {
                self.stats
                    .entry(lang.to_string())
                    .or_default()
                    .record(change);
                true
            }
            None => {
                self.unclassified += 1;
                false
            }
        }
    }

    pub fn merge_all<'a, I>(&mut self, changes: I)
    where
        I: IntoIterator<Item = &'a FileChange>,
    {
        for change in changes {
            self.merge(change);
        }
    }

    pub fn get(&self, language: &str) -> Option<&LanguageStat> {
        self.stats.get(language)
    }

    /// Number of file changes skipped because their extension is not mapped.
    pub fn unclassified(&self) -> u64 {
        self.unclassified
    }

    pub fn into_report(self) -> StatReport {
        StatReport::from_totals(self.stats)
    }
}
