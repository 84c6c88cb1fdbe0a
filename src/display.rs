//! Output Formatting and Display Management
//!
//! Renders a finished [`RunOutcome`] either as colored terminal text or as JSON.
//!
//! ## Terminal Layout
//!
//! One block per language, sorted by name:
//!
//! ```text
//! Python
//!
//!     Added:   15
//!     Deleted: 2
//!     Total:   17
//!     Net:     13
//! ```
//!
//! Added counts are green and deleted counts red. Commits that could not be
//! resolved and early pagination stops are listed after the languages so a partial
//! report is never mistaken for a complete one.
//!
//! ## JSON Output
//!
//! ```json
//! {
//!   "user": "alice",
//!   "languages": { "Python": { "added": 15, "deleted": 2 } },
//!   "failures": [],
//!   "truncated": null,
//!   "summary": { "pages": 1, "events_seen": 3, ... }
//! }
//! ```

use crate::aggregator::RunOutcome;
use crate::language::LanguageClassifier;
use crate::models::LanguageStat;
use colored::Colorize;

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_outcome(&self, outcome: &RunOutcome, json_output: bool) {
        if json_output {
            match serde_json::to_string_pretty(&outcome_json(outcome)) {
                Ok(json_str) => println!("{}", json_str),
                Err(e) => eprintln!("Error serializing report to JSON: {}", e),
            }
            return;
        }

        print!("{}", self.render_outcome(outcome));
    }

    pub fn display_languages(&self, classifier: &LanguageClassifier, json_output: bool) {
        if json_output {
            let table: serde_json::Map<String, serde_json::Value> = classifier
                .entries()
                .into_iter()
                .map(|(ext, lang)| (ext.to_string(), serde_json::Value::from(lang)))
                .collect();
            match serde_json::to_string_pretty(&table) {
                Ok(json_str) => println!("{}", json_str),
                Err(e) => eprintln!("Error serializing language table to JSON: {}", e),
            }
            return;
        }

        for (ext, lang) in classifier.entries() {
            println!("{:<8} {}", format!(".{ext}").bright_cyan(), lang);
        }
    }

    pub fn render_outcome(&self, outcome: &RunOutcome) -> String {
        let mut out = String::new();

        if outcome.report.is_empty() {
            out.push_str(&format!(
                "\nNo classified changes found for {}.\n",
                outcome.user.bright_white().bold()
            ));
        }

        for (language, stat) in outcome.report.iter() {
            out.push_str(&render_language(language, stat));
        }

        if !outcome.failures.is_empty() {
            out.push_str(&format!(
                "\n{} {} commit(s) could not be resolved:\n",
                "warning:".yellow().bold(),
                outcome.failures.len()
            ));
            for failure in &outcome.failures {
                out.push_str(&format!(
                    "    {}@{}: {}\n",
                    failure.repo,
                    short_sha(&failure.sha),
                    failure.error
                ));
            }
        }

        if let Some(reason) = &outcome.truncated {
            out.push_str(&format!(
                "\n{} event feed ended early, totals are partial: {}\n",
                "warning:".yellow().bold(),
                reason
            ));
        }

        out
    }
}

fn render_language(language: &str, stat: &LanguageStat) -> String {
    format!(
        "\n{}\n\n    {}\n    {}\n    Total:   {}\n    Net:     {}\n",
        language.bold(),
        format!("Added:   {}", stat.added).green(),
        format!("Deleted: {}", stat.deleted).red(),
        stat.total(),
        stat.net()
    )
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    serde_json::json!({
        "user": outcome.user,
        "languages": outcome.report,
        "failures": outcome.failures,
        "truncated": outcome.truncated,
        "summary": outcome.summary,
    })
}
