//! Text classification for routing and decomposition.
//!
//! The `Classifier` trait is the seam between the keyword heuristics and
//! the components that consume them: the agent router and the task
//! decomposer depend only on this interface, so a learned classifier can
//! be substituted without touching either.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A work-category tag recognized in a task description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Coding,
    Testing,
    Documentation,
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::Coding => write!(f, "coding"),
            Tag::Testing => write!(f, "testing"),
            Tag::Documentation => write!(f, "documentation"),
        }
    }
}

/// Classifies task descriptions into work-category tags.
pub trait Classifier: Send + Sync {
    /// Return every tag that applies to the given text.
    fn classify(&self, text: &str) -> HashSet<Tag>;
}

/// Keyword families recognized by the default classifier.
const CODING_KEYWORDS: &[&str] = &["code", "implement", "refactor", "develop"];
const TESTING_KEYWORDS: &[&str] = &["test", "testing", "unit test", "coverage"];
const DOCUMENTATION_KEYWORDS: &[&str] = &["document", "documentation", "readme", "docs", "api doc"];

/// The default pattern-based classifier.
///
/// Lower-cases the text and checks each keyword family for a substring
/// match. Deterministic by construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Create a new keyword classifier.
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> HashSet<Tag> {
        let lower = text.to_lowercase();
        let mut tags = HashSet::new();

        if CODING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            tags.insert(Tag::Coding);
        }
        if TESTING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            tags.insert(Tag::Testing);
        }
        if DOCUMENTATION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            tags.insert(Tag::Documentation);
        }

        tags
    }
}
