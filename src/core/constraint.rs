//! Constraint extraction from free-text task descriptions.
//!
//! Extraction is a pure function over the description text: a fixed,
//! ordered table of per-kind patterns is applied first, then bullet and
//! numbered list lines are emitted verbatim as custom constraints. The
//! extractor never deduplicates; duplicates are tolerated downstream.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Minimum trimmed length for a list line to count as a requirement.
const MIN_REQUIREMENT_LEN: usize = 5;

/// The closed set of constraint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    OutputFormat,
    CodeQuality,
    TestCoverage,
    Performance,
    Security,
    Compliance,
    Deadline,
    Language,
    Framework,
    Custom,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstraintKind::OutputFormat => "output_format",
            ConstraintKind::CodeQuality => "code_quality",
            ConstraintKind::TestCoverage => "test_coverage",
            ConstraintKind::Performance => "performance",
            ConstraintKind::Security => "security",
            ConstraintKind::Compliance => "compliance",
            ConstraintKind::Deadline => "deadline",
            ConstraintKind::Language => "language",
            ConstraintKind::Framework => "framework",
            ConstraintKind::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

/// Typed payload captured by a constraint pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    /// Numeric payload, e.g. a coverage percentage.
    Number(f64),
    /// Textual payload, e.g. a language or framework name.
    Text(String),
}

impl std::fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintValue::Number(n) => write!(f, "{}", n),
            ConstraintValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A single constraint on a task. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// The kind of requirement this constraint expresses.
    pub kind: ConstraintKind,
    /// The matched span or list line the constraint was derived from.
    pub description: String,
    /// Captured payload, type-coerced per kind.
    pub value: Option<ConstraintValue>,
    /// Whether the constraint must be satisfied.
    pub required: bool,
}

impl Constraint {
    /// Create a required constraint with no payload.
    pub fn new(kind: ConstraintKind, description: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
            value: None,
            required: true,
        }
    }

    /// Create a required constraint with a payload.
    pub fn with_value(kind: ConstraintKind, description: &str, value: ConstraintValue) -> Self {
        Self {
            value: Some(value),
            ..Self::new(kind, description)
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)?;
        if let Some(value) = &self.value {
            write!(f, " ({})", value)?;
        }
        Ok(())
    }
}

/// The fixed pattern table, in application order.
///
/// Each entry is (kind, patterns); every match of every pattern produces
/// one constraint whose value is the first capture group.
fn pattern_table() -> &'static [(ConstraintKind, Vec<Regex>)] {
    static TABLE: OnceLock<Vec<(ConstraintKind, Vec<Regex>)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            (
                ConstraintKind::TestCoverage,
                vec![
                    Regex::new(r"(?i)(?:test coverage|coverage)\s*(?:>=|>|above|at least)\s*(\d+)%")
                        .expect("valid regex"),
                    Regex::new(r"(?i)(\d+)%\s*(?:test )?coverage").expect("valid regex"),
                ],
            ),
            (
                ConstraintKind::Language,
                vec![
                    Regex::new(
                        r"(?i)(?:use|using|in|with)\s+(TypeScript|JavaScript|Python|Java|Go|Rust|C\+\+)",
                    )
                    .expect("valid regex"),
                    Regex::new(r"(?i)(TypeScript|JavaScript|Python|Java|Go|Rust) strict mode")
                        .expect("valid regex"),
                ],
            ),
            (
                ConstraintKind::Framework,
                vec![Regex::new(
                    r"(?i)(?:use|using)\s+([A-Z][a-zA-Z0-9]+(?:\s+[A-Z][a-zA-Z0-9]+)?)\s+(?:SDK|framework|library)",
                )
                .expect("valid regex")],
            ),
            (
                ConstraintKind::Compliance,
                vec![Regex::new(r"(?i)(FIDO2|OAuth2|GDPR|HIPAA|SOC2)\s+(?:compliance|compliant)")
                    .expect("valid regex")],
            ),
            (
                ConstraintKind::OutputFormat,
                vec![
                    Regex::new(r"(?i)(?:generate|create|output)\s+(documentation|docs|API docs|README)")
                        .expect("valid regex"),
                    Regex::new(r"(?i)output format:\s*(\w+)").expect("valid regex"),
                ],
            ),
        ]
    })
}

/// Patterns recognizing bullet and numbered list lines, in order.
fn list_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?m)^\s*[-•]\s*(.+)$").expect("valid regex"),
            Regex::new(r"(?m)^\s*\d+\.\s*(.+)$").expect("valid regex"),
        ]
    })
}

/// Extract constraints from a task description.
///
/// Pure and deterministic: repeated calls on the same description yield
/// the same list. Ordering is all pattern-derived constraints in table
/// order, then all list-derived constraints in document order. A
/// description with no matches yields an empty list.
pub fn extract(description: &str) -> Vec<Constraint> {
    let mut constraints = Vec::new();

    for (kind, patterns) in pattern_table() {
        for pattern in patterns {
            for captures in pattern.captures_iter(description) {
                let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
                let value = captures.get(1).map(|group| {
                    // Coverage percentages are coerced to floats; everything
                    // else is carried as text.
                    if *kind == ConstraintKind::TestCoverage {
                        group
                            .as_str()
                            .parse::<f64>()
                            .map(ConstraintValue::Number)
                            .unwrap_or_else(|_| ConstraintValue::Text(group.as_str().to_string()))
                    } else {
                        ConstraintValue::Text(group.as_str().to_string())
                    }
                });

                constraints.push(Constraint {
                    kind: *kind,
                    description: matched.to_string(),
                    value,
                    required: true,
                });
            }
        }
    }

    // Explicit requirements: bullet points and numbered lists.
    for pattern in list_patterns() {
        for captures in pattern.captures_iter(description) {
            let requirement = captures
                .get(1)
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if requirement.chars().count() > MIN_REQUIREMENT_LEN {
                constraints.push(Constraint::new(ConstraintKind::Custom, requirement));
            }
        }
    }

    constraints
}
