//! Conversation transcript model.
//!
//! The transcript is an append-only log of user input, agent output, and
//! action results. The one invariant everything else leans on: every
//! invocation carried by an agent entry must be covered by exactly one
//! result entry before the next agent entry appears. Rejected, deferred,
//! and authorization-blocked invocations are covered by synthesized filler
//! results so the invariant holds even when nothing actually executed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, argument-bearing request to perform an external action.
///
/// The `id` is unique within the owning agent entry and is the join key
/// used by every mediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Human input.
    User { text: String },
    /// Agent output, possibly carrying invocations to execute.
    Agent {
        text: String,
        #[serde(default)]
        invocations: Vec<Invocation>,
    },
    /// Result of one invocation (real output or a synthesized filler).
    Result {
        invocation_id: String,
        content: String,
    },
}

impl Entry {
    /// Convenience constructor for result entries.
    pub fn result(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Entry::Result {
            invocation_id: invocation_id.into(),
            content: content.into(),
        }
    }
}

/// Violation of the result-coverage invariant. Only surfaced by
/// [`Transcript::check_coverage`]; normal operation never constructs an
/// uncovered committed transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageViolation {
    /// A result entry references an id no open agent entry carries.
    UnknownResult { invocation_id: String },
    /// Two result entries cover the same id.
    DuplicateResult { invocation_id: String },
    /// An agent entry appeared while ids of the previous one were uncovered.
    MissingResult { invocation_id: String },
}

/// Ordered, append-only conversation log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub entries: Vec<Entry>,
}

impl Transcript {
    /// Seed a transcript with the user's opening request.
    pub fn seeded(request: impl Into<String>) -> Self {
        Self {
            entries: vec![Entry::User {
                text: request.into(),
            }],
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.entries.extend(entries);
    }

    /// Number of agent entries committed so far.
    pub fn agent_entry_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Agent { .. }))
            .count()
    }

    /// Text and invocations of the most recent agent entry.
    pub fn last_agent_entry(&self) -> Option<(&str, &[Invocation])> {
        self.entries.iter().rev().find_map(|e| match e {
            Entry::Agent { text, invocations } => Some((text.as_str(), invocations.as_slice())),
            _ => None,
        })
    }

    /// Invocation ids of the last agent entry that have no result entry yet.
    pub fn uncovered_ids(&self) -> Vec<String> {
        let Some(open) = self.entries.iter().rposition(|e| matches!(e, Entry::Agent { .. }))
        else {
            return Vec::new();
        };

        let covered: HashSet<&str> = self.entries[open..]
            .iter()
            .filter_map(|e| match e {
                Entry::Result { invocation_id, .. } => Some(invocation_id.as_str()),
                _ => None,
            })
            .collect();

        match &self.entries[open] {
            Entry::Agent { invocations, .. } => invocations
                .iter()
                .filter(|i| !covered.contains(i.id.as_str()))
                .map(|i| i.id.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Walk the transcript and verify result coverage.
    ///
    /// The trailing agent entry is allowed to be open (a suspended turn is
    /// exactly that); every earlier agent entry must be covered exactly.
    pub fn check_coverage(&self) -> Result<(), CoverageViolation> {
        let mut expected: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in &self.entries {
            match entry {
                Entry::User { .. } => {}
                Entry::Agent { invocations, .. } => {
                    // Any still-uncovered id from the previous entry
                    // demonstrates the violation; report one of them.
                    if let Some(id) = expected.into_iter().next() {
                        return Err(CoverageViolation::MissingResult { invocation_id: id });
                    }
                    expected = invocations.iter().map(|i| i.id.clone()).collect();
                    seen.clear();
                }
                Entry::Result { invocation_id, .. } => {
                    if seen.contains(invocation_id) {
                        return Err(CoverageViolation::DuplicateResult {
                            invocation_id: invocation_id.clone(),
                        });
                    }
                    if !expected.remove(invocation_id) {
                        return Err(CoverageViolation::UnknownResult {
                            invocation_id: invocation_id.clone(),
                        });
                    }
                    seen.insert(invocation_id.clone());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(id: &str, name: &str) -> Invocation {
        Invocation {
            id: id.to_string(),
            name: name.to_string(),
            arguments: Value::Null,
        }
    }

    #[test]
    fn test_seeded_starts_with_user_entry() {
        let t = Transcript::seeded("hello");
        assert_eq!(t.entries.len(), 1);
        assert!(matches!(&t.entries[0], Entry::User { text } if text == "hello"));
    }

    #[test]
    fn test_uncovered_ids_of_open_entry() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "working".into(),
            invocations: vec![inv("1", "a"), inv("2", "b")],
        });
        t.push(Entry::result("1", "done"));

        assert_eq!(t.uncovered_ids(), vec!["2".to_string()]);
    }

    #[test]
    fn test_coverage_passes_for_covered_transcript() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "working".into(),
            invocations: vec![inv("1", "a")],
        });
        t.push(Entry::result("1", "done"));
        t.push(Entry::Agent {
            text: "all done".into(),
            invocations: vec![],
        });

        assert!(t.check_coverage().is_ok());
    }

    #[test]
    fn test_coverage_allows_trailing_open_entry() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "working".into(),
            invocations: vec![inv("1", "a")],
        });

        assert!(t.check_coverage().is_ok());
    }

    #[test]
    fn test_coverage_rejects_missing_result() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "first".into(),
            invocations: vec![inv("1", "a"), inv("2", "b")],
        });
        t.push(Entry::result("1", "done"));
        t.push(Entry::Agent {
            text: "second".into(),
            invocations: vec![],
        });

        assert_eq!(
            t.check_coverage(),
            Err(CoverageViolation::MissingResult {
                invocation_id: "2".into()
            })
        );
    }

    #[test]
    fn test_coverage_rejects_duplicate_result() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "first".into(),
            invocations: vec![inv("1", "a")],
        });
        t.push(Entry::result("1", "done"));
        t.push(Entry::result("1", "done again"));

        assert_eq!(
            t.check_coverage(),
            Err(CoverageViolation::DuplicateResult {
                invocation_id: "1".into()
            })
        );
    }

    #[test]
    fn test_coverage_rejects_unknown_result() {
        let mut t = Transcript::seeded("req");
        t.push(Entry::Agent {
            text: "first".into(),
            invocations: vec![inv("1", "a")],
        });
        t.push(Entry::result("9", "mystery"));

        assert_eq!(
            t.check_coverage(),
            Err(CoverageViolation::UnknownResult {
                invocation_id: "9".into()
            })
        );
    }
}
