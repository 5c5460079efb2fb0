//! Clarification mediator.
//!
//! Reconciles human answers to clarification questions. Each clarification
//! invocation gets a result entry carrying the answer. Invocations that
//! were bundled alongside the clarification are deferred: they get filler
//! results and a fresh agent entry, and hand off to the confirmation
//! mediator when any of them is gated.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::CatalogConfig;
use crate::state::{
    ClarificationRequest, ConversationState, GatedInvocation, PendingAction, StepUpdate,
};
use crate::transcript::{Entry, Invocation};

use super::routing::StepEvent;

/// Filler content for invocations deferred behind a clarification.
pub const DEFERRED_FILLER: &str = "Deferred pending clarification.";

/// Result content when the resume payload skipped a clarification id.
pub const NO_ANSWER_PROVIDED: &str = "No answer provided.";

/// One human answer to one clarification question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub invocation_id: String,
    pub answer: String,
}

/// Reconcile clarification answers against the pending request set and the
/// last agent entry's full invocation list.
pub fn reconcile_answers(
    state: &ConversationState,
    requests: &[ClarificationRequest],
    answers: &[ClarificationAnswer],
    catalog: &CatalogConfig,
) -> (StepUpdate, StepEvent) {
    let (entry_text, entry_invocations) = match state.transcript.last_agent_entry() {
        Some((text, invocations)) => (text.to_string(), invocations.to_vec()),
        None => {
            warn!("clarification mediator reached with no agent entry");
            (String::new(), Vec::new())
        }
    };

    let request_ids: HashSet<&str> = requests.iter().map(|r| r.invocation_id.as_str()).collect();

    let mut answer_by_id: HashMap<&str, &str> = HashMap::new();
    for answer in answers {
        if request_ids.contains(answer.invocation_id.as_str()) {
            answer_by_id.insert(answer.invocation_id.as_str(), answer.answer.as_str());
        } else {
            warn!(
                invocation_id = %answer.invocation_id,
                "answer references an invocation that is not pending; ignoring"
            );
        }
    }

    // One result per clarification id, in pending order.
    let mut entries: Vec<Entry> = requests
        .iter()
        .map(|r| {
            let content = answer_by_id
                .get(r.invocation_id.as_str())
                .copied()
                .unwrap_or(NO_ANSWER_PROVIDED);
            Entry::result(&r.invocation_id, content)
        })
        .collect();

    let remaining: Vec<Invocation> = entry_invocations
        .iter()
        .filter(|i| !request_ids.contains(i.id.as_str()))
        .cloned()
        .collect();

    if remaining.is_empty() {
        info!("clarification answered; no deferred invocations");
        let update = StepUpdate {
            entries,
            pending_action: Some(PendingAction::None),
            ..Default::default()
        };
        return (
            update,
            StepEvent::AnswersReconciled {
                invocation_ids: vec![],
                needs_confirmation: false,
            },
        );
    }

    // Deferred invocations: fillers first, then a fresh agent entry
    // carrying exactly the remainder.
    for i in &remaining {
        entries.push(Entry::result(&i.id, DEFERRED_FILLER));
    }
    entries.push(Entry::Agent {
        text: entry_text,
        invocations: remaining.clone(),
    });

    let gated: Vec<GatedInvocation> = remaining
        .iter()
        .filter(|i| catalog.is_gated(&i.name))
        .map(|i| GatedInvocation {
            invocation_id: i.id.clone(),
            name: i.name.clone(),
            arguments: i.arguments.clone(),
        })
        .collect();

    let remaining_ids: Vec<String> = remaining.iter().map(|i| i.id.clone()).collect();

    if gated.is_empty() {
        info!(count = remaining_ids.len(), "deferred invocations ready to run");
        let update = StepUpdate {
            entries,
            pending_action: Some(PendingAction::None),
            ..Default::default()
        };
        (
            update,
            StepEvent::AnswersReconciled {
                invocation_ids: remaining_ids,
                needs_confirmation: false,
            },
        )
    } else {
        info!(
            gated = gated.len(),
            "deferred invocations include gated actions; handing off to confirmation"
        );
        let update = StepUpdate {
            entries,
            pending_action: Some(PendingAction::Confirmation { invocations: gated }),
            ..Default::default()
        };
        (
            update,
            StepEvent::AnswersReconciled {
                invocation_ids: remaining_ids,
                needs_confirmation: true,
            },
        )
    }
}
