//! Confirmation mediator.
//!
//! Reconciles human approve/reject decisions for gated invocations back
//! into the transcript. Ungated invocations bundled in the same agent entry
//! were never separately gated and are treated as auto-approved. In every
//! branch, all filler results for the source entry appear before any new
//! agent entry synthesized to carry the surviving subset.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::{
    ApprovalOutcome, ConversationState, GatedInvocation, PendingAction, RejectedInvocation,
    StepUpdate,
};
use crate::transcript::{Entry, Invocation};

use super::routing::StepEvent;

/// Feedback substituted when a rejection carries none, and when a gated id
/// received no decision at all.
pub const DEFAULT_REJECTION_FEEDBACK: &str = "Rejected without feedback";

/// Filler content for approved gated invocations in the partial case.
pub const APPROVED_FILLER: &str = "User approved this action. Proceeding with execution.";

/// Filler content for ungated invocations resolved alongside a rejection.
pub const AUTO_APPROVED_FILLER: &str = "Action auto-approved: no confirmation required.";

/// One human decision for one gated invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub invocation_id: String,
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

fn rejection_filler(feedback: &str) -> String {
    format!("User rejected this action: {feedback}")
}

/// Reconcile approval decisions against the pending gated set and the last
/// agent entry's full invocation list.
pub fn reconcile_approvals(
    state: &ConversationState,
    gated: &[GatedInvocation],
    decisions: &[ApprovalDecision],
) -> (StepUpdate, StepEvent) {
    let (entry_text, entry_invocations) = match state.transcript.last_agent_entry() {
        Some((text, invocations)) => (text.to_string(), invocations.to_vec()),
        None => {
            warn!("confirmation mediator reached with no agent entry");
            (String::new(), Vec::new())
        }
    };

    let gated_ids: HashSet<&str> = gated.iter().map(|g| g.invocation_id.as_str()).collect();

    let mut decision_by_id: HashMap<&str, &ApprovalDecision> = HashMap::new();
    for decision in decisions {
        if gated_ids.contains(decision.invocation_id.as_str()) {
            decision_by_id.insert(decision.invocation_id.as_str(), decision);
        } else {
            // Unknown ids are ignored, never fatal.
            warn!(
                invocation_id = %decision.invocation_id,
                "decision references an invocation that is not pending; ignoring"
            );
        }
    }

    // Partition the gated set; a gated id with no decision counts as
    // rejected so every id stays covered.
    let mut approved_gated: Vec<String> = Vec::new();
    let mut rejected: Vec<RejectedInvocation> = Vec::new();
    for g in gated {
        match decision_by_id.get(g.invocation_id.as_str()) {
            Some(d) if d.approved => approved_gated.push(g.invocation_id.clone()),
            Some(d) => rejected.push(RejectedInvocation {
                invocation_id: g.invocation_id.clone(),
                name: g.name.clone(),
                feedback: d
                    .feedback
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REJECTION_FEEDBACK.to_string()),
            }),
            None => rejected.push(RejectedInvocation {
                invocation_id: g.invocation_id.clone(),
                name: g.name.clone(),
                feedback: DEFAULT_REJECTION_FEEDBACK.to_string(),
            }),
        }
    }

    let ungated_ids: Vec<String> = entry_invocations
        .iter()
        .filter(|i| !gated_ids.contains(i.id.as_str()))
        .map(|i| i.id.clone())
        .collect();

    info!(
        approved = approved_gated.len(),
        rejected = rejected.len(),
        auto_approved = ungated_ids.len(),
        "reconciled approval decisions"
    );

    // Case: all gated approved. Nothing to append; every invocation of the
    // entry proceeds as-is.
    if rejected.is_empty() {
        let surviving: Vec<String> = entry_invocations.iter().map(|i| i.id.clone()).collect();
        let update = StepUpdate {
            pending_action: Some(PendingAction::None),
            approval_outcome: Some(ApprovalOutcome {
                all_approved: true,
                approved_ids: surviving.clone(),
                rejected: Vec::new(),
            }),
            ..Default::default()
        };
        return (
            update,
            StepEvent::ApprovalsReconciled {
                invocation_ids: surviving,
            },
        );
    }

    let approved_set: HashSet<&str> = approved_gated.iter().map(String::as_str).collect();
    let rejected_by_id: HashMap<&str, &RejectedInvocation> = rejected
        .iter()
        .map(|r| (r.invocation_id.as_str(), r))
        .collect();

    // Fillers in source-entry order within each group: approved
    // acknowledgements, then rejections with feedback, then ungated
    // auto-approval notices.
    let mut entries: Vec<Entry> = Vec::new();
    for i in &entry_invocations {
        if approved_set.contains(i.id.as_str()) {
            entries.push(Entry::result(&i.id, APPROVED_FILLER));
        }
    }
    for i in &entry_invocations {
        if let Some(r) = rejected_by_id.get(i.id.as_str()) {
            entries.push(Entry::result(&i.id, rejection_filler(&r.feedback)));
        }
    }
    for i in &entry_invocations {
        if !gated_ids.contains(i.id.as_str()) {
            entries.push(Entry::result(&i.id, AUTO_APPROVED_FILLER));
        }
    }

    // Surviving set preserves the original order of ids in the source entry.
    let surviving: Vec<Invocation> = entry_invocations
        .iter()
        .filter(|i| approved_set.contains(i.id.as_str()) || !gated_ids.contains(i.id.as_str()))
        .cloned()
        .collect();
    let surviving_ids: Vec<String> = surviving.iter().map(|i| i.id.clone()).collect();

    if !surviving.is_empty() {
        entries.push(Entry::Agent {
            text: entry_text,
            invocations: surviving,
        });
    }

    let outcome = ApprovalOutcome {
        all_approved: false,
        approved_ids: surviving_ids.clone(),
        rejected,
    };

    (
        StepUpdate {
            entries,
            pending_action: Some(PendingAction::None),
            approval_outcome: Some(outcome),
            ..Default::default()
        },
        StepEvent::ApprovalsReconciled {
            invocation_ids: surviving_ids,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inv(id: &str, name: &str) -> Invocation {
        Invocation {
            id: id.into(),
            name: name.into(),
            arguments: json!({}),
        }
    }

    fn gated(id: &str, name: &str) -> GatedInvocation {
        GatedInvocation {
            invocation_id: id.into(),
            name: name.into(),
            arguments: json!({}),
        }
    }

    fn state_with_entry(invocations: Vec<Invocation>) -> ConversationState {
        let mut state = ConversationState::new("t1", "req");
        state.transcript.push(Entry::Agent {
            text: "working".into(),
            invocations,
        });
        state
    }

    fn decide(id: &str, approved: bool, feedback: Option<&str>) -> ApprovalDecision {
        ApprovalDecision {
            invocation_id: id.into(),
            approved,
            feedback: feedback.map(String::from),
        }
    }

    #[test]
    fn test_full_approval_appends_nothing() {
        let state = state_with_entry(vec![inv("1", "create_event"), inv("2", "update_event")]);
        let gated = vec![gated("1", "create_event"), gated("2", "update_event")];
        let decisions = vec![decide("1", true, None), decide("2", true, None)];

        let (update, event) = reconcile_approvals(&state, &gated, &decisions);

        assert!(update.entries.is_empty());
        let outcome = update.approval_outcome.unwrap();
        assert!(outcome.all_approved);
        assert_eq!(outcome.approved_ids, vec!["1".to_string(), "2".to_string()]);
        assert!(outcome.rejected.is_empty());
        assert_eq!(
            event,
            StepEvent::ApprovalsReconciled {
                invocation_ids: vec!["1".into(), "2".into()]
            }
        );
        assert_eq!(update.pending_action, Some(PendingAction::None));
    }

    #[test]
    fn test_full_rejection_with_ungated_survivor() {
        let state = state_with_entry(vec![inv("1", "create_event"), inv("2", "list_events")]);
        let gated = vec![gated("1", "create_event")];
        let decisions = vec![decide("1", false, Some("bad time"))];

        let (update, event) = reconcile_approvals(&state, &gated, &decisions);

        // Filler for the rejection, filler for the ungated auto-approval,
        // then a new agent entry carrying only the ungated invocation.
        assert_eq!(update.entries.len(), 3);
        assert_eq!(
            update.entries[0],
            Entry::result("1", "User rejected this action: bad time")
        );
        assert_eq!(update.entries[1], Entry::result("2", AUTO_APPROVED_FILLER));
        match &update.entries[2] {
            Entry::Agent { text, invocations } => {
                assert_eq!(text, "working");
                assert_eq!(invocations.len(), 1);
                assert_eq!(invocations[0].id, "2");
                assert_eq!(invocations[0].name, "list_events");
            }
            other => panic!("expected agent entry, got {other:?}"),
        }

        let outcome = update.approval_outcome.unwrap();
        assert!(!outcome.all_approved);
        assert_eq!(outcome.approved_ids, vec!["2".to_string()]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].invocation_id, "1");
        assert_eq!(outcome.rejected[0].feedback, "bad time");

        assert_eq!(
            event,
            StepEvent::ApprovalsReconciled {
                invocation_ids: vec!["2".into()]
            }
        );
    }

    #[test]
    fn test_full_rejection_without_ungated_routes_back_to_execution() {
        let state = state_with_entry(vec![inv("1", "create_event")]);
        let gated = vec![gated("1", "create_event")];
        let decisions = vec![decide("1", false, None)];

        let (update, event) = reconcile_approvals(&state, &gated, &decisions);

        assert_eq!(update.entries.len(), 1);
        assert_eq!(
            update.entries[0],
            Entry::result("1", format!("User rejected this action: {DEFAULT_REJECTION_FEEDBACK}"))
        );
        assert_eq!(
            event,
            StepEvent::ApprovalsReconciled {
                invocation_ids: vec![]
            }
        );
    }

    #[test]
    fn test_partial_approval_fillers_and_surviving_entry() {
        let state = state_with_entry(vec![
            inv("1", "create_event"),
            inv("2", "update_event"),
            inv("3", "list_events"),
        ]);
        let gated = vec![gated("1", "create_event"), gated("2", "update_event")];
        let decisions = vec![decide("1", true, None), decide("2", false, Some("skip"))];

        let (update, event) = reconcile_approvals(&state, &gated, &decisions);

        // Approved ack, rejection, ungated notice, then the surviving entry.
        assert_eq!(update.entries.len(), 4);
        assert_eq!(update.entries[0], Entry::result("1", APPROVED_FILLER));
        assert_eq!(
            update.entries[1],
            Entry::result("2", "User rejected this action: skip")
        );
        assert_eq!(update.entries[2], Entry::result("3", AUTO_APPROVED_FILLER));
        match &update.entries[3] {
            Entry::Agent { invocations, .. } => {
                let ids: Vec<&str> = invocations.iter().map(|i| i.id.as_str()).collect();
                assert_eq!(ids, vec!["1", "3"]);
            }
            other => panic!("expected agent entry, got {other:?}"),
        }

        let outcome = update.approval_outcome.unwrap();
        assert_eq!(outcome.approved_ids, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(
            event,
            StepEvent::ApprovalsReconciled {
                invocation_ids: vec!["1".into(), "3".into()]
            }
        );
    }

    #[test]
    fn test_unknown_decision_ids_are_ignored() {
        let state = state_with_entry(vec![inv("1", "create_event")]);
        let gated = vec![gated("1", "create_event")];
        let decisions = vec![decide("99", false, Some("??")), decide("1", true, None)];

        let (update, _) = reconcile_approvals(&state, &gated, &decisions);

        let outcome = update.approval_outcome.unwrap();
        assert!(outcome.all_approved);
        assert_eq!(outcome.approved_ids, vec!["1".to_string()]);
    }

    #[test]
    fn test_missing_decision_counts_as_rejection() {
        let state = state_with_entry(vec![inv("1", "create_event"), inv("2", "update_event")]);
        let gated = vec![gated("1", "create_event"), gated("2", "update_event")];
        let decisions = vec![decide("1", true, None)];

        let (update, _) = reconcile_approvals(&state, &gated, &decisions);

        let outcome = update.approval_outcome.unwrap();
        assert!(!outcome.all_approved);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].invocation_id, "2");
        assert_eq!(outcome.rejected[0].feedback, DEFAULT_REJECTION_FEEDBACK);
    }
}
