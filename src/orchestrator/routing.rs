//! Turn state machine: nodes, step events, and the transition function.
//!
//! Nodes are an explicit finite-state enum and routing is a pure function
//! of (node, event) - no dynamic dispatch by name. The engine drives the
//! table; mediator nodes double as suspension points.

use tracing::warn;

/// Nodes of the turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Action catalog gate: resolve allowed categories.
    Gate,
    /// Execution step: one reasoning call, classify the result.
    Execute,
    /// Action invocation step: run approved invocations.
    Invoke,
    /// Confirmation mediator (suspension point).
    Confirm,
    /// Clarification mediator (suspension point).
    Clarify,
    /// Authorization mediator (terminal for the turn).
    Authorize,
    /// Final answer reached.
    Done,
}

/// What a step produced, as input to the routing decision.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// Gate resolved the allowed category set.
    CategoriesResolved,
    /// Execution result contains clarification invocations.
    ClarificationRequested,
    /// Execution result contains gated invocations.
    ConfirmationRequested,
    /// Execution result contains plain invocations, ready to run.
    InvocationsReady { invocation_ids: Vec<String> },
    /// Execution result carries no invocations; the turn is answered.
    FinalAnswer,
    /// Invocation step appended real results for every target.
    ResultsAppended,
    /// Invocation step captured an authorization elicitation.
    AuthorizationCaptured,
    /// Confirmation mediator reconciled decisions; the surviving
    /// invocation set may be empty.
    ApprovalsReconciled { invocation_ids: Vec<String> },
    /// Clarification mediator reconciled answers.
    AnswersReconciled {
        invocation_ids: Vec<String>,
        needs_confirmation: bool,
    },
}

/// Pure transition function for the turn state machine.
///
/// Unmatched pairs fall back to the execution step, mirroring the degraded
/// routing used for mismatched resumes.
pub fn next_node(node: Node, event: &StepEvent) -> Node {
    match (node, event) {
        (Node::Gate, StepEvent::CategoriesResolved) => Node::Execute,

        (Node::Execute, StepEvent::ClarificationRequested) => Node::Clarify,
        (Node::Execute, StepEvent::ConfirmationRequested) => Node::Confirm,
        (Node::Execute, StepEvent::InvocationsReady { .. }) => Node::Invoke,
        (Node::Execute, StepEvent::FinalAnswer) => Node::Done,
        // Catalog fetch hit an authorization wall before any reasoning call.
        (Node::Execute, StepEvent::AuthorizationCaptured) => Node::Authorize,

        (Node::Invoke, StepEvent::ResultsAppended) => Node::Execute,
        (Node::Invoke, StepEvent::AuthorizationCaptured) => Node::Authorize,

        (Node::Confirm, StepEvent::ApprovalsReconciled { invocation_ids }) => {
            if invocation_ids.is_empty() {
                Node::Execute
            } else {
                Node::Invoke
            }
        }

        (
            Node::Clarify,
            StepEvent::AnswersReconciled {
                invocation_ids,
                needs_confirmation,
            },
        ) => {
            if *needs_confirmation {
                Node::Confirm
            } else if invocation_ids.is_empty() {
                Node::Execute
            } else {
                Node::Invoke
            }
        }

        (node, event) => {
            warn!(?node, ?event, "unmatched routing pair; falling back to execution step");
            Node::Execute
        }
    }
}
