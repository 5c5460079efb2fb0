//! Turn engine: wires the steps into the state machine.
//!
//! The engine drives the transition table, applies each step's partial
//! update atomically, persists the aggregate after every step, and returns
//! control to the caller at suspension points instead of blocking. Resume
//! re-enters the specific mediator keyed by the pending action's kind; no
//! hidden continuation capture.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::catalog::{ActionCache, CatalogConfig};
use crate::checkpoint::CheckpointStore;
use crate::collaborators::{ActionProvider, ReasoningService};
use crate::error::TurnError;
use crate::state::{
    ClarificationRequest, ConversationState, GatedInvocation, PendingAction, StepUpdate,
};

use super::clarify::{self, ClarificationAnswer};
use super::confirm::{self, ApprovalDecision};
use super::invoke::DEFAULT_AUTHORIZATION_MESSAGE;
use super::routing::{next_node, Node, StepEvent};
use super::{execute, gate, invoke};

/// Outcome of one start or resume operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnResult {
    /// Terminal: the turn produced a final answer.
    Success { response: String },
    /// Suspended awaiting approval decisions for the listed invocations.
    ConfirmationRequired {
        thread_id: String,
        pending_confirmation: Vec<GatedInvocation>,
    },
    /// Suspended awaiting answers to the listed questions.
    ClarificationRequired {
        thread_id: String,
        pending_clarification: Vec<ClarificationRequest>,
    },
    /// Terminal: out-of-band authorization is needed before retrying.
    AuthorizationRequired {
        response: String,
        url: Option<String>,
        form_schema: Option<serde_json::Value>,
    },
    /// Terminal fault.
    Error { message: String },
}

/// Human input supplied to a resume operation. Must match the kind of the
/// currently pending action; a mismatch degrades to a logged fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumePayload {
    ApprovalDecisions { decisions: Vec<ApprovalDecision> },
    ClarificationAnswers { answers: Vec<ClarificationAnswer> },
}

impl ResumePayload {
    fn kind(&self) -> &'static str {
        match self {
            ResumePayload::ApprovalDecisions { .. } => "approval_decisions",
            ResumePayload::ClarificationAnswers { .. } => "clarification_answers",
        }
    }
}

/// Drives turns for many independent conversation threads.
///
/// Collaborators are explicit handles threaded through every step call -
/// no process-wide mutable globals. Within one thread, steps execute
/// strictly one at a time; the engine does not defend against concurrent
/// resumes on the same thread (caller responsibility).
pub struct TurnEngine {
    reasoner: Arc<dyn ReasoningService>,
    provider: Arc<dyn ActionProvider>,
    store: Arc<dyn CheckpointStore>,
    catalog: CatalogConfig,
    cache: ActionCache,
}

impl TurnEngine {
    pub fn new(
        reasoner: Arc<dyn ReasoningService>,
        provider: Arc<dyn ActionProvider>,
        store: Arc<dyn CheckpointStore>,
        catalog: CatalogConfig,
    ) -> Self {
        Self {
            reasoner,
            provider,
            store,
            catalog,
            cache: ActionCache::new(),
        }
    }

    /// Drop cached action metadata; call when the provider's action set
    /// changes.
    pub async fn invalidate_actions(&self) {
        self.cache.invalidate().await;
    }

    /// Start a fresh turn for the given thread.
    pub async fn start_turn(&self, thread_id: &str, request: &str) -> TurnResult {
        info!(thread_id, "starting turn");
        let mut state = ConversationState::new(thread_id, request);
        match self.drive(&mut state, Node::Gate, Vec::new()).await {
            Ok(result) => result,
            Err(e) => {
                error!(thread_id, error = %e, "turn ended with error");
                TurnResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Resume a suspended turn with human input.
    pub async fn resume_turn(&self, thread_id: &str, payload: ResumePayload) -> TurnResult {
        match self.resume_inner(thread_id, payload).await {
            Ok(result) => result,
            Err(e) => {
                error!(thread_id, error = %e, "resume ended with error");
                TurnResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn resume_inner(
        &self,
        thread_id: &str,
        payload: ResumePayload,
    ) -> Result<TurnResult, TurnError> {
        let mut state = self
            .store
            .load(thread_id)
            .await
            .map_err(TurnError::Checkpoint)?
            .ok_or_else(|| TurnError::UnknownThread(thread_id.to_string()))?;

        info!(
            thread_id,
            pending = state.pending_action.kind(),
            payload = payload.kind(),
            "resuming turn"
        );

        let pending = state.pending_action.clone();
        match (pending, payload) {
            (
                PendingAction::Confirmation { invocations },
                ResumePayload::ApprovalDecisions { decisions },
            ) => {
                let (update, event) = confirm::reconcile_approvals(&state, &invocations, &decisions);
                self.commit(&mut state, update).await?;
                let ids = match &event {
                    StepEvent::ApprovalsReconciled { invocation_ids } => invocation_ids.clone(),
                    _ => Vec::new(),
                };
                let node = next_node(Node::Confirm, &event);
                self.drive(&mut state, node, ids).await
            }
            (
                PendingAction::Clarification { requests },
                ResumePayload::ClarificationAnswers { answers },
            ) => {
                let (update, event) =
                    clarify::reconcile_answers(&state, &requests, &answers, &self.catalog);
                self.commit(&mut state, update).await?;
                let ids = match &event {
                    StepEvent::AnswersReconciled { invocation_ids, .. } => invocation_ids.clone(),
                    _ => Vec::new(),
                };
                let node = next_node(Node::Clarify, &event);
                self.drive(&mut state, node, ids).await
            }
            (pending, payload) => {
                // Mismatched kind, or no pending action at all: never fail
                // hard, fall back to the execution step.
                warn!(
                    thread_id,
                    pending = pending.kind(),
                    payload = payload.kind(),
                    "resume payload does not match pending action; routing to execution step"
                );
                let update = StepUpdate {
                    pending_action: Some(PendingAction::None),
                    ..Default::default()
                };
                self.commit(&mut state, update).await?;
                self.drive(&mut state, Node::Execute, Vec::new()).await
            }
        }
    }

    /// Run the state machine until a terminal or suspended state.
    async fn drive(
        &self,
        state: &mut ConversationState,
        mut node: Node,
        mut invoke_ids: Vec<String>,
    ) -> Result<TurnResult, TurnError> {
        loop {
            match node {
                Node::Gate => {
                    let update =
                        gate::run_gate(self.reasoner.as_ref(), &self.catalog, state).await?;
                    self.commit(state, update).await?;
                    node = next_node(Node::Gate, &StepEvent::CategoriesResolved);
                }

                Node::Execute => {
                    let (update, event) = execute::run_execute(
                        self.reasoner.as_ref(),
                        self.provider.as_ref(),
                        &self.cache,
                        &self.catalog,
                        state,
                    )
                    .await?;
                    self.commit(state, update).await?;
                    if let StepEvent::InvocationsReady { invocation_ids } = &event {
                        invoke_ids = invocation_ids.clone();
                    }
                    node = next_node(Node::Execute, &event);
                }

                Node::Invoke => {
                    let ids = std::mem::take(&mut invoke_ids);
                    let (update, event) =
                        invoke::run_invoke(self.provider.as_ref(), state, &ids).await?;
                    self.commit(state, update).await?;
                    node = next_node(Node::Invoke, &event);
                }

                Node::Confirm => {
                    // Suspension point: state is already persisted with the
                    // pending marker; return control to the caller.
                    let PendingAction::Confirmation { invocations } = &state.pending_action
                    else {
                        warn!("confirm node without confirmation pending; re-executing");
                        node = Node::Execute;
                        continue;
                    };
                    return Ok(TurnResult::ConfirmationRequired {
                        thread_id: state.thread_id.clone(),
                        pending_confirmation: invocations.clone(),
                    });
                }

                Node::Clarify => {
                    let PendingAction::Clarification { requests } = &state.pending_action else {
                        warn!("clarify node without clarification pending; re-executing");
                        node = Node::Execute;
                        continue;
                    };
                    return Ok(TurnResult::ClarificationRequired {
                        thread_id: state.thread_id.clone(),
                        pending_clarification: requests.clone(),
                    });
                }

                Node::Authorize => {
                    // The checkpoint is retired below, so everything the
                    // caller needs from the elicitation goes into the result.
                    let (url, form_schema, message) = match &state.pending_action {
                        PendingAction::Authorization {
                            url,
                            form_schema,
                            message,
                            ..
                        } => (url.clone(), form_schema.clone(), message.clone()),
                        _ => (None, None, None),
                    };
                    let response =
                        message.unwrap_or_else(|| DEFAULT_AUTHORIZATION_MESSAGE.to_string());
                    self.retire(state).await?;
                    return Ok(TurnResult::AuthorizationRequired {
                        response,
                        url,
                        form_schema,
                    });
                }

                Node::Done => {
                    let response = state.final_response.clone().unwrap_or_default();
                    self.retire(state).await?;
                    return Ok(TurnResult::Success { response });
                }
            }
        }
    }

    /// Apply a step update atomically, then persist the aggregate.
    async fn commit(
        &self,
        state: &mut ConversationState,
        update: StepUpdate,
    ) -> Result<(), TurnError> {
        state.apply(update);
        self.store.save(state).await.map_err(TurnError::Checkpoint)
    }

    /// Retire a thread's checkpoint once its turn reached a terminal state.
    async fn retire(&self, state: &ConversationState) -> Result<(), TurnError> {
        self.store
            .remove(&state.thread_id)
            .await
            .map_err(TurnError::Checkpoint)
    }
}
