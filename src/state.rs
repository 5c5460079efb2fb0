//! ConversationState - persistent per-thread aggregate.
//!
//! One logical state machine exists per conversation thread. Steps never
//! mutate the aggregate directly; they produce a [`StepUpdate`] that the
//! engine applies atomically and then persists. List-valued fields append,
//! scalar fields replace, absent fields leave the prior value untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transcript::{Entry, Transcript};

/// Current schema version for persisted state.
/// Bump when adding/removing/modifying fields.
pub const SCHEMA_VERSION: u32 = 1;

/// One clarification request awaiting a human answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub invocation_id: String,
    pub question: String,
    #[serde(default)]
    pub context: String,
}

/// One gated invocation awaiting a human approve/reject decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedInvocation {
    pub invocation_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Why the turn is suspended (or terminal-blocked), if at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    /// Awaiting human answers to clarification questions.
    Clarification { requests: Vec<ClarificationRequest> },
    /// Awaiting human approve/reject decisions for gated invocations.
    Confirmation { invocations: Vec<GatedInvocation> },
    /// Blocked on an out-of-band authorization elicitation.
    Authorization {
        elicitation_id: String,
        url: Option<String>,
        form_schema: Option<Value>,
        message: Option<String>,
    },
}

impl PendingAction {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::None => "none",
            PendingAction::Clarification { .. } => "clarification",
            PendingAction::Confirmation { .. } => "confirmation",
            PendingAction::Authorization { .. } => "authorization",
        }
    }
}

/// A rejected gated invocation with the human's feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedInvocation {
    pub invocation_id: String,
    pub name: String,
    pub feedback: String,
}

/// Outcome of a confirmation round, consumed by the routing decision that
/// follows the mediator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub all_approved: bool,
    pub approved_ids: Vec<String>,
    pub rejected: Vec<RejectedInvocation>,
}

/// Persistent aggregate for one conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Schema version for migration support.
    pub schema_version: u32,
    /// Thread identity this state is keyed by.
    pub thread_id: String,
    /// Turn start time in ISO8601 format.
    pub started_at: String,
    pub transcript: Transcript,
    /// Categories the catalog gate granted for this turn.
    #[serde(default)]
    pub allowed_categories: Vec<String>,
    #[serde(default)]
    pub pending_action: PendingAction,
    #[serde(default)]
    pub final_response: Option<String>,
    #[serde(default)]
    pub approval_outcome: Option<ApprovalOutcome>,
}

impl ConversationState {
    /// Fresh state seeded with the user's opening request.
    pub fn new(thread_id: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            thread_id: thread_id.into(),
            started_at: chrono::Utc::now().to_rfc3339(),
            transcript: Transcript::seeded(request),
            allowed_categories: Vec::new(),
            pending_action: PendingAction::None,
            final_response: None,
            approval_outcome: None,
        }
    }

    /// Apply one step's partial update.
    pub fn apply(&mut self, update: StepUpdate) {
        self.transcript.extend(update.entries);
        if let Some(categories) = update.allowed_categories {
            self.allowed_categories = categories;
        }
        if let Some(pending) = update.pending_action {
            self.pending_action = pending;
        }
        if let Some(response) = update.final_response {
            self.final_response = Some(response);
        }
        if let Some(outcome) = update.approval_outcome {
            self.approval_outcome = Some(outcome);
        }
    }
}

/// Partial update produced by a single step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepUpdate {
    /// Entries to append to the transcript.
    pub entries: Vec<Entry>,
    /// Replacement for the allowed category set.
    pub allowed_categories: Option<Vec<String>>,
    /// Replacement for the pending action marker.
    pub pending_action: Option<PendingAction>,
    pub final_response: Option<String>,
    pub approval_outcome: Option<ApprovalOutcome>,
}
