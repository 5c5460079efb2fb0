pub mod catalog;
pub mod checkpoint;
pub mod collaborators;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod scripted;
pub mod state;
pub mod transcript;

// Re-export main types
pub use catalog::{clarification_descriptor, ActionCache, CatalogConfig, CLARIFICATION_ACTION};
pub use checkpoint::{CheckpointStore, FileCheckpoints, MemoryCheckpoints};
pub use collaborators::{
    ActionDescriptor, ActionProvider, AgentReply, Elicitation, ProviderFault, ReasoningFault,
    ReasoningService,
};
pub use error::TurnError;
pub use orchestrator::{
    ApprovalDecision, ClarificationAnswer, ResumePayload, TurnEngine, TurnResult,
};
pub use state::{
    ApprovalOutcome, ClarificationRequest, ConversationState, GatedInvocation, PendingAction,
    RejectedInvocation, StepUpdate,
};
pub use transcript::{CoverageViolation, Entry, Invocation, Transcript};

// Re-export the scripted harness
pub use scripted::{Scenario, ScriptedProvider, ScriptedReasoner};
