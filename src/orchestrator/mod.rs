pub mod clarify;
pub mod confirm;
pub mod engine;
pub mod execute;
pub mod gate;
pub mod invoke;
pub mod routing;

pub use clarify::{ClarificationAnswer, DEFERRED_FILLER, NO_ANSWER_PROVIDED};
pub use confirm::{
    ApprovalDecision, APPROVED_FILLER, AUTO_APPROVED_FILLER, DEFAULT_REJECTION_FEEDBACK,
};
pub use engine::{ResumePayload, TurnEngine, TurnResult};
pub use gate::GateDecision;
pub use invoke::{AUTHENTICATION_REQUIRED_FILLER, DEFAULT_AUTHORIZATION_MESSAGE};
pub use routing::{next_node, Node, StepEvent};
