//! Action catalog gate.
//!
//! One reasoning call with a forced structured decision classifies the
//! request into the smallest sufficient set of permitted action categories.
//! The rationale is a diagnostic side-channel only - logged, never
//! persisted. The gate mutates no transcript.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::CatalogConfig;
use crate::collaborators::{ReasoningFault, ReasoningService};
use crate::error::TurnError;
use crate::prompts;
use crate::state::{ConversationState, StepUpdate};

/// Structured decision shape the gate forces out of the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateDecision {
    /// Free-form decision label (e.g. "allow", "refuse").
    pub decision: String,
    /// Diagnostic explanation; never persisted into conversation state.
    pub rationale: String,
    /// Category tags granted for this turn.
    pub categories: Vec<String>,
}

/// Run the gate and produce the allowed-category update.
pub async fn run_gate(
    reasoner: &dyn ReasoningService,
    catalog: &CatalogConfig,
    state: &ConversationState,
) -> Result<StepUpdate, TurnError> {
    let instructions = prompts::gate_instructions(&catalog.category_names())?;
    let schema = serde_json::to_value(schema_for!(GateDecision))
        .map_err(|e| TurnError::Gate(ReasoningFault::Malformed(e.to_string())))?;

    let value = reasoner
        .complete_structured(&state.transcript, &instructions, &schema)
        .await
        .map_err(TurnError::Gate)?;

    let decision: GateDecision = serde_json::from_value(value)
        .map_err(|e| TurnError::Gate(ReasoningFault::Malformed(e.to_string())))?;

    let categories = catalog.clamp_categories(decision.categories);
    if categories.is_empty() {
        info!(
            decision = %decision.decision,
            rationale = %decision.rationale,
            "gate granted no categories"
        );
    } else {
        info!(
            decision = %decision.decision,
            rationale = %decision.rationale,
            ?categories,
            "gate resolved allowed categories"
        );
    }

    Ok(StepUpdate {
        allowed_categories: Some(categories),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ActionDescriptor, AgentReply};
    use crate::transcript::Transcript;
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedGate(Value);

    #[async_trait]
    impl ReasoningService for FixedGate {
        async fn complete(
            &self,
            _transcript: &Transcript,
            _instructions: &str,
            _actions: &[ActionDescriptor],
        ) -> Result<AgentReply, ReasoningFault> {
            unreachable!("gate tests only call complete_structured")
        }

        async fn complete_structured(
            &self,
            _transcript: &Transcript,
            _instructions: &str,
            schema: &Value,
        ) -> Result<Value, ReasoningFault> {
            // The engine always passes a schema with properties.
            assert!(schema.get("properties").is_some() || schema.get("$defs").is_some());
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_gate_resolves_and_clamps_categories() {
        let reasoner = FixedGate(serde_json::json!({
            "decision": "allow",
            "rationale": "calendar request",
            "categories": ["calendar", "nonsense"]
        }));
        let catalog = CatalogConfig::default();
        let state = ConversationState::new("t1", "what's on my calendar?");

        let update = run_gate(&reasoner, &catalog, &state).await.unwrap();
        assert_eq!(update.allowed_categories, Some(vec!["calendar".to_string()]));
        // The gate never mutates the transcript.
        assert!(update.entries.is_empty());
    }

    #[tokio::test]
    async fn test_gate_refusal_yields_empty_set() {
        let reasoner = FixedGate(serde_json::json!({
            "decision": "refuse",
            "rationale": "no category applies",
            "categories": []
        }));
        let catalog = CatalogConfig::default();
        let state = ConversationState::new("t1", "fly me to the moon");

        let update = run_gate(&reasoner, &catalog, &state).await.unwrap();
        assert_eq!(update.allowed_categories, Some(vec![]));
    }

    #[tokio::test]
    async fn test_gate_malformed_decision_is_gate_fault() {
        let reasoner = FixedGate(serde_json::json!({"unexpected": true}));
        let catalog = CatalogConfig::default();
        let state = ConversationState::new("t1", "req");

        let err = run_gate(&reasoner, &catalog, &state).await.unwrap_err();
        assert!(matches!(err, TurnError::Gate(_)));
    }
}
