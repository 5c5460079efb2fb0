//! Execution step.
//!
//! Resolves the concrete action set (allowed categories plus the
//! clarification pseudo-action), issues one reasoning call, appends the
//! result as a new agent entry, and classifies it. Precedence, highest
//! first: clarification, confirmation, plain invocation, final answer.
//! Clarification always wins when both it and gated invocations appear in
//! one result.

use tracing::{debug, info};

use crate::catalog::{clarification_descriptor, ActionCache, CatalogConfig, CLARIFICATION_ACTION};
use crate::collaborators::{ActionProvider, ProviderFault, ReasoningService};
use crate::error::TurnError;
use crate::prompts;
use crate::state::{ClarificationRequest, ConversationState, GatedInvocation, PendingAction, StepUpdate};
use crate::transcript::Entry;

use super::invoke::authorization_pending;
use super::routing::StepEvent;

/// Run one execution step against the current state.
pub async fn run_execute(
    reasoner: &dyn ReasoningService,
    provider: &dyn ActionProvider,
    cache: &ActionCache,
    catalog: &CatalogConfig,
    state: &ConversationState,
) -> Result<(StepUpdate, StepEvent), TurnError> {
    let all = match cache.fetch(provider).await {
        Ok(descriptors) => descriptors,
        Err(ProviderFault::AuthorizationRequired { elicitations }) => {
            // The catalog fetch itself needs authorization. No invocations
            // are outstanding, so the turn suspends without filler results.
            info!("authorization required while fetching action metadata");
            let update = StepUpdate {
                pending_action: Some(authorization_pending(elicitations)),
                ..Default::default()
            };
            return Ok((update, StepEvent::AuthorizationCaptured));
        }
        Err(fault) => return Err(TurnError::Provider(fault)),
    };

    let allowed = catalog.allowed_names(&state.allowed_categories);
    let mut actions: Vec<_> = all
        .into_iter()
        .filter(|d| allowed.contains(&d.name))
        .collect();
    actions.push(clarification_descriptor());
    debug!(count = actions.len(), "resolved action set for execution step");

    let instructions = prompts::executor_instructions(&actions)?;
    let reply = reasoner
        .complete(&state.transcript, &instructions, &actions)
        .await
        .map_err(TurnError::Execution)?;

    let entry = Entry::Agent {
        text: reply.text.clone(),
        invocations: reply.invocations.clone(),
    };

    // 1. Clarification pre-empts everything, gated invocations included.
    let clarifications: Vec<ClarificationRequest> = reply
        .invocations
        .iter()
        .filter(|i| i.name == CLARIFICATION_ACTION)
        .map(|i| ClarificationRequest {
            invocation_id: i.id.clone(),
            question: i
                .arguments
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            context: i
                .arguments
                .get("context")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
        .collect();

    if !clarifications.is_empty() {
        info!(count = clarifications.len(), "agent requested clarification");
        let update = StepUpdate {
            entries: vec![entry],
            pending_action: Some(PendingAction::Clarification {
                requests: clarifications,
            }),
            ..Default::default()
        };
        return Ok((update, StepEvent::ClarificationRequested));
    }

    // 2. Gated invocations need human confirmation. Ungated invocations in
    // the same entry stay inside the agent entry; the mediator resolves
    // them later.
    let gated: Vec<GatedInvocation> = reply
        .invocations
        .iter()
        .filter(|i| catalog.is_gated(&i.name))
        .map(|i| GatedInvocation {
            invocation_id: i.id.clone(),
            name: i.name.clone(),
            arguments: i.arguments.clone(),
        })
        .collect();

    if !gated.is_empty() {
        info!(count = gated.len(), "gated invocations need confirmation");
        let update = StepUpdate {
            entries: vec![entry],
            pending_action: Some(PendingAction::Confirmation { invocations: gated }),
            ..Default::default()
        };
        return Ok((update, StepEvent::ConfirmationRequested));
    }

    // 3. Plain invocations run directly.
    if !reply.invocations.is_empty() {
        let ids = reply.invocations.iter().map(|i| i.id.clone()).collect();
        let update = StepUpdate {
            entries: vec![entry],
            ..Default::default()
        };
        return Ok((update, StepEvent::InvocationsReady { invocation_ids: ids }));
    }

    // 4. No invocations: final answer reached.
    info!("final answer reached");
    let update = StepUpdate {
        entries: vec![entry],
        final_response: Some(reply.text),
        ..Default::default()
    };
    Ok((update, StepEvent::FinalAnswer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ActionDescriptor, AgentReply, ReasoningFault};
    use crate::transcript::{Invocation, Transcript};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedReply(AgentReply);

    #[async_trait]
    impl ReasoningService for FixedReply {
        async fn complete(
            &self,
            _transcript: &Transcript,
            instructions: &str,
            actions: &[ActionDescriptor],
        ) -> Result<AgentReply, ReasoningFault> {
            // The clarification pseudo-action is always offered.
            assert!(actions.iter().any(|a| a.name == CLARIFICATION_ACTION));
            assert!(instructions.contains(CLARIFICATION_ACTION));
            Ok(self.0.clone())
        }

        async fn complete_structured(
            &self,
            _transcript: &Transcript,
            _instructions: &str,
            _schema: &Value,
        ) -> Result<Value, ReasoningFault> {
            unreachable!("execution tests never call the structured path")
        }
    }

    struct StaticProvider(Vec<ActionDescriptor>);

    #[async_trait]
    impl ActionProvider for StaticProvider {
        async fn list_actions(&self) -> Result<Vec<ActionDescriptor>, ProviderFault> {
            Ok(self.0.clone())
        }

        async fn invoke(&self, _name: &str, _args: &Value) -> Result<String, ProviderFault> {
            unreachable!("execution tests never invoke")
        }
    }

    /// Provider whose action listing itself is behind an authorization wall.
    struct LockedProvider;

    #[async_trait]
    impl ActionProvider for LockedProvider {
        async fn list_actions(&self) -> Result<Vec<ActionDescriptor>, ProviderFault> {
            Err(ProviderFault::AuthorizationRequired {
                elicitations: vec![crate::collaborators::Elicitation {
                    id: "e1".into(),
                    url: Some("https://auth".into()),
                    form_schema: None,
                    message: Some("Please authenticate".into()),
                }],
            })
        }

        async fn invoke(&self, _name: &str, _args: &Value) -> Result<String, ProviderFault> {
            unreachable!("the listing already faulted")
        }
    }

    fn descriptors() -> Vec<ActionDescriptor> {
        ["list_events", "create_event"]
            .into_iter()
            .map(|name| ActionDescriptor {
                name: name.into(),
                description: String::new(),
                parameters: None,
            })
            .collect()
    }

    fn calendar_state() -> ConversationState {
        let mut state = ConversationState::new("t1", "req");
        state.allowed_categories = vec!["calendar".into()];
        state
    }

    fn inv(id: &str, name: &str, args: Value) -> Invocation {
        Invocation {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn test_clarification_wins_over_confirmation() {
        let reply = AgentReply {
            text: "need more info".into(),
            invocations: vec![
                inv("1", CLARIFICATION_ACTION, json!({"question": "which day?"})),
                inv("2", "create_event", json!({})),
            ],
        };
        let reasoner = FixedReply(reply);
        let provider = StaticProvider(descriptors());
        let cache = ActionCache::new();
        let catalog = CatalogConfig::default();
        let state = calendar_state();

        let (update, event) = run_execute(&reasoner, &provider, &cache, &catalog, &state)
            .await
            .unwrap();

        assert_eq!(event, StepEvent::ClarificationRequested);
        match update.pending_action {
            Some(PendingAction::Clarification { requests }) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].invocation_id, "1");
                assert_eq!(requests[0].question, "which day?");
            }
            other => panic!("expected clarification pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gated_invocations_request_confirmation() {
        let reply = AgentReply {
            text: "creating".into(),
            invocations: vec![
                inv("1", "create_event", json!({"title": "standup"})),
                inv("2", "list_events", json!({})),
            ],
        };
        let reasoner = FixedReply(reply);
        let provider = StaticProvider(descriptors());
        let cache = ActionCache::new();
        let catalog = CatalogConfig::default();
        let state = calendar_state();

        let (update, event) = run_execute(&reasoner, &provider, &cache, &catalog, &state)
            .await
            .unwrap();

        assert_eq!(event, StepEvent::ConfirmationRequested);
        match update.pending_action {
            Some(PendingAction::Confirmation { invocations }) => {
                // Only the gated invocation is held for confirmation.
                assert_eq!(invocations.len(), 1);
                assert_eq!(invocations[0].invocation_id, "1");
            }
            other => panic!("expected confirmation pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_invocations_route_to_invoke() {
        let reply = AgentReply {
            text: "listing".into(),
            invocations: vec![inv("1", "list_events", json!({}))],
        };
        let reasoner = FixedReply(reply);
        let provider = StaticProvider(descriptors());
        let cache = ActionCache::new();
        let catalog = CatalogConfig::default();
        let state = calendar_state();

        let (update, event) = run_execute(&reasoner, &provider, &cache, &catalog, &state)
            .await
            .unwrap();

        assert_eq!(
            event,
            StepEvent::InvocationsReady {
                invocation_ids: vec!["1".to_string()]
            }
        );
        assert!(update.pending_action.is_none());
    }

    #[tokio::test]
    async fn test_authorization_fault_during_catalog_fetch_suspends() {
        let reply = AgentReply {
            text: "never reached".into(),
            invocations: vec![],
        };
        let reasoner = FixedReply(reply);
        let provider = LockedProvider;
        let cache = ActionCache::new();
        let catalog = CatalogConfig::default();
        let state = calendar_state();

        let (update, event) = run_execute(&reasoner, &provider, &cache, &catalog, &state)
            .await
            .unwrap();

        // No reasoning call happened, so there is nothing to append and
        // nothing to fill; the turn just suspends on the elicitation.
        assert_eq!(event, StepEvent::AuthorizationCaptured);
        assert!(update.entries.is_empty());
        match update.pending_action {
            Some(PendingAction::Authorization {
                elicitation_id,
                url,
                message,
                ..
            }) => {
                assert_eq!(elicitation_id, "e1");
                assert_eq!(url.as_deref(), Some("https://auth"));
                assert_eq!(message.as_deref(), Some("Please authenticate"));
            }
            other => panic!("expected authorization pending, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_invocations_is_final_answer() {
        let reply = AgentReply {
            text: "you have 3 events".into(),
            invocations: vec![],
        };
        let reasoner = FixedReply(reply);
        let provider = StaticProvider(descriptors());
        let cache = ActionCache::new();
        let catalog = CatalogConfig::default();
        let state = calendar_state();

        let (update, event) = run_execute(&reasoner, &provider, &cache, &catalog, &state)
            .await
            .unwrap();

        assert_eq!(event, StepEvent::FinalAnswer);
        assert_eq!(update.final_response.as_deref(), Some("you have 3 events"));
    }
}
