//! Action invocation step.
//!
//! Executes the approved invocation set against the provider, one at a
//! time, appending one result entry per invocation. An authorization fault
//! converts into a suspension: the first elicitation becomes the pending
//! action and filler results cover every still-open invocation of the
//! triggering agent entry so the transcript invariant holds. Any other
//! fault is unrecoverable and ends the turn; the transcript is left
//! deliberately unfinished for diagnostics.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::collaborators::{ActionProvider, Elicitation, ProviderFault};
use crate::error::TurnError;
use crate::state::{ConversationState, PendingAction, StepUpdate};
use crate::transcript::Entry;

use super::routing::StepEvent;

/// Filler content for invocations blocked by an authorization fault.
pub const AUTHENTICATION_REQUIRED_FILLER: &str =
    "Authentication required before this action can run.";

/// Default user-facing message when an elicitation carries none.
pub const DEFAULT_AUTHORIZATION_MESSAGE: &str = "Authentication required.";

/// Build the authorization pending action from a provider fault payload,
/// taking the first elicitation.
pub(crate) fn authorization_pending(elicitations: Vec<Elicitation>) -> PendingAction {
    let first = elicitations.into_iter().next().unwrap_or_else(|| {
        warn!("authorization fault carried no elicitations; synthesizing one");
        Elicitation {
            id: String::new(),
            url: None,
            form_schema: None,
            message: None,
        }
    });
    PendingAction::Authorization {
        elicitation_id: first.id,
        url: first.url,
        form_schema: first.form_schema,
        message: first.message,
    }
}

/// Invoke the given invocation ids from the last agent entry, in the order
/// they appear in that entry.
pub async fn run_invoke(
    provider: &dyn ActionProvider,
    state: &ConversationState,
    invocation_ids: &[String],
) -> Result<(StepUpdate, StepEvent), TurnError> {
    let Some((_, invocations)) = state.transcript.last_agent_entry() else {
        warn!("invocation step reached with no agent entry; nothing to run");
        return Ok((StepUpdate::default(), StepEvent::ResultsAppended));
    };
    let invocations = invocations.to_vec();

    let targets: HashSet<&str> = invocation_ids.iter().map(String::as_str).collect();
    let mut entries: Vec<Entry> = Vec::new();

    for invocation in invocations.iter().filter(|i| targets.contains(i.id.as_str())) {
        info!(id = %invocation.id, name = %invocation.name, "invoking action");
        match provider.invoke(&invocation.name, &invocation.arguments).await {
            Ok(output) => entries.push(Entry::result(&invocation.id, output)),
            Err(ProviderFault::AuthorizationRequired { elicitations }) => {
                info!(id = %invocation.id, name = %invocation.name, "authorization required");

                // Cover every invocation of the entry that has no result
                // yet - neither in the committed transcript nor in this
                // step's accrued results.
                let open: Vec<String> = state.transcript.uncovered_ids();
                let accrued: HashSet<String> = entries
                    .iter()
                    .filter_map(|e| match e {
                        Entry::Result { invocation_id, .. } => Some(invocation_id.clone()),
                        _ => None,
                    })
                    .collect();
                for id in open.iter().filter(|id| !accrued.contains(id.as_str())) {
                    entries.push(Entry::result(id, AUTHENTICATION_REQUIRED_FILLER));
                }

                let update = StepUpdate {
                    entries,
                    pending_action: Some(authorization_pending(elicitations)),
                    ..Default::default()
                };
                return Ok((update, StepEvent::AuthorizationCaptured));
            }
            Err(fault) => {
                // Unrecoverable. No fillers are synthesized here; the
                // committed agent entry stays uncovered for diagnostics.
                warn!(id = %invocation.id, name = %invocation.name, %fault, "provider fault");
                return Err(TurnError::Provider(fault));
            }
        }
    }

    Ok((
        StepUpdate {
            entries,
            ..Default::default()
        },
        StepEvent::ResultsAppended,
    ))
}
