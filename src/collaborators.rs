//! Collaborator seams: the reasoning service and the action provider.
//!
//! The core treats text generation and action execution as external
//! collaborators behind async traits, so backends are substitutable without
//! touching step logic. Fault types live here too; the provider's
//! authorization condition is a typed variant rather than a stringly fault
//! code leaking through the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::transcript::{Invocation, Transcript};

/// Wire-level fault code providers use to signal an authorization
/// elicitation. Provider implementations map this code to
/// [`ProviderFault::AuthorizationRequired`]; any other fault code is
/// unrecoverable.
pub const AUTHORIZATION_FAULT_CODE: &str = "elicitation_required";

/// Metadata for one action the provider can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the action's arguments, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// One reasoning-call result: response text plus requested invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub invocations: Vec<Invocation>,
}

/// Provider-issued request for out-of-band human action, e.g. visiting an
/// authorization URL or filling a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elicitation {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub form_schema: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Faults raised by the reasoning service.
#[derive(Debug, Error)]
pub enum ReasoningFault {
    #[error("reasoning backend error: {0}")]
    Backend(String),
    #[error("malformed structured decision: {0}")]
    Malformed(String),
}

/// Faults raised by the action provider.
#[derive(Debug, Error)]
pub enum ProviderFault {
    /// Recoverable by design: the turn suspends and surfaces the first
    /// elicitation to the caller.
    #[error("authorization required ({} elicitation(s))", elicitations.len())]
    AuthorizationRequired { elicitations: Vec<Elicitation> },
    /// Unrecoverable invocation failure.
    #[error("action `{name}` failed: {message}")]
    Invocation { name: String, message: String },
    /// Unrecoverable catalog fetch failure.
    #[error("action catalog fetch failed: {0}")]
    Catalog(String),
}

/// Text-generation collaborator.
///
/// Called once per turn for the catalog gate (structured decision) and once
/// per execution step (possibly several times per turn across resumes).
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// One completion bound to the given action set.
    async fn complete(
        &self,
        transcript: &Transcript,
        instructions: &str,
        actions: &[ActionDescriptor],
    ) -> Result<AgentReply, ReasoningFault>;

    /// One completion forced into the given JSON schema.
    async fn complete_structured(
        &self,
        transcript: &Transcript,
        instructions: &str,
        schema: &Value,
    ) -> Result<Value, ReasoningFault>;
}

/// Side-effecting action backend.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Enumerate the actions this provider can execute.
    async fn list_actions(&self) -> Result<Vec<ActionDescriptor>, ProviderFault>;

    /// Execute one action and return its textual output.
    async fn invoke(&self, name: &str, arguments: &Value) -> Result<String, ProviderFault>;
}
