//! Scripted collaborators for tests and the CLI demo.
//!
//! A scenario is a YAML file with a canned gate decision, a sequence of
//! agent replies, and a table of action outputs. The reasoner picks the
//! reply indexed by the number of agent entries already committed to the
//! transcript, so a suspended thread resumed by a fresh process continues
//! deterministically. Note that mediators synthesize agent entries too;
//! scenario authors must count those.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::{
    ActionDescriptor, ActionProvider, AgentReply, Elicitation, ProviderFault, ReasoningFault,
    ReasoningService,
};
use crate::transcript::{Invocation, Transcript};

/// Bundled demo scenario: a calendar request with one gated invocation.
pub const DEFAULT_SCENARIO: &str = include_str!("../scenarios/demo.yaml");

/// Canned gate decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedGate {
    pub decision: String,
    pub rationale: String,
    pub categories: Vec<String>,
}

/// One canned agent reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedReply {
    pub text: String,
    #[serde(default)]
    pub invocations: Vec<Invocation>,
}

/// A full scripted run: gate decision, replies, actions, and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub gate: ScriptedGate,
    #[serde(default)]
    pub replies: Vec<ScriptedReply>,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    /// Action name -> canned output. Missing names get a generic line.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Action names that raise an authorization fault instead of running.
    #[serde(default)]
    pub auth_actions: Vec<String>,
    /// Raise an authorization fault from the action listing itself.
    #[serde(default)]
    pub auth_catalog: bool,
    /// Elicitation attached to authorization faults.
    #[serde(default)]
    pub elicitation: Option<Elicitation>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            gate: ScriptedGate {
                decision: "allow".to_string(),
                rationale: "scripted default".to_string(),
                categories: vec!["calendar".to_string()],
            },
            replies: Vec::new(),
            actions: Vec::new(),
            outputs: BTreeMap::new(),
            auth_actions: Vec::new(),
            auth_catalog: false,
            elicitation: None,
        }
    }
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read scenario: {path:?}"))?;
        serde_yaml::from_str(&content).context("Failed to parse scenario YAML")
    }

    /// The bundled demo scenario.
    pub fn bundled() -> Result<Self> {
        serde_yaml::from_str(DEFAULT_SCENARIO).context("Failed to parse bundled scenario")
    }

    /// Load from a file, falling back to the bundled scenario.
    pub fn load_or_bundled(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::bundled(),
        }
    }
}

/// Reasoning service that replays a scenario.
#[derive(Debug, Clone)]
pub struct ScriptedReasoner {
    scenario: Scenario,
}

impl ScriptedReasoner {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete(
        &self,
        transcript: &Transcript,
        _instructions: &str,
        _actions: &[ActionDescriptor],
    ) -> Result<AgentReply, ReasoningFault> {
        let index = transcript.agent_entry_count();
        let reply = self.scenario.replies.get(index).ok_or_else(|| {
            ReasoningFault::Backend(format!("scripted scenario exhausted at reply {index}"))
        })?;
        Ok(AgentReply {
            text: reply.text.clone(),
            invocations: reply.invocations.clone(),
        })
    }

    async fn complete_structured(
        &self,
        _transcript: &Transcript,
        _instructions: &str,
        _schema: &Value,
    ) -> Result<Value, ReasoningFault> {
        serde_json::to_value(&self.scenario.gate)
            .map_err(|e| ReasoningFault::Malformed(e.to_string()))
    }
}

/// Action provider that answers from the scenario's output table.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    scenario: Scenario,
}

impl ScriptedProvider {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    fn elicitation(&self) -> Elicitation {
        self.scenario.elicitation.clone().unwrap_or(Elicitation {
            id: "elicitation-1".to_string(),
            url: None,
            form_schema: None,
            message: None,
        })
    }
}

#[async_trait]
impl ActionProvider for ScriptedProvider {
    async fn list_actions(&self) -> Result<Vec<ActionDescriptor>, ProviderFault> {
        if self.scenario.auth_catalog {
            return Err(ProviderFault::AuthorizationRequired {
                elicitations: vec![self.elicitation()],
            });
        }
        Ok(self.scenario.actions.clone())
    }

    async fn invoke(&self, name: &str, _arguments: &Value) -> Result<String, ProviderFault> {
        if self.scenario.auth_actions.iter().any(|a| a == name) {
            return Err(ProviderFault::AuthorizationRequired {
                elicitations: vec![self.elicitation()],
            });
        }
        Ok(self
            .scenario
            .outputs
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{name} completed")))
    }
}
