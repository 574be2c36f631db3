//! Loaded session records.
//!
//! A session is created by an external claim flow; the orchestrator only
//! reads it and appends messages. It carries either a predefined scenario
//! (name, persona, per-role model + system prompt) or a set of custom
//! per-role prompts generated out-of-band, plus an optional quota-bearing
//! invitation link.

use serde::{Deserialize, Serialize};

use crate::message::StoredMessage;
use crate::quota::QuotaDefinition;

/// Model and system prompt for one AI role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePrompt {
    /// Provider model identifier.
    pub model: String,
    /// System prompt for the role.
    pub system_prompt: String,
}

/// A predefined practice scenario.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Display name.
    pub name: String,
    /// Partner persona description.
    pub persona: String,
    /// Partner role configuration.
    pub partner: RolePrompt,
    /// Coach role configuration.
    pub coach: RolePrompt,
}

/// Per-role prompt configuration: a predefined scenario or custom prompts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PromptConfig {
    /// Predefined scenario.
    Scenario(Scenario),
    /// Custom per-role prompts generated out-of-band.
    #[serde(rename_all = "camelCase")]
    Custom {
        /// Partner role configuration.
        partner: RolePrompt,
        /// Coach role configuration.
        coach: RolePrompt,
    },
}

impl PromptConfig {
    /// Partner role configuration.
    #[must_use]
    pub fn partner(&self) -> &RolePrompt {
        match self {
            Self::Scenario(s) => &s.partner,
            Self::Custom { partner, .. } => partner,
        }
    }

    /// Coach role configuration.
    #[must_use]
    pub fn coach(&self) -> &RolePrompt {
        match self {
            Self::Scenario(s) => &s.coach,
            Self::Custom { coach, .. } => coach,
        }
    }

    /// Summary sent to clients in the `connected` frame.
    #[must_use]
    pub fn summary(&self) -> ScenarioSummary {
        match self {
            Self::Scenario(s) => ScenarioSummary {
                name: Some(s.name.clone()),
                persona: Some(s.persona.clone()),
            },
            Self::Custom { .. } => ScenarioSummary {
                name: None,
                persona: None,
            },
        }
    }
}

/// Client-facing scenario summary. Both fields are `None` for custom
/// sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    /// Scenario name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partner persona.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

/// Quota-bearing invitation reference on a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationLink {
    /// Invitation id.
    pub invitation_id: String,
    /// Token budget granted by the invitation.
    pub quota: QuotaDefinition,
}

/// A loaded session, consumed (never owned) by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id.
    pub id: String,
    /// Owning user id.
    pub user_id: String,
    /// Prompt configuration.
    pub prompts: PromptConfig,
    /// Optional invitation linkage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation: Option<InvitationLink>,
    /// Prior message history, ascending by id.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}
