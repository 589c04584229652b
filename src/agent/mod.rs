//! Agent profiles.
//!
//! An [`Agent`] is a configured persona taking part in a simulated
//! discussion. Agents are immutable once created: the experiment owns them
//! until the session is saved, after which a copy is embedded in the session
//! record.
//!
//! Agents come from two places:
//!
//! - user-authored profiles ([`AgentCreationOptions`] → [`AgentFactory::create`])
//! - randomly generated profiles relevant to a topic ([`AgentFactory::random`])

mod factory;

pub use factory::AgentFactory;

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{LabError, Result};

/// Conversational persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Display name; messages reference agents by this name
    pub name: String,
    /// Free-text personality description
    #[serde(default)]
    pub personality: String,
    /// Free-text background
    #[serde(default)]
    pub background: String,
    /// Ordered expertise tags
    #[serde(default, deserialize_with = "string_list")]
    pub expertise: Vec<String>,
    /// Held beliefs
    #[serde(default, deserialize_with = "string_list")]
    pub beliefs: Vec<String>,
    /// Behavioral quirks
    #[serde(default, deserialize_with = "string_list")]
    pub quirks: Vec<String>,
    /// How the agent talks
    #[serde(default, alias = "communication")]
    pub communication_style: String,
    /// True for generated agents, false for user-authored ones
    #[serde(default)]
    pub is_random: bool,
}

impl Agent {
    /// One-paragraph persona description used in prompts.
    pub fn persona_summary(&self) -> String {
        let mut out = format!("You are {}.", self.name);
        if !self.personality.is_empty() {
            out.push_str(&format!(" Personality: {}.", self.personality.trim_end_matches('.')));
        }
        if !self.background.is_empty() {
            out.push_str(&format!(" Background: {}.", self.background.trim_end_matches('.')));
        }
        if !self.expertise.is_empty() {
            out.push_str(&format!(" Expertise: {}.", self.expertise.join(", ")));
        }
        if !self.beliefs.is_empty() {
            out.push_str(&format!(" Beliefs: {}.", self.beliefs.join("; ")));
        }
        if !self.quirks.is_empty() {
            out.push_str(&format!(" Quirks: {}.", self.quirks.join("; ")));
        }
        if !self.communication_style.is_empty() {
            out.push_str(&format!(
                " Communication style: {}.",
                self.communication_style.trim_end_matches('.')
            ));
        }
        out
    }
}

/// Request body for creating a user-authored agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCreationOptions {
    /// Agent name
    #[serde(default)]
    pub name: String,
    /// Personality description
    #[serde(default)]
    pub personality: String,
    /// Background
    #[serde(default)]
    pub background: String,
    /// Expertise tags (array or comma-separated string)
    #[serde(default, deserialize_with = "string_list")]
    pub expertise: Vec<String>,
    /// Beliefs (array or comma-separated string)
    #[serde(default, deserialize_with = "string_list")]
    pub beliefs: Vec<String>,
    /// Quirks (array or comma-separated string)
    #[serde(default, deserialize_with = "string_list")]
    pub quirks: Vec<String>,
    /// Communication style
    #[serde(default, alias = "communication")]
    pub communication_style: String,
    /// Topic of the experiment the agent is created for
    #[serde(default, alias = "topic")]
    pub conversation_topic: String,
}

/// Reject rosters that cannot produce a well-formed transcript.
///
/// Requires at least two agents with non-empty, pairwise distinct names, so
/// that every message's `agentName` matches exactly one roster entry.
pub fn validate_roster(agents: &[Agent]) -> Result<()> {
    if agents.len() < 2 {
        return Err(LabError::validation(format!(
            "at least two agents are required, got {}",
            agents.len()
        )));
    }

    let mut seen = HashSet::with_capacity(agents.len());
    for agent in agents {
        let name = agent.name.trim();
        if name.is_empty() {
            return Err(LabError::validation("agent name must not be empty"));
        }
        if !seen.insert(name) {
            return Err(LabError::validation(format!("duplicate agent name: {name}")));
        }
    }
    Ok(())
}

/// Accepts `["a", "b"]`, `"a, b"` or `null`.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Csv(String),
        Null,
    }

    let raw = match Option::<ListOrString>::deserialize(deserializer)? {
        Some(ListOrString::List(items)) => items,
        Some(ListOrString::Csv(s)) => s.split(',').map(str::to_string).collect(),
        Some(ListOrString::Null) | None => Vec::new(),
    };

    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
pub(crate) fn test_agent(name: &str) -> Agent {
    Agent {
        name: name.to_string(),
        personality: "curious".to_string(),
        background: "engineer".to_string(),
        expertise: vec!["systems".to_string()],
        beliefs: vec![],
        quirks: vec![],
        communication_style: "direct".to_string(),
        is_random: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_json_is_camel_case() {
        let agent = test_agent("Ada");
        let json = serde_json::to_value(&agent).unwrap();
        assert_eq!(json["communicationStyle"], "direct");
        assert_eq!(json["isRandom"], false);
    }

    #[test]
    fn test_options_accept_csv_lists() {
        let options: AgentCreationOptions = serde_json::from_str(
            r#"{"name":"Grace","expertise":"compilers, navy ,","beliefs":["order"],
                "communication":"crisp","conversationTopic":"Space"}"#,
        )
        .unwrap();
        assert_eq!(options.expertise, vec!["compilers", "navy"]);
        assert_eq!(options.beliefs, vec!["order"]);
        assert_eq!(options.communication_style, "crisp");
        assert!(options.quirks.is_empty());
    }

    #[test]
    fn test_roster_validation() {
        assert!(validate_roster(&[test_agent("Ada")]).is_err());
        assert!(validate_roster(&[test_agent("Ada"), test_agent("Ada")]).is_err());
        assert!(validate_roster(&[test_agent("Ada"), test_agent(" ")]).is_err());
        assert!(validate_roster(&[test_agent("Ada"), test_agent("Grace")]).is_ok());
    }

    #[test]
    fn test_persona_summary_skips_empty_fields() {
        let mut agent = test_agent("Ada");
        agent.background.clear();
        let summary = agent.persona_summary();
        assert!(summary.starts_with("You are Ada."));
        assert!(!summary.contains("Background"));
        assert!(summary.contains("Expertise: systems."));
    }
}
