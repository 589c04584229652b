//! Agent construction from user input or from the generator.

use std::sync::Arc;

use serde::Deserialize;

use super::{Agent, AgentCreationOptions};
use crate::error::{LabError, Result};
use crate::llm::{MessageGenerator, Prompt, PromptKind};

const PROFILE_SYSTEM_PROMPT: &str = "You design characters for a simulated panel discussion. \
Reply with a single JSON object and nothing else. Keys: name (string), personality (string), \
background (string), expertise (array of strings), beliefs (array of strings), \
quirks (array of strings), communicationStyle (string).";

/// Profile shape the generator is asked to return.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedProfile {
    name: String,
    #[serde(default)]
    personality: String,
    #[serde(default)]
    background: String,
    #[serde(default)]
    expertise: Vec<String>,
    #[serde(default)]
    beliefs: Vec<String>,
    #[serde(default)]
    quirks: Vec<String>,
    #[serde(default, alias = "communication")]
    communication_style: String,
}

/// Builds agents for an experiment.
pub struct AgentFactory {
    generator: Arc<dyn MessageGenerator>,
}

impl AgentFactory {
    /// Factory using `generator` for random profiles.
    pub fn new(generator: Arc<dyn MessageGenerator>) -> Self {
        Self { generator }
    }

    /// Build a user-authored agent.
    pub fn create(&self, options: AgentCreationOptions) -> Result<Agent> {
        let name = options.name.trim();
        if name.is_empty() {
            return Err(LabError::validation("agent name must not be empty"));
        }
        if options.conversation_topic.trim().is_empty() {
            return Err(LabError::validation("conversation topic must not be empty"));
        }

        Ok(Agent {
            name: name.to_string(),
            personality: options.personality.trim().to_string(),
            background: options.background.trim().to_string(),
            expertise: options.expertise,
            beliefs: options.beliefs,
            quirks: options.quirks,
            communication_style: options.communication_style.trim().to_string(),
            is_random: false,
        })
    }

    /// Ask the generator for a persona relevant to `topic`.
    pub async fn random(&self, topic: &str) -> Result<Agent> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(LabError::validation("topic must not be empty"));
        }

        let prompt = Prompt {
            kind: PromptKind::AgentProfile,
            system: PROFILE_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Invent one distinctive participant with a strong, specific point of view on: {topic}"
            ),
            topic: topic.to_string(),
            speaker: None,
            turn: 0,
        };

        let reply = self.generator.complete(&prompt).await?;
        let agent = parse_profile(&reply)?;
        tracing::info!(agent = %agent.name, topic, "random agent created");
        Ok(agent)
    }
}

/// Pull the first JSON object out of a model reply.
///
/// Replies often wrap the object in prose or a fenced code block.
fn parse_profile(reply: &str) -> Result<Agent> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        _ => {
            return Err(LabError::Generation(
                "agent profile reply contained no JSON object".to_string(),
            ))
        },
    };

    let profile: GeneratedProfile = serde_json::from_str(json)
        .map_err(|e| LabError::Generation(format!("agent profile is not valid JSON: {e}")))?;

    let name = profile.name.trim().to_string();
    if name.is_empty() {
        return Err(LabError::Generation("agent profile has an empty name".to_string()));
    }

    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    Ok(Agent {
        name,
        personality: profile.personality,
        background: profile.background,
        expertise: clean(profile.expertise),
        beliefs: clean(profile.beliefs),
        quirks: clean(profile.quirks),
        communication_style: profile.communication_style,
        is_random: true,
    })
}
