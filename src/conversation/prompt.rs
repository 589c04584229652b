//! Turn prompts and message cleaning.

use regex::Regex;

use super::Message;
use crate::agent::Agent;
use crate::llm::{Prompt, PromptKind};

const TURN_INSTRUCTIONS: &str = "Stay in character. Reply with your next message only: \
no name label, no stage directions, at most 80 words. React to what others said when it is relevant.";

/// Build the prompt for turn `turn`, spoken by `speaker`.
///
/// The prompt carries the topic, the roster, the full prior transcript and the
/// speaker's profile.
pub fn turn_prompt(
    topic: &str,
    speaker: &Agent,
    roster: &[Agent],
    transcript: &[Message],
    turn: usize,
) -> Prompt {
    let participants = roster
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut user = format!("Topic: {topic}\nParticipants: {participants}\n\n");
    if transcript.is_empty() {
        user.push_str("The conversation has not started yet. Open the discussion.\n");
    } else {
        user.push_str("Conversation so far:\n");
        for message in transcript {
            user.push_str(&format!("{}: {}\n", message.agent_name, message.content));
        }
    }
    user.push_str(&format!("\nWrite {}'s next message.", speaker.name));

    Prompt {
        kind: PromptKind::Turn,
        system: format!("{} {}", speaker.persona_summary(), TURN_INSTRUCTIONS),
        user,
        topic: topic.to_string(),
        speaker: Some(speaker.name.clone()),
        turn,
    }
}

/// Remove the speaker's own identity label echoed at the start of a reply.
///
/// Handles `Name:`, `**Name**:`, `[Name]:` and repeats of the label. A
/// reply that opens by addressing someone else (`Grace: you're wrong`) is
/// content and stays.
pub fn strip_agent_prefix(text: &str, speaker: &str) -> String {
    let name = speaker.trim();
    if name.is_empty() {
        return text.trim().to_string();
    }
    let Ok(label) = Regex::new(&format!(r"^\s*[\*\[]*{}[\*\]]*\s*:\s*", regex::escape(name))) else {
        return text.trim().to_string();
    };

    let mut cleaned = text.trim();
    while let Some(m) = label.find(cleaned) {
        cleaned = &cleaned[m.end()..];
    }
    cleaned.trim().to_string()
}
