//! Deterministic offline generator.
//!
//! Produces plausible turn text and agent profiles without any network
//! access. Output depends only on the seed, the turn number, the speaker and
//! the topic, so two runs with the same inputs are identical.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{MessageGenerator, ModelParams, Prompt, PromptKind};
use crate::error::Result;

const TURN_TEMPLATES: &[&str] = &[
    "I think {topic} deserves a careful look, because the evidence so far is mixed.",
    "I agree with the previous point, but what about the long-term costs of {topic}?",
    "Honestly, I disagree. {topic} is often framed too narrowly, and we should widen the lens.",
    "From my experience, {topic} works best when people share data openly.",
    "That is a fair question. Perhaps {topic} needs a pilot before anyone commits.",
    "Building on that, I would add that incentives shape how {topic} plays out in practice.",
    "I am not convinced. Why would anyone trust the current models of {topic}?",
    "Yes, exactly. If we measure {topic} properly, the debate becomes much simpler.",
];

struct Persona {
    name: &'static str,
    personality: &'static str,
    background: &'static str,
    expertise: &'static [&'static str],
    beliefs: &'static [&'static str],
    quirks: &'static [&'static str],
    communication: &'static str,
}

const PERSONAS: &[Persona] = &[
    Persona {
        name: "Nova",
        personality: "optimistic and restless",
        background: "former startup founder",
        expertise: &["product strategy", "scaling teams"],
        beliefs: &["speed beats perfection"],
        quirks: &["uses sports metaphors"],
        communication: "energetic",
    },
    Persona {
        name: "Orin",
        personality: "skeptical and precise",
        background: "statistician at a public agency",
        expertise: &["statistics", "survey design"],
        beliefs: &["claims need evidence"],
        quirks: &["asks for sample sizes"],
        communication: "measured",
    },
    Persona {
        name: "Lyra",
        personality: "empathetic and reflective",
        background: "community organizer",
        expertise: &["facilitation", "public policy"],
        beliefs: &["everyone deserves a voice"],
        quirks: &["summarizes others before replying"],
        communication: "warm",
    },
    Persona {
        name: "Cassius",
        personality: "contrarian and witty",
        background: "debate coach",
        expertise: &["rhetoric", "history"],
        beliefs: &["consensus hides weak arguments"],
        quirks: &["plays devil's advocate"],
        communication: "provocative",
    },
    Persona {
        name: "Mei",
        personality: "methodical and calm",
        background: "systems engineer",
        expertise: &["reliability", "risk analysis"],
        beliefs: &["failure modes matter most"],
        quirks: &["thinks in checklists"],
        communication: "structured",
    },
    Persona {
        name: "Tariq",
        personality: "pragmatic and blunt",
        background: "field economist",
        expertise: &["development economics", "incentives"],
        beliefs: &["people respond to incentives"],
        quirks: &["quotes prices"],
        communication: "blunt",
    },
];

/// Offline generator with reproducible output.
pub struct ScriptedGenerator {
    seed: u64,
    profiles_served: AtomicU64,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScriptedGenerator {
    /// Generator whose output is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            profiles_served: AtomicU64::new(0),
        }
    }

    fn turn_text(&self, prompt: &Prompt) -> String {
        let speaker = prompt.speaker.as_deref().unwrap_or("Agent");
        let speaker_hash = speaker.bytes().fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        let mut rng = StdRng::seed_from_u64(self.seed ^ (prompt.turn as u64) ^ speaker_hash);
        let template = TURN_TEMPLATES[rng.gen_range(0..TURN_TEMPLATES.len())];
        let body = template.replace("{topic}", &prompt.topic);

        // Models regularly echo the speaker label; keep that behavior so the
        // cleaning path is exercised.
        if prompt.turn % 3 == 2 {
            format!("{speaker}: {body}")
        } else {
            body
        }
    }

    fn profile_json(&self, prompt: &Prompt) -> String {
        let served = self.profiles_served.fetch_add(1, Ordering::Relaxed);
        let index = (self.seed.wrapping_add(served) % PERSONAS.len() as u64) as usize;
        let persona = &PERSONAS[index];

        let mut expertise: Vec<String> = persona.expertise.iter().map(|s| s.to_string()).collect();
        if !prompt.topic.is_empty() {
            expertise.push(prompt.topic.to_lowercase());
        }

        serde_json::json!({
            "name": persona.name,
            "personality": persona.personality,
            "background": persona.background,
            "expertise": expertise,
            "beliefs": persona.beliefs,
            "quirks": persona.quirks,
            "communicationStyle": persona.communication,
        })
        .to_string()
    }
}

#[async_trait]
impl MessageGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        Ok(match prompt.kind {
            PromptKind::Turn => self.turn_text(prompt),
            PromptKind::AgentProfile => self.profile_json(prompt),
        })
    }

    fn model_params(&self) -> ModelParams {
        ModelParams {
            model: "scripted".to_string(),
            version: "offline".to_string(),
            context_window: "unbounded".to_string(),
            temperature: 0.0,
        }
    }
}
