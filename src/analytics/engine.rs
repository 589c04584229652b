//! Heuristic scoring of a transcript.

use std::collections::{BTreeMap, HashSet};

use super::text::{self, percent, AGREEMENT_MARKERS, DISAGREEMENT_MARKERS};
use super::{AgentBehavior, AnalyticsReport, InteractionDynamics, ReportSummary};
use crate::agent::Agent;
use crate::conversation::Message;

/// Smallest speaker share relative to the largest.
pub const PARTICIPATION_BALANCE: &str = "participationBalance";
/// Messages sharing a keyword with the topic.
pub const TOPIC_ADHERENCE: &str = "topicAdherence";
/// Replies that react to someone else.
pub const ENGAGEMENT_LEVEL: &str = "engagementLevel";
/// Distinct words over all words.
pub const VOCABULARY_DIVERSITY: &str = "vocabularyDiversity";
/// Agreement markers over all stance markers.
pub const CONSENSUS_LEVEL: &str = "consensusLevel";

/// Derives an [`AnalyticsReport`] from a finished run.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    topic_count: usize,
    suggestion_count: usize,
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self {
            topic_count: 5,
            suggestion_count: 3,
        }
    }
}

/// Per-agent counters gathered in one pass.
#[derive(Default)]
struct AgentStats {
    messages: usize,
    words: usize,
    questions: usize,
    agreements: usize,
    disagreements: usize,
    expertise_mentions: usize,
    follow_ups: usize,
    replies: usize,
    vocabulary: HashSet<String>,
}

impl AnalyticsEngine {
    /// Engine with default list sizes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Score a transcript.
    ///
    /// `agent_behavior_analysis` always has exactly one entry per roster
    /// agent, including agents that never spoke.
    pub fn analyze(&self, topic: &str, agents: &[Agent], messages: &[Message]) -> AnalyticsReport {
        let topic_words: HashSet<String> = text::keywords(topic).into_iter().collect();
        let mut stats: BTreeMap<&str, AgentStats> = agents
            .iter()
            .map(|a| (a.name.as_str(), AgentStats::default()))
            .collect();

        let mut on_topic = 0usize;
        let mut engaged = 0usize;
        let mut agreement_total = 0usize;
        let mut disagreement_total = 0usize;
        let mut all_words = 0usize;
        let mut distinct: HashSet<String> = HashSet::new();
        let mut pickups: BTreeMap<(String, String), usize> = BTreeMap::new();

        for (i, message) in messages.iter().enumerate() {
            let words = text::words(&message.content);
            let keywords: HashSet<String> = text::keywords(&message.content).into_iter().collect();
            let agreements = text::marker_hits(&message.content, AGREEMENT_MARKERS);
            let disagreements = text::marker_hits(&message.content, DISAGREEMENT_MARKERS);
            let question = message.content.contains('?');

            all_words += words.len();
            distinct.extend(words.iter().cloned());
            agreement_total += agreements;
            disagreement_total += disagreements;
            if topic_words.is_empty() || !keywords.is_disjoint(&topic_words) {
                on_topic += 1;
            }

            let previous = i.checked_sub(1).map(|p| &messages[p]);
            let picked_up = previous.is_some_and(|prev| {
                prev.agent_name != message.agent_name
                    && text::keywords(&prev.content)
                        .iter()
                        .any(|w| !topic_words.contains(w) && keywords.contains(w))
            });
            let mentions_other = agents.iter().any(|a| {
                a.name != message.agent_name && message.content.contains(a.name.as_str())
            });
            if previous.is_some() && (question || mentions_other || agreements + disagreements > 0 || picked_up) {
                engaged += 1;
            }
            if let (Some(prev), true) = (previous, picked_up) {
                *pickups
                    .entry((prev.agent_name.clone(), message.agent_name.clone()))
                    .or_default() += 1;
            }

            let Some(entry) = stats.get_mut(message.agent_name.as_str()) else {
                continue;
            };
            let agent = agents.iter().find(|a| a.name == message.agent_name);
            entry.messages += 1;
            entry.words += words.len();
            entry.questions += usize::from(question);
            entry.agreements += agreements;
            entry.disagreements += disagreements;
            entry.vocabulary.extend(keywords.iter().cloned());
            if agent.is_some_and(|a| mentions_expertise(a, &keywords)) {
                entry.expertise_mentions += 1;
            }
            if previous.is_some() {
                entry.replies += 1;
                entry.follow_ups += usize::from(picked_up);
            }
        }

        let total = messages.len();
        let mut metrics = BTreeMap::new();
        metrics.insert(PARTICIPATION_BALANCE.to_string(), participation_balance(&stats, total));
        metrics.insert(TOPIC_ADHERENCE.to_string(), ratio(on_topic, total));
        metrics.insert(ENGAGEMENT_LEVEL.to_string(), ratio(engaged, total.saturating_sub(1)));
        metrics.insert(VOCABULARY_DIVERSITY.to_string(), ratio(distinct.len(), all_words));
        metrics.insert(
            CONSENSUS_LEVEL.to_string(),
            if agreement_total + disagreement_total == 0 {
                50.0
            } else {
                ratio(agreement_total, agreement_total + disagreement_total)
            },
        );

        let main_topics = text::top_keywords(messages.iter().map(|m| m.content.as_str()), self.topic_count);
        let behavior = agent_behavior(&stats);
        let dynamics = interaction_dynamics(&stats, &pickups, all_words);
        let emergent = emergent_behaviors(&metrics, &stats, total);
        let summary = ReportSummary {
            main_conclusions: conclusions(topic, &metrics, total),
            suggested_next_topics: main_topics
                .iter()
                .filter(|w| !topic_words.contains(*w))
                .take(self.suggestion_count)
                .map(|w| format!("{} and {}", topic.trim(), w))
                .collect(),
        };

        tracing::debug!(
            messages = total,
            agents = agents.len(),
            topics = main_topics.len(),
            "analytics computed"
        );

        AnalyticsReport {
            experiment_metrics: metrics,
            agent_behavior_analysis: behavior,
            main_topics,
            emergent_behaviors: emergent,
            interaction_dynamics: dynamics,
            summary,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    percent(part as f64 * 100.0 / whole as f64)
}

fn mentions_expertise(agent: &Agent, keywords: &HashSet<String>) -> bool {
    agent
        .expertise
        .iter()
        .flat_map(|e| text::keywords(e))
        .any(|w| keywords.contains(&w))
}

/// Smallest speaker count over largest, as a percentage.
fn participation_balance(stats: &BTreeMap<&str, AgentStats>, total: usize) -> f64 {
    if total == 0 || stats.is_empty() {
        return 0.0;
    }
    let max = stats.values().map(|s| s.messages).max().unwrap_or(0);
    let min = stats.values().map(|s| s.messages).min().unwrap_or(0);
    ratio(min, max)
}

fn agent_behavior(stats: &BTreeMap<&str, AgentStats>) -> BTreeMap<String, AgentBehavior> {
    stats
        .iter()
        .map(|(name, s)| {
            let others: HashSet<&String> = stats
                .iter()
                .filter(|(other, _)| other != &name)
                .flat_map(|(_, o)| o.vocabulary.iter())
                .collect();
            let mut unique: Vec<&String> = s.vocabulary.iter().filter(|w| !others.contains(w)).collect();
            unique.sort();

            let behavior = AgentBehavior {
                cognitive_patterns: cognitive_pattern(s),
                biases_observed: biases(s),
                unique_characteristics: unique
                    .into_iter()
                    .take(3)
                    .map(|w| format!("Only participant to raise \"{w}\""))
                    .collect(),
                adaptability_score: ratio(s.follow_ups, s.replies),
            };
            (name.to_string(), behavior)
        })
        .collect()
}

fn cognitive_pattern(s: &AgentStats) -> String {
    if s.messages == 0 {
        return "Did not speak during this session".to_string();
    }
    let avg = s.words / s.messages;
    let style = if avg >= 40 {
        "Elaborates at length"
    } else if avg >= 15 {
        "Makes measured, mid-length points"
    } else {
        "Speaks in short, direct statements"
    };
    let stance = if s.questions * 2 >= s.messages {
        "leads with questions"
    } else if s.disagreements > s.agreements {
        "tends to challenge others"
    } else if s.agreements > s.disagreements {
        "tends to build on others"
    } else {
        "states positions without reacting much to others"
    };
    format!("{style} and {stance}")
}

fn biases(s: &AgentStats) -> Vec<String> {
    let mut out = Vec::new();
    if s.messages == 0 {
        return out;
    }
    if s.expertise_mentions * 2 > s.messages {
        out.push("Anchors on own area of expertise".to_string());
    }
    if s.agreements > 0 && s.disagreements == 0 && s.messages > 1 {
        out.push("Agrees without qualification".to_string());
    }
    if s.disagreements > 0 && s.agreements == 0 && s.messages > 1 {
        out.push("Rejects points without conceding any".to_string());
    }
    out
}

fn interaction_dynamics(
    stats: &BTreeMap<&str, AgentStats>,
    pickups: &BTreeMap<(String, String), usize>,
    all_words: usize,
) -> InteractionDynamics {
    let speakers = stats.values().filter(|s| s.messages > 0).count();
    let dominant = stats.iter().max_by(|a, b| a.1.words.cmp(&b.1.words).then(b.0.cmp(a.0)));

    let power_dynamics = match dominant {
        _ if all_words == 0 => "No discussion took place".to_string(),
        Some((name, s)) if speakers > 1 && s.words * stats.len() * 2 > all_words * 3 => {
            format!("Dominated by {name} ({} of {all_words} words)", s.words)
        },
        _ => "Balanced participation".to_string(),
    };

    let mut ranked: Vec<(&(String, String), &usize)> = pickups.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let influence_patterns = ranked
        .into_iter()
        .take(5)
        .map(|((from, to), n)| {
            let times = if *n == 1 { "once".to_string() } else { format!("{n} times") };
            format!("{from}'s points were picked up by {to} {times}")
        })
        .collect();

    InteractionDynamics {
        power_dynamics,
        influence_patterns,
    }
}

fn emergent_behaviors(
    metrics: &BTreeMap<String, f64>,
    stats: &BTreeMap<&str, AgentStats>,
    total: usize,
) -> Vec<String> {
    let mut out = Vec::new();
    if total == 0 {
        return out;
    }
    let metric = |name: &str| metrics.get(name).copied().unwrap_or(0.0);
    let questions: usize = stats.values().map(|s| s.questions).sum();

    if metric(CONSENSUS_LEVEL) >= 66.0 {
        out.push("Participants converged toward agreement".to_string());
    } else if metric(CONSENSUS_LEVEL) <= 34.0 {
        out.push("Disagreement persisted throughout the discussion".to_string());
    }
    if questions * 10 >= total * 3 {
        out.push("Questions drove the discussion forward".to_string());
    }
    if metric(TOPIC_ADHERENCE) < 50.0 {
        out.push("The discussion drifted away from the stated topic".to_string());
    }
    if total > 1 && metric(ENGAGEMENT_LEVEL) >= 75.0 {
        out.push("Speakers consistently responded to one another".to_string());
    }
    out
}

fn conclusions(topic: &str, metrics: &BTreeMap<String, f64>, total: usize) -> Vec<String> {
    if total == 0 {
        return vec![format!("No messages were exchanged on \"{}\"", topic.trim())];
    }
    let metric = |name: &str| metrics.get(name).copied().unwrap_or(0.0);
    let mut out = vec![format!(
        "{total} messages exchanged on \"{}\" with {}% of them on topic",
        topic.trim(),
        metric(TOPIC_ADHERENCE)
    )];
    out.push(
        match metric(CONSENSUS_LEVEL) {
            c if c >= 66.0 => "The group largely agreed",
            c if c <= 34.0 => "The group largely disagreed",
            _ => "The group was split between agreement and disagreement",
        }
        .to_string(),
    );
    if metric(PARTICIPATION_BALANCE) < 100.0 {
        out.push("Some participants spoke more often than others".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_agent;
    use chrono::Utc;

    fn msg(name: &str, content: &str) -> Message {
        Message::new(name, content, Utc::now())
    }

    #[test]
    fn test_every_roster_agent_has_an_entry() {
        let agents = vec![test_agent("Ada"), test_agent("Grace"), test_agent("Linus")];
        let messages = vec![msg("Ada", "Space travel is hard."), msg("Grace", "I agree, space is hard.")];
        let report = AnalyticsEngine::new().analyze("Space", &agents, &messages);

        let keys: Vec<&str> = report.agent_behavior_analysis.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Ada", "Grace", "Linus"]);
        assert_eq!(
            report.agent_behavior_analysis["Linus"].cognitive_patterns,
            "Did not speak during this session"
        );
        assert_eq!(report.metric(PARTICIPATION_BALANCE), Some(0.0));
    }

    #[test]
    fn test_empty_transcript_scores_zero() {
        let agents = vec![test_agent("Ada"), test_agent("Grace")];
        let report = AnalyticsEngine::new().analyze("Space", &agents, &[]);
        assert_eq!(report.agent_behavior_analysis.len(), 2);
        assert_eq!(report.metric(TOPIC_ADHERENCE), Some(0.0));
        assert!(report.main_topics.is_empty());
        assert!(report.emergent_behaviors.is_empty());
        assert_eq!(report.summary.main_conclusions.len(), 1);
    }

    #[test]
    fn test_metrics_are_clamped() {
        let agents = vec![test_agent("Ada"), test_agent("Grace")];
        let messages = vec![
            msg("Ada", "Rockets need fuel. Space is vast?"),
            msg("Grace", "Exactly, Ada. Rockets and fuel decide everything in space."),
            msg("Ada", "However I doubt fuel is the only limit."),
            msg("Grace", "True, but orbital mechanics matter too."),
        ];
        let report = AnalyticsEngine::new().analyze("Space", &agents, &messages);

        for value in report.experiment_metrics.values() {
            assert!((0.0..=100.0).contains(value));
        }
        for behavior in report.agent_behavior_analysis.values() {
            assert!((0.0..=100.0).contains(&behavior.adaptability_score));
        }
        assert_eq!(report.metric(PARTICIPATION_BALANCE), Some(100.0));
        assert!(report.main_topics.contains(&"fuel".to_string()));
        assert!(!report.interaction_dynamics.influence_patterns.is_empty());
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let agents = vec![test_agent("Ada"), test_agent("Grace")];
        let messages = vec![msg("Ada", "Mars first?"), msg("Grace", "Moon first, then Mars.")];
        let engine = AnalyticsEngine::new();
        assert_eq!(
            engine.analyze("Space", &agents, &messages),
            engine.analyze("Space", &agents, &messages)
        );
    }
}
