//! Post-hoc analytics for finished transcripts.
//!
//! [`AnalyticsEngine::analyze`] is a pure function of the topic, the roster
//! and the transcript. Scores are percentages clamped to `[0, 100]`; every
//! list in the report is always present, possibly empty.

mod engine;
mod text;

pub use engine::{
    AnalyticsEngine, CONSENSUS_LEVEL, ENGAGEMENT_LEVEL, PARTICIPATION_BALANCE, TOPIC_ADHERENCE,
    VOCABULARY_DIVERSITY,
};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Observed behavior of one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentBehavior {
    /// Short description of how the agent reasoned
    pub cognitive_patterns: String,
    /// Biases the heuristics flagged
    pub biases_observed: Vec<String>,
    /// Traits that set the agent apart
    pub unique_characteristics: Vec<String>,
    /// How often the agent picked up the previous speaker's points, 0-100
    pub adaptability_score: f64,
}

/// Who led the discussion and who followed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractionDynamics {
    /// One-line description of the balance of voice
    pub power_dynamics: String,
    /// "A's points were picked up by B" style observations
    pub influence_patterns: Vec<String>,
}

/// Conclusions and follow-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportSummary {
    /// Main conclusions
    pub main_conclusions: Vec<String>,
    /// Topics worth a follow-up experiment
    pub suggested_next_topics: Vec<String>,
}

/// Structured report stored with a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsReport {
    /// Named percentage scores
    pub experiment_metrics: BTreeMap<String, f64>,
    /// One entry per roster agent, keyed by name
    pub agent_behavior_analysis: BTreeMap<String, AgentBehavior>,
    /// Most discussed keywords
    pub main_topics: Vec<String>,
    /// Patterns visible only at the group level
    pub emergent_behaviors: Vec<String>,
    /// Balance of voice and influence
    pub interaction_dynamics: InteractionDynamics,
    /// Conclusions and follow-ups
    pub summary: ReportSummary,
}

impl AnalyticsReport {
    /// Score by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.experiment_metrics.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_report_fills_lists() {
        let report: AnalyticsReport = serde_json::from_str(
            r#"{"experimentMetrics":{"engagementLevel":72},"agentBehaviorAnalysis":{"Ada":{}}}"#,
        )
        .unwrap();
        assert_eq!(report.metric("engagementLevel"), Some(72.0));
        assert!(report.main_topics.is_empty());
        assert!(report.agent_behavior_analysis["Ada"].biases_observed.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["summary"]["suggestedNextTopics"].is_array());
        assert!(json["interactionDynamics"]["influencePatterns"].is_array());
    }
}
