use std::fmt::Write as _;

use dopple_connectome::{
    Connectome, ConnectomeAnalytics, NodeStat, NodeType, RankMetric, TopicRecommendation,
};
use dopple_memory_data::{ConversationStage, InformationItem};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::PersonaConfig;

/// Persona description handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaFrame {
    /// Relationship stage.
    pub stage: ConversationStage,
    /// Strongest nodes per type, in [`NodeType::ALL`] order.
    pub sections: IndexMap<NodeType, Vec<NodeStat>>,
    /// Topics the persona could bring up.
    pub topics: Vec<TopicRecommendation>,
    /// What the reply should try to learn about the user.
    #[serde(default)]
    pub information_needed: Option<InformationItem>,
}

impl PersonaFrame {
    /// Ranks each node type by strength and keeps the configured top-k.
    #[must_use]
    pub fn build(
        connectome: &Connectome,
        stage: ConversationStage,
        config: &PersonaConfig,
    ) -> Self {
        let analytics = ConnectomeAnalytics::new(connectome);
        let sections = NodeType::ALL
            .iter()
            .map(|&node_type| {
                let top =
                    analytics.rank(Some(node_type), RankMetric::Strength, config.k(node_type));
                (node_type, top)
            })
            .collect();
        Self {
            stage,
            sections,
            topics: analytics.recommended_topics(config.recommended_topics),
            information_needed: None,
        }
    }

    /// Sets the item the reply should ask about.
    #[must_use]
    pub fn with_information_needed(mut self, item: Option<&InformationItem>) -> Self {
        self.information_needed = item.cloned();
        self
    }

    /// All listed nodes, strongest first.
    #[must_use]
    pub fn top_entities(&self) -> Vec<NodeStat> {
        let mut all: Vec<NodeStat> = self.sections.values().flatten().cloned().collect();
        all.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    /// Prompt preamble describing the persona.
    #[must_use]
    pub fn render(&self, dopple_id: &str) -> String {
        let mut out = format!("You are {dopple_id}, a dopple persona.\n");
        let mut described = false;
        for (node_type, nodes) in &self.sections {
            if nodes.is_empty() {
                continue;
            }
            described = true;
            let listed = nodes
                .iter()
                .map(|node| format!("{} ({:.1})", node.name, node.strength))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{}: {listed}", section_title(*node_type));
        }
        if !described {
            out.push_str("Your personality is still forming.\n");
        }
        let _ = writeln!(out, "Conversation stage: {}. {}", self.stage, self.stage.guidance());
        if !self.topics.is_empty() {
            let topics = self
                .topics
                .iter()
                .map(|topic| topic.topic.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "Topics worth exploring: {topics}");
        }
        if let Some(item) = &self.information_needed {
            let _ = writeln!(
                out,
                "Still unknown about the user: {} ({}). Work a natural question about it into your reply.",
                item.name, item.category
            );
        }
        out
    }
}

const fn section_title(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Trait => "Traits",
        NodeType::Interest => "Interests",
        NodeType::Emotion => "Emotions",
        NodeType::Value => "Values",
    }
}
