use std::fmt;

use chrono::{DateTime, Utc};
use dopple_connectome::{Connectome, NodeType};
use dopple_nlp::AnalysisDelta;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Area of the user's life an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCategory {
    /// Personality.
    Traits,
    /// Hobbies and pastimes.
    Interests,
    /// Principles and goals.
    Values,
    /// How feelings are expressed.
    Emotions,
    /// Likes and dislikes.
    Preferences,
    /// Work or studies.
    Background,
}

impl InformationCategory {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traits => "traits",
            Self::Interests => "interests",
            Self::Values => "values",
            Self::Emotions => "emotions",
            Self::Preferences => "preferences",
            Self::Background => "background",
        }
    }

    const fn node_type(self) -> Option<NodeType> {
        match self {
            Self::Traits => Some(NodeType::Trait),
            Self::Interests => Some(NodeType::Interest),
            _ => None,
        }
    }
}

impl fmt::Display for InformationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an item should be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationPriority {
    /// Ask early.
    High,
    /// Ask once the basics are known.
    Medium,
    /// Ask when nothing else is missing.
    Low,
}

impl InformationPriority {
    const fn score(self) -> f64 {
        match self {
            Self::High => 3.0,
            Self::Medium => 2.0,
            Self::Low => 1.0,
        }
    }
}

/// One piece of information the dopple wants to learn about the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationItem {
    /// Category.
    pub category: InformationCategory,
    /// Short name, also used in the prompt.
    pub name: String,
    /// Priority.
    pub priority: InformationPriority,
    /// Whether the user already told us.
    pub collected: bool,
    /// Times the item was put in front of the generation backend.
    pub ask_count: u32,
    /// Last time it was asked about.
    #[serde(default)]
    pub last_asked: Option<DateTime<Utc>>,
}

impl InformationItem {
    /// Priority plus a bonus that shrinks every time the item is asked.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.priority.score() + 1.0 / (f64::from(self.ask_count) + 1.0)
    }
}

const ITEMS: &[(&str, InformationCategory, InformationPriority, &str)] = &[
    (
        "personality",
        InformationCategory::Traits,
        InformationPriority::High,
        r"personality|character",
    ),
    ("mbti", InformationCategory::Traits, InformationPriority::Medium, r"mbti"),
    ("hobbies", InformationCategory::Interests, InformationPriority::High, r"hobby|hobbies"),
    (
        "leisure",
        InformationCategory::Interests,
        InformationPriority::Medium,
        r"leisure|free time|weekends?",
    ),
    (
        "favorite music",
        InformationCategory::Interests,
        InformationPriority::Medium,
        r"music|songs?|bands?|singers?",
    ),
    (
        "core values",
        InformationCategory::Values,
        InformationPriority::High,
        r"values?|principles?",
    ),
    (
        "goals",
        InformationCategory::Values,
        InformationPriority::Medium,
        r"goals?|dreams?|ambitions?",
    ),
    (
        "emotional expression",
        InformationCategory::Emotions,
        InformationPriority::Medium,
        r"feelings?|emotions?|emotional",
    ),
    (
        "favorite food",
        InformationCategory::Preferences,
        InformationPriority::Low,
        r"food|dish(?:es)?|cuisine|meals?",
    ),
    (
        "favorite places",
        InformationCategory::Preferences,
        InformationPriority::Low,
        r"travel\w*|trips?|vacations?",
    ),
    (
        "occupation",
        InformationCategory::Background,
        InformationPriority::Medium,
        r"jobs?|careers?|occupation|profession|major",
    ),
];

static KEYWORDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    ITEMS
        .iter()
        .map(|&(name, _, _, words)| {
            let pattern = Regex::new(&format!(r"(?i)\b(?:{words})\b")).expect("collection regex");
            (name, pattern)
        })
        .collect()
});

/// Item an analyzed entity answers, if any.
fn item_for_entity(name: &str, node_type: NodeType) -> Option<&'static str> {
    match (node_type, name) {
        (NodeType::Trait, _) => Some("personality"),
        (NodeType::Value, _) => Some("core values"),
        (NodeType::Emotion, _) => Some("emotional expression"),
        (NodeType::Interest, "hobbies") => Some("hobbies"),
        (NodeType::Interest, "work" | "education") => Some("occupation"),
        (NodeType::Interest, _) => None,
    }
}

/// Tracks what the dopple still wants to learn about its user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationTracker {
    items: Vec<InformationItem>,
}

impl Default for InformationTracker {
    fn default() -> Self {
        let items = ITEMS
            .iter()
            .map(|&(name, category, priority, _)| InformationItem {
                category,
                name: name.to_string(),
                priority,
                collected: false,
                ask_count: 0,
                last_asked: None,
            })
            .collect();
        Self { items }
    }
}

impl InformationTracker {
    /// All items in their fixed order.
    #[must_use]
    pub fn items(&self) -> &[InformationItem] {
        &self.items
    }

    /// Items not collected yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.iter().filter(|item| !item.collected).count()
    }

    /// Uncollected item with the highest score; earlier items win ties.
    #[must_use]
    pub fn next_needed(&self) -> Option<&InformationItem> {
        self.items
            .iter()
            .filter(|item| !item.collected)
            .min_by(|a, b| b.score().total_cmp(&a.score()))
    }

    /// Marks an item collected. Returns true when it was still open.
    pub fn mark_collected(&mut self, name: &str) -> bool {
        match self.items.iter_mut().find(|item| item.name == name) {
            Some(item) if !item.collected => {
                item.collected = true;
                true
            }
            _ => false,
        }
    }

    /// Counts one more question about `name`.
    pub fn record_asked(&mut self, name: &str, at: DateTime<Utc>) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.name == name) else {
            return false;
        };
        item.ask_count = item.ask_count.saturating_add(1);
        item.last_asked = Some(at);
        true
    }

    /// Marks items answered by a user message, through its keywords or the
    /// entities the analyzer found. Returns the newly collected names.
    pub fn observe(&mut self, content: &str, delta: &AnalysisDelta) -> Vec<String> {
        let mut answered: Vec<&str> = KEYWORDS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(name, _)| *name)
            .collect();
        answered.extend(
            delta
                .entity_deltas
                .iter()
                .filter_map(|entity| item_for_entity(&entity.name, entity.node_type)),
        );
        answered
            .into_iter()
            .filter(|name| self.mark_collected(name))
            .map(str::to_string)
            .collect()
    }

    /// Marks whole categories collected when the connectome already holds
    /// nodes of the matching type.
    pub fn seed_from(&mut self, connectome: &Connectome) {
        for item in &mut self.items {
            let known = item.category.node_type().is_some_and(|node_type| {
                connectome.nodes.iter().any(|node| node.node_type == node_type)
            });
            if known {
                item.collected = true;
            }
        }
    }
}
