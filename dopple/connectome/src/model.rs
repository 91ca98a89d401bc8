use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a connectome node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Personality trait (creative, analytical, ...).
    Trait,
    /// Topic of interest.
    Interest,
    /// Emotional state.
    Emotion,
    /// Held value or principle.
    Value,
}

impl NodeType {
    /// Every node type, in reporting order.
    pub const ALL: [Self; 4] = [Self::Trait, Self::Interest, Self::Emotion, Self::Value];

    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trait => "trait",
            Self::Interest => "interest",
            Self::Emotion => "emotion",
            Self::Value => "value",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown node type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node type: {0}")]
pub struct ParseNodeTypeError(pub String);

impl FromStr for NodeType {
    type Err = ParseNodeTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trait" | "traits" => Ok(Self::Trait),
            "interest" | "interests" => Ok(Self::Interest),
            "emotion" | "emotions" => Ok(Self::Emotion),
            "value" | "values" => Ok(Self::Value),
            _ => Err(ParseNodeTypeError(s.to_string())),
        }
    }
}

/// Node of the connectome graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeNode {
    /// Stable identifier derived from type and normalized name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Category.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Reinforcement level in `[0, max_strength]`.
    pub strength: f64,
    /// Optional free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Directed, signed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Positive reinforces, negative suppresses.
    pub weight: f64,
    /// Optional free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Serializable snapshot of a whole connectome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connectome {
    /// Nodes in insertion order.
    #[serde(default)]
    pub nodes: Vec<ConnectomeNode>,
    /// Edges in insertion order.
    #[serde(default)]
    pub edges: Vec<ConnectomeEdge>,
}

impl Connectome {
    /// Parses the JSON wire format.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    /// Renders the JSON wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// True when the snapshot holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Lowercases a name and joins its alphanumeric words with `_`.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Canonical node id (`{type}_{slug}`), or `None` when the name has no words.
#[must_use]
pub fn node_id(name: &str, node_type: NodeType) -> Option<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        None
    } else {
        Some(format!("{}_{slug}", node_type.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_normalized() {
        assert_eq!(
            node_id("  Deep   Curiosity! ", NodeType::Trait).as_deref(),
            Some("trait_deep_curiosity")
        );
        assert_eq!(node_id("?!", NodeType::Value), None);
        assert_eq!(slugify("Work-Life"), "work_life");
    }

    #[test]
    fn parses_node_types_case_insensitively() {
        assert_eq!("Emotion".parse::<NodeType>().unwrap(), NodeType::Emotion);
        assert_eq!("values".parse::<NodeType>().unwrap(), NodeType::Value);
        assert!("mood".parse::<NodeType>().is_err());
    }

    #[test]
    fn wire_format_uses_type_key_and_omits_empty_description() {
        let connectome = Connectome {
            nodes: vec![ConnectomeNode {
                id: "emotion_happy".into(),
                name: "happy".into(),
                node_type: NodeType::Emotion,
                strength: 1.5,
                description: None,
            }],
            edges: Vec::new(),
        };
        let json = connectome.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"nodes":[{"id":"emotion_happy","name":"happy","type":"emotion","strength":1.5}],"edges":[]}"#
        );
        assert_eq!(Connectome::from_json(&json).unwrap(), connectome);
    }
}
