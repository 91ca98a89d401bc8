use std::fmt;

use dopple_connectome::NodeType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human participant.
    User,
    /// The persona.
    Dopple,
    /// Injected instructions.
    System,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Dopple => "dopple",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested change to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    /// Node name.
    pub name: String,
    /// Node type.
    pub node_type: NodeType,
    /// Reinforcement amount.
    pub delta: f64,
}

/// Requested change to the edge `(name_a, type_a) -> (name_b, type_b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDelta {
    /// Source node name.
    pub name_a: String,
    /// Source node type.
    pub type_a: NodeType,
    /// Target node name.
    pub name_b: String,
    /// Target node type.
    pub type_b: NodeType,
    /// Signed weight change.
    pub weight_delta: f64,
}

/// Output of one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDelta {
    /// Node reinforcements.
    pub entity_deltas: Vec<EntityDelta>,
    /// Edge reinforcements, applied after the nodes.
    pub edge_deltas: Vec<EdgeDelta>,
}

impl AnalysisDelta {
    /// True when nothing was recognized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_deltas.is_empty() && self.edge_deltas.is_empty()
    }
}

/// Turns a message into connectome deltas.
///
/// Implementations must be deterministic and side-effect free. Text that
/// yields nothing produces an empty delta; analysis never fails.
pub trait MessageAnalyzer: Send + Sync {
    /// Analyzes one message.
    fn analyze(&self, content: &str, role: Role) -> AnalysisDelta;
}

/// Scaling and role filter for [`LexiconAnalyzer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Multiplier turning message importance into a node delta.
    pub entity_scale: f64,
    /// Multiplier turning message importance into an edge delta.
    pub edge_scale: f64,
    /// Also learn from the persona's own messages.
    pub include_dopple: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            entity_scale: 0.3,
            edge_scale: 0.2,
            include_dopple: false,
        }
    }
}

struct LexiconEntry {
    name: &'static str,
    node_type: NodeType,
    pattern: Regex,
}

const LEXICON_SOURCE: &[(&str, NodeType, &str)] = &[
    ("happy", NodeType::Emotion, r"happ(?:y|iness)|joy\w*|glad|pleased|delighted"),
    ("sad", NodeType::Emotion, r"sad\w*|unhappy|depressed|down|blue|miserable"),
    ("angry", NodeType::Emotion, r"angry|anger|mad|furious|outraged|annoyed"),
    ("surprised", NodeType::Emotion, r"surpris\w*|shocked|amazed|astonished"),
    ("afraid", NodeType::Emotion, r"afraid|scared|frightened|terrified|anxious|fear\w*"),
    ("disgusted", NodeType::Emotion, r"disgust\w*|repulsed|revolted"),
    ("curious", NodeType::Emotion, r"curio\w*|intrigued|wonder(?:ing)?"),
    ("excited", NodeType::Emotion, r"excit\w*|thrilled|eager"),
    ("thoughtful", NodeType::Emotion, r"thoughtful|pensive|contemplative|reflective"),
    ("family", NodeType::Interest, r"family|families|parents?|children|kids?|siblings?|relatives?"),
    ("work", NodeType::Interest, r"work\w*|jobs?|careers?|office|boss|colleagues?"),
    ("hobbies", NodeType::Interest, r"hobby|hobbies|pastimes?|leisure|fun"),
    ("health", NodeType::Interest, r"health\w*|doctors?|exercis\w*|diet|illness|wellness"),
    ("education", NodeType::Interest, r"school|education|learning|study\w*|studies|university|college"),
    ("technology", NodeType::Interest, r"technolog\w*|computers?|internet|apps?|software|devices?"),
    ("entertainment", NodeType::Interest, r"movies?|films?|tv|shows?|series|actors?|actress|music|games?"),
    ("relationships", NodeType::Interest, r"relationships?|friends?|partners?|dating|love|boyfriend|girlfriend"),
    ("creative", NodeType::Trait, r"creativ\w*|imagin\w*|artistic"),
    ("analytical", NodeType::Trait, r"analytic\w*|logical|rational|analy[sz]\w*"),
    ("empathetic", NodeType::Trait, r"empath\w*|understanding|compassion\w*|caring"),
    ("decisive", NodeType::Trait, r"decisive|decisions?|decide\w*"),
    ("adaptable", NodeType::Trait, r"adapt\w*|flexib\w*|adjust\w*"),
    ("optimistic", NodeType::Trait, r"optimis\w*|positive|hopeful"),
    ("pessimistic", NodeType::Trait, r"pessimis\w*|negative|doubtful"),
    ("honesty", NodeType::Value, r"honest\w*|truth\w*|sincer\w*"),
    ("freedom", NodeType::Value, r"freedom|independen\w*|autonom\w*"),
    ("growth", NodeType::Value, r"growth|grow(?:ing)?|improv\w*|progress\w*"),
    ("kindness", NodeType::Value, r"kindness|generos\w*|generous"),
    ("loyalty", NodeType::Value, r"loyal\w*|faithful\w*|commitment"),
    ("justice", NodeType::Value, r"justice|fairness|fair|equality"),
];

/// Entity pairs that suppress each other when mentioned together.
const OPPOSITES: &[(&str, &str)] = &[
    ("happy", "sad"),
    ("happy", "angry"),
    ("excited", "afraid"),
    ("optimistic", "pessimistic"),
];

static LEXICON: Lazy<Vec<LexiconEntry>> = Lazy::new(|| {
    LEXICON_SOURCE
        .iter()
        .map(|&(name, node_type, words)| LexiconEntry {
            name,
            node_type,
            pattern: Regex::new(&format!(r"(?i)\b(?:{words})\b")).expect("lexicon regex"),
        })
        .collect()
});

/// Keyword lexicon analyzer over emotions, interests, traits and values.
#[derive(Debug, Clone, Default)]
pub struct LexiconAnalyzer {
    config: AnalyzerConfig,
}

impl LexiconAnalyzer {
    /// Creates an analyzer.
    #[must_use]
    pub const fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Importance of a message on a 0-10 scale.
    #[must_use]
    pub fn importance(content: &str) -> f64 {
        let mut score = 5.0_f64;
        if content.chars().count() > 100 {
            score += 1.0;
        }
        if content.contains('?') || content.contains('!') {
            score += 1.0;
        }
        if content.contains("!!") {
            score += 1.0;
        }
        score.min(10.0)
    }

    const fn accepts(&self, role: Role) -> bool {
        match role {
            Role::User => true,
            Role::Dopple => self.config.include_dopple,
            Role::System => false,
        }
    }
}

impl MessageAnalyzer for LexiconAnalyzer {
    fn analyze(&self, content: &str, role: Role) -> AnalysisDelta {
        if !self.accepts(role) || content.trim().is_empty() {
            return AnalysisDelta::default();
        }
        let matched: Vec<&LexiconEntry> = LEXICON
            .iter()
            .filter(|entry| entry.pattern.is_match(content))
            .collect();
        if matched.is_empty() {
            return AnalysisDelta::default();
        }

        let importance = Self::importance(content);
        let entity = importance * self.config.entity_scale;
        let weight = importance * self.config.edge_scale;
        let of = |node_type: NodeType| {
            matched
                .iter()
                .copied()
                .filter(|entry| entry.node_type == node_type)
                .collect::<Vec<_>>()
        };
        let emotions = of(NodeType::Emotion);
        let interests = of(NodeType::Interest);
        let traits = of(NodeType::Trait);
        let values = of(NodeType::Value);

        let entity_deltas = matched
            .iter()
            .map(|entry| EntityDelta {
                name: entry.name.to_string(),
                node_type: entry.node_type,
                delta: entity,
            })
            .collect();

        let mut edge_deltas = Vec::new();
        let mut link = |from: &[&LexiconEntry], to: &[&LexiconEntry], weight_delta: f64| {
            for a in from {
                for b in to {
                    edge_deltas.push(EdgeDelta {
                        name_a: a.name.to_string(),
                        type_a: a.node_type,
                        name_b: b.name.to_string(),
                        type_b: b.node_type,
                        weight_delta,
                    });
                }
            }
        };
        link(&emotions, &interests, weight);
        link(&emotions, &traits, weight);
        link(&emotions, &values, weight);
        link(&traits, &interests, weight);
        link(&values, &traits, weight);
        for (i, first) in interests.iter().enumerate() {
            link(&[*first], &interests[i + 1..], weight);
        }
        for &(a, b) in OPPOSITES {
            let find = |name: &str| matched.iter().copied().find(|entry| entry.name == name);
            if let (Some(a), Some(b)) = (find(a), find(b)) {
                link(&[a], &[b], -weight);
            }
        }

        AnalysisDelta {
            entity_deltas,
            edge_deltas,
        }
    }
}
