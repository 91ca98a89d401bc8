use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{Connectome, NodeType};

/// Per-node derived statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStat {
    /// Node id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Category.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Node strength.
    pub strength: f64,
    /// Distinct neighbours over incoming and outgoing edges.
    pub connections: usize,
    /// Sum of outgoing edge weights.
    pub influence: f64,
    /// Sum of incoming edge weights.
    pub receptivity: f64,
}

impl NodeStat {
    fn metric(&self, metric: RankMetric) -> f64 {
        match metric {
            RankMetric::Strength => self.strength,
            RankMetric::Influence => self.influence,
            RankMetric::Receptivity => self.receptivity,
            RankMetric::Connections => as_f64(self.connections),
        }
    }
}

/// Ranking criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    /// Node strength.
    Strength,
    /// Sum of outgoing weights.
    Influence,
    /// Sum of incoming weights.
    Receptivity,
    /// Distinct neighbours.
    Connections,
}

/// Group of same-type nodes joined by strong edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Display label.
    pub name: String,
    /// Type shared by every member.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Member ids, seed first.
    pub nodes: Vec<String>,
    /// Human-readable description.
    pub description: String,
}

/// One node of a type together with its strongly connected partners of another type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Display label.
    pub name: String,
    /// Anchor node id.
    pub anchor: String,
    /// Partner node ids.
    pub partners: Vec<String>,
    /// Human-readable description.
    pub description: String,
}

/// Counts of edges by weight sign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeWeightDistribution {
    /// Edges with weight > 0.
    pub positive: usize,
    /// Edges with weight < 0.
    pub negative: usize,
    /// Edges with weight == 0.
    pub neutral: usize,
}

impl EdgeWeightDistribution {
    /// `positive / max(negative, 1)`.
    #[must_use]
    pub fn balance_ratio(&self) -> f64 {
        as_f64(self.positive) / as_f64(self.negative.max(1))
    }
}

/// Titled, templated observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// Heading.
    pub title: String,
    /// Body text.
    pub text: String,
}

/// Node type with fewer nodes than its minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeficientType {
    /// Underrepresented type.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Priority (higher first).
    pub importance: u8,
    /// Nodes currently present.
    pub current_count: usize,
    /// Minimum expected.
    pub minimum: usize,
}

/// Suggested conversation topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecommendation {
    /// Topic prompt.
    pub topic: String,
    /// Why it was suggested.
    pub reason: String,
}

/// Thresholds used by clustering and insight generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsThresholds {
    /// Minimum |weight| joining same-type nodes into a cluster.
    pub cluster_min_weight: f64,
    /// Minimum |weight| for trait-interest associations.
    pub cross_cluster_min_weight: f64,
    /// Balance ratio above which the character reads as amplified.
    pub amplified_ratio: f64,
    /// Balance ratio below which the character reads as reserved.
    pub reserved_ratio: f64,
    /// Density above which the graph counts as highly complex.
    pub high_density: f64,
    /// Density below which the graph counts as simple.
    pub low_density: f64,
}

impl Default for AnalyticsThresholds {
    fn default() -> Self {
        Self {
            cluster_min_weight: 5.0,
            cross_cluster_min_weight: 7.0,
            amplified_ratio: 3.0,
            reserved_ratio: 0.5,
            high_density: 0.25,
            low_density: 0.1,
        }
    }
}

/// Aggregated, serializable analysis of one connectome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeReport {
    /// Number of nodes.
    pub node_count: usize,
    /// Number of edges.
    pub edge_count: usize,
    /// Nodes per type.
    pub type_counts: IndexMap<NodeType, usize>,
    /// Type with the most nodes.
    pub dominant_type: Option<NodeType>,
    /// Directed density.
    pub density: f64,
    /// 0-100 complexity score.
    pub complexity: u8,
    /// Edge sign counts.
    pub edge_weights: EdgeWeightDistribution,
    /// Top nodes by strength.
    pub strongest: Vec<NodeStat>,
    /// Top nodes by influence.
    pub most_influential: Vec<NodeStat>,
    /// Top nodes by receptivity.
    pub most_receptive: Vec<NodeStat>,
    /// Same-type clusters.
    pub clusters: Vec<Cluster>,
    /// Trait-interest associations.
    pub associations: Vec<Association>,
    /// Templated insights.
    pub insights: Vec<Insight>,
    /// Underrepresented types.
    pub deficient_types: Vec<DeficientType>,
    /// Suggested topics.
    pub recommended_topics: Vec<TopicRecommendation>,
}

const REPORT_TOP_N: usize = 5;
const REPORT_TOPICS: usize = 3;

/// Read-only analytics over a connectome snapshot. The snapshot is indexed
/// once at construction; edges whose endpoints are missing are ignored.
#[derive(Debug, Clone)]
pub struct ConnectomeAnalytics<'a> {
    connectome: &'a Connectome,
    stats: Vec<NodeStat>,
    /// Node id to its position in `stats`.
    positions: IndexMap<&'a str, usize>,
    /// Undirected view: `(neighbour index, edge weight)` in edge order.
    adjacency: Vec<Vec<(usize, f64)>>,
    edge_count: usize,
}

impl<'a> ConnectomeAnalytics<'a> {
    /// Indexes a snapshot.
    #[must_use]
    pub fn new(connectome: &'a Connectome) -> Self {
        let positions: IndexMap<&str, usize> = connectome
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();
        let mut stats: Vec<NodeStat> = connectome
            .nodes
            .iter()
            .map(|node| NodeStat {
                id: node.id.clone(),
                name: node.name.clone(),
                node_type: node.node_type,
                strength: node.strength,
                connections: 0,
                influence: 0.0,
                receptivity: 0.0,
            })
            .collect();
        let mut adjacency = vec![Vec::new(); connectome.nodes.len()];
        let mut neighbours = vec![HashSet::new(); connectome.nodes.len()];
        let mut edge_count = 0;

        for edge in &connectome.edges {
            let (Some(&s), Some(&t)) = (
                positions.get(edge.source.as_str()),
                positions.get(edge.target.as_str()),
            ) else {
                continue;
            };
            edge_count += 1;
            stats[s].influence += edge.weight;
            stats[t].receptivity += edge.weight;
            neighbours[s].insert(t);
            neighbours[t].insert(s);
            adjacency[s].push((t, edge.weight));
            adjacency[t].push((s, edge.weight));
        }
        for (stat, set) in stats.iter_mut().zip(&neighbours) {
            stat.connections = set.len();
        }

        Self {
            connectome,
            stats,
            positions,
            adjacency,
            edge_count,
        }
    }

    /// Per-node statistics in snapshot order.
    #[must_use]
    pub fn node_stats(&self) -> &[NodeStat] {
        &self.stats
    }

    /// Top `top_n` nodes by `metric`, optionally restricted to one type.
    /// Ties are broken by id ascending.
    #[must_use]
    pub fn rank(
        &self,
        node_type: Option<NodeType>,
        metric: RankMetric,
        top_n: usize,
    ) -> Vec<NodeStat> {
        let mut ranked: Vec<&NodeStat> = self
            .stats
            .iter()
            .filter(|stat| node_type.map_or(true, |t| stat.node_type == t))
            .collect();
        ranked.sort_by(|a, b| {
            b.metric(metric)
                .total_cmp(&a.metric(metric))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.into_iter().take(top_n).cloned().collect()
    }

    /// Strongest `n` nodes of a type.
    #[must_use]
    pub fn top_nodes(&self, node_type: NodeType, n: usize) -> Vec<NodeStat> {
        self.rank(Some(node_type), RankMetric::Strength, n)
    }

    /// Greedy single-pass grouping per type.
    ///
    /// Nodes are visited in id order; each unvisited node seeds a group and
    /// absorbs its unvisited same-type direct neighbours joined by an edge with
    /// `|weight| >= min_weight`. The result depends on visiting order and is
    /// not an optimal partition, but no node ever lands in two groups.
    /// Single-node groups are not reported.
    #[must_use]
    pub fn cluster(&self, min_weight: f64) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        for node_type in NodeType::ALL {
            let mut visited = HashSet::new();
            for seed in self.ids_of_type(node_type) {
                if !visited.insert(seed) {
                    continue;
                }
                let mut members = vec![seed];
                for &(other, weight) in &self.adjacency[seed] {
                    if self.stats[other].node_type == node_type
                        && weight.abs() >= min_weight
                        && visited.insert(other)
                    {
                        members.push(other);
                    }
                }
                if members.len() > 1 {
                    clusters.push(self.make_cluster(node_type, &members));
                }
            }
        }
        clusters
    }

    /// For each `type_a` node, its `type_b` neighbours over edges with
    /// `|weight| >= min_weight`.
    #[must_use]
    pub fn cross_cluster(
        &self,
        type_a: NodeType,
        type_b: NodeType,
        min_weight: f64,
    ) -> Vec<Association> {
        let mut associations = Vec::new();
        for anchor in self.ids_of_type(type_a) {
            let mut partners = Vec::new();
            for &(other, weight) in &self.adjacency[anchor] {
                if self.stats[other].node_type == type_b
                    && weight.abs() >= min_weight
                    && !partners.contains(&other)
                {
                    partners.push(other);
                }
            }
            if partners.is_empty() {
                continue;
            }
            let anchor_stat = &self.stats[anchor];
            let partner_names: Vec<&str> = partners
                .iter()
                .map(|&i| self.stats[i].name.as_str())
                .collect();
            associations.push(Association {
                name: format!("{type_a}-{type_b} Association: {}", anchor_stat.name),
                anchor: anchor_stat.id.clone(),
                partners: partners.iter().map(|&i| self.stats[i].id.clone()).collect(),
                description: format!(
                    "Strong connection between {type_a} \"{}\" and {type_b}s: {}",
                    anchor_stat.name,
                    partner_names.join(", ")
                ),
            });
        }
        associations
    }

    /// `edges / (n(n-1))`, or 0 below two nodes.
    #[must_use]
    pub fn density(&self) -> f64 {
        let n = self.stats.len();
        if n < 2 {
            return 0.0;
        }
        as_f64(self.edge_count) / as_f64(n * (n - 1))
    }

    /// Number of nodes of every type (zeros included).
    #[must_use]
    pub fn type_counts(&self) -> IndexMap<NodeType, usize> {
        let mut counts: IndexMap<NodeType, usize> =
            NodeType::ALL.iter().map(|&t| (t, 0)).collect();
        for stat in &self.stats {
            *counts.entry(stat.node_type).or_default() += 1;
        }
        counts
    }

    /// Type with the most nodes; ties go to the lexicographically smaller name.
    #[must_use]
    pub fn dominant_type(&self) -> Option<NodeType> {
        self.type_counts()
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .max_by(|(a_type, a_count), (b_type, b_count)| {
                a_count
                    .cmp(b_count)
                    .then_with(|| b_type.as_str().cmp(a_type.as_str()))
            })
            .map(|(node_type, _)| node_type)
    }

    /// Edge counts by weight sign.
    #[must_use]
    pub fn edge_weight_distribution(&self) -> EdgeWeightDistribution {
        let mut dist = EdgeWeightDistribution::default();
        let resolved = self.connectome.edges.iter().filter(|edge| {
            self.positions.contains_key(edge.source.as_str())
                && self.positions.contains_key(edge.target.as_str())
        });
        for edge in resolved {
            if edge.weight > 0.0 {
                dist.positive += 1;
            } else if edge.weight < 0.0 {
                dist.negative += 1;
            } else {
                dist.neutral += 1;
            }
        }
        dist
    }

    /// Deterministic templated observations.
    #[must_use]
    pub fn insights(&self, thresholds: &AnalyticsThresholds) -> Vec<Insight> {
        let clusters = self.cluster(thresholds.cluster_min_weight);
        let associations = self.cross_cluster(
            NodeType::Trait,
            NodeType::Interest,
            thresholds.cross_cluster_min_weight,
        );
        self.insights_from(thresholds, &clusters, &associations)
    }

    /// 0-100 score mixing node count, edge count, type diversity and
    /// undirected density (weights 0.3 / 0.3 / 0.2 / 0.2).
    #[must_use]
    pub fn complexity_score(&self) -> u8 {
        let n = as_f64(self.stats.len());
        let e = as_f64(self.edge_count);
        let present = self.type_counts().values().filter(|&&c| c > 0).count();
        let diversity = as_f64(present) / as_f64(NodeType::ALL.len());
        let max_undirected = n * (n - 1.0) / 2.0;
        let density = if max_undirected > 0.0 {
            (e / max_undirected).min(1.0)
        } else {
            0.0
        };
        let score = (n / 20.0).min(1.0) * 100.0 * 0.3
            + (e / 40.0).min(1.0) * 100.0 * 0.3
            + diversity * 100.0 * 0.2
            + density * 100.0 * 0.2;
        score_to_u8(score)
    }

    /// Types below their minimum node count, most important first.
    #[must_use]
    pub fn deficient_types(&self) -> Vec<DeficientType> {
        let counts = self.type_counts();
        // (type, minimum, importance)
        let rules = [
            (NodeType::Trait, 3, 5),
            (NodeType::Interest, 3, 4),
            (NodeType::Value, 2, 3),
            (NodeType::Emotion, 3, 2),
        ];
        rules
            .into_iter()
            .filter_map(|(node_type, minimum, importance)| {
                let current_count = counts.get(&node_type).copied().unwrap_or_default();
                (current_count < minimum).then_some(DeficientType {
                    node_type,
                    importance,
                    current_count,
                    minimum,
                })
            })
            .collect()
    }

    /// Up to `count` topics: first for deficient types, then around the
    /// strongest nodes and their strongest connection.
    #[must_use]
    pub fn recommended_topics(&self, count: usize) -> Vec<TopicRecommendation> {
        let mut topics = Vec::new();
        for deficient in self.deficient_types() {
            if topics.len() >= count {
                return topics;
            }
            let prompts = topic_prompts(deficient.node_type);
            topics.push(TopicRecommendation {
                topic: prompts[deficient.current_count % prompts.len()].to_string(),
                reason: format!(
                    "Little is known about {} yet ({} of {}).",
                    type_label(deficient.node_type),
                    deficient.current_count,
                    deficient.minimum
                ),
            });
        }
        for node in self.rank(None, RankMetric::Strength, REPORT_TOP_N) {
            if topics.len() >= count {
                break;
            }
            let Some(&index) = self.positions.get(node.id.as_str()) else {
                continue;
            };
            let strongest = self.adjacency[index]
                .iter()
                .max_by(|(a_idx, a_w), (b_idx, b_w)| {
                    a_w.abs()
                        .total_cmp(&b_w.abs())
                        .then_with(|| self.stats[*b_idx].id.cmp(&self.stats[*a_idx].id))
                })
                .map(|&(other, _)| &self.stats[other]);
            let label = type_label(node.node_type);
            topics.push(match strongest {
                Some(other) => TopicRecommendation {
                    topic: format!("{} and {}", node.name, other.name),
                    reason: format!("Explore the {label} \"{}\" in more depth.", node.name),
                },
                None => TopicRecommendation {
                    topic: node.name.clone(),
                    reason: format!("Learn more about the {label} \"{}\".", node.name),
                },
            });
        }
        topics
    }

    /// Everything above in one serializable document.
    #[must_use]
    pub fn report(&self, thresholds: &AnalyticsThresholds) -> ConnectomeReport {
        let clusters = self.cluster(thresholds.cluster_min_weight);
        let associations = self.cross_cluster(
            NodeType::Trait,
            NodeType::Interest,
            thresholds.cross_cluster_min_weight,
        );
        let insights = self.insights_from(thresholds, &clusters, &associations);
        ConnectomeReport {
            node_count: self.stats.len(),
            edge_count: self.edge_count,
            type_counts: self.type_counts(),
            dominant_type: self.dominant_type(),
            density: self.density(),
            complexity: self.complexity_score(),
            edge_weights: self.edge_weight_distribution(),
            strongest: self.rank(None, RankMetric::Strength, REPORT_TOP_N),
            most_influential: self.rank(None, RankMetric::Influence, REPORT_TOP_N),
            most_receptive: self.rank(None, RankMetric::Receptivity, REPORT_TOP_N),
            clusters,
            associations,
            insights,
            deficient_types: self.deficient_types(),
            recommended_topics: self.recommended_topics(REPORT_TOPICS),
        }
    }

    fn insights_from(
        &self,
        thresholds: &AnalyticsThresholds,
        clusters: &[Cluster],
        associations: &[Association],
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        let counts = self.type_counts();
        let dominant = self.dominant_type();
        insights.push(Insight {
            title: "Personality Summary".into(),
            text: format!(
                "This connectome consists of {} personality elements connected by {} relationships. The dominant type is {} ({} elements).",
                self.stats.len(),
                self.edge_count,
                dominant.map_or("none", NodeType::as_str),
                dominant.and_then(|t| counts.get(&t).copied()).unwrap_or_default()
            ),
        });

        let strongest = self.rank(None, RankMetric::Strength, 3);
        if let Some((top, rest)) = strongest.split_first() {
            let mut text = format!(
                "The most prominent characteristic is \"{}\" ({}) with a strength of {:.1}.",
                top.name, top.node_type, top.strength
            );
            if !rest.is_empty() {
                let names: Vec<String> = rest.iter().map(|n| format!("\"{}\"", n.name)).collect();
                text.push_str(&format!(" Other strong elements include {}.", names.join(" and ")));
            }
            insights.push(Insight {
                title: "Core Strengths".into(),
                text,
            });
        }

        if let Some(influential) = self.rank(None, RankMetric::Influence, 1).first() {
            insights.push(Insight {
                title: "Key Influences".into(),
                text: format!(
                    "\"{}\" has the most influence on other elements, affecting {} other characteristics with a total influence score of {:.1}.",
                    influential.name, influential.connections, influential.influence
                ),
            });
        }

        let patterns = clusters.len() + associations.len();
        let most_significant = clusters
            .first()
            .map(|c| c.name.as_str())
            .or_else(|| associations.first().map(|a| a.name.as_str()));
        if let Some(name) = most_significant {
            insights.push(Insight {
                title: "Personality Patterns".into(),
                text: format!(
                    "Detected {patterns} distinct patterns or clusters in the personality structure. The most significant is \"{name}\"."
                ),
            });
        }

        let ratio = self.edge_weight_distribution().balance_ratio();
        let balance = if ratio > thresholds.amplified_ratio {
            "The personality has significantly more enhancing than suppressing connections, suggesting an amplified character."
        } else if ratio < thresholds.reserved_ratio {
            "The personality has more suppressing than enhancing connections, indicating a more controlled or reserved character."
        } else {
            "The personality structure shows a balanced mix of enhancing and suppressing influences."
        };
        insights.push(Insight {
            title: "Character Balance".into(),
            text: balance.into(),
        });

        let density = self.density();
        let complexity = if density > thresholds.high_density {
            "The personality has high connectivity, suggesting a complex and nuanced character (high complexity)."
        } else if density < thresholds.low_density {
            "The personality has low connectivity, suggesting a more straightforward character with fewer interdependencies (low complexity)."
        } else {
            "The connectome has moderate connectivity density."
        };
        insights.push(Insight {
            title: "Complexity".into(),
            text: complexity.into(),
        });
        insights
    }

    fn ids_of_type(&self, node_type: NodeType) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .stats
            .iter()
            .enumerate()
            .filter(|(_, stat)| stat.node_type == node_type)
            .map(|(i, _)| i)
            .collect();
        indices.sort_by(|&a, &b| self.stats[a].id.cmp(&self.stats[b].id));
        indices
    }

    fn make_cluster(&self, node_type: NodeType, members: &[usize]) -> Cluster {
        let names: Vec<&str> = members
            .iter()
            .map(|&i| self.stats[i].name.as_str())
            .collect();
        Cluster {
            name: format!(
                "{} Group: {} & others",
                capitalize(node_type.as_str()),
                names[0]
            ),
            node_type,
            nodes: members.iter().map(|&i| self.stats[i].id.clone()).collect(),
            description: format!(
                "A group of related {node_type}s including: {}",
                names.join(", ")
            ),
        }
    }
}

fn topic_prompts(node_type: NodeType) -> &'static [&'static str] {
    match node_type {
        NodeType::Trait => &[
            "personality",
            "strengths and weaknesses",
            "personality traits",
            "what makes you unique",
            "how others see you",
        ],
        NodeType::Interest => &[
            "hobbies",
            "interests",
            "free-time activities",
            "favourite subjects",
            "things you enjoy doing",
        ],
        NodeType::Value => &[
            "values",
            "what matters most to you",
            "life principles",
            "dreams and goals",
            "priorities",
        ],
        NodeType::Emotion => &[
            "how you express feelings",
            "moments of joy",
            "handling stress",
            "happy memories",
            "recent mood",
        ],
    }
}

const fn type_label(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Trait => "personality trait",
        NodeType::Interest => "interest",
        NodeType::Value => "value",
        NodeType::Emotion => "emotion",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[allow(clippy::cast_precision_loss)]
const fn as_f64(value: usize) -> f64 {
    value as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn score_to_u8(score: f64) -> u8 {
    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConnectomeEdge, ConnectomeNode};

    fn node(id: &str, node_type: NodeType, strength: f64) -> ConnectomeNode {
        ConnectomeNode {
            id: id.into(),
            name: id.split_once('_').map_or(id, |(_, name)| name).into(),
            node_type,
            strength,
            description: None,
        }
    }

    fn edge(source: &str, target: &str, weight: f64) -> ConnectomeEdge {
        ConnectomeEdge {
            source: source.into(),
            target: target.into(),
            weight,
            description: None,
        }
    }

    fn sample() -> Connectome {
        Connectome {
            nodes: vec![
                node("trait_creative", NodeType::Trait, 8.0),
                node("trait_analytical", NodeType::Trait, 6.0),
                node("trait_empathetic", NodeType::Trait, 6.0),
                node("interest_music", NodeType::Interest, 5.0),
                node("interest_work", NodeType::Interest, 2.0),
                node("emotion_happy", NodeType::Emotion, 3.0),
            ],
            edges: vec![
                edge("trait_creative", "trait_analytical", 6.0),
                edge("trait_empathetic", "trait_creative", 5.5),
                edge("trait_creative", "interest_music", 8.0),
                edge("interest_music", "interest_work", -5.0),
                edge("emotion_happy", "trait_creative", 2.0),
                edge("emotion_happy", "interest_work", -1.0),
            ],
        }
    }

    #[test]
    fn node_stats_sum_directional_weights() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let creative = &analytics.node_stats()[0];
        assert_eq!(creative.connections, 4);
        assert!((creative.influence - 14.0).abs() < 1e-9);
        assert!((creative.receptivity - 7.5).abs() < 1e-9);
    }

    #[test]
    fn connections_count_distinct_neighbours() {
        let connectome = Connectome {
            nodes: vec![
                node("trait_a", NodeType::Trait, 1.0),
                node("trait_b", NodeType::Trait, 1.0),
            ],
            edges: vec![edge("trait_a", "trait_b", 1.0), edge("trait_b", "trait_a", 1.0)],
        };
        let analytics = ConnectomeAnalytics::new(&connectome);
        assert_eq!(analytics.node_stats()[0].connections, 1);
    }

    #[test]
    fn rank_breaks_ties_by_id() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let traits = analytics.top_nodes(NodeType::Trait, 3);
        let ids: Vec<&str> = traits.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["trait_creative", "trait_analytical", "trait_empathetic"]);
        let influence = analytics.rank(None, RankMetric::Influence, 1);
        assert_eq!(influence[0].id, "trait_creative");
        let connections = analytics.rank(Some(NodeType::Interest), RankMetric::Connections, 5);
        assert_eq!(connections.len(), 2);
    }

    #[test]
    fn density_matches_directed_formula() {
        let connectome = Connectome {
            nodes: vec![
                node("trait_a", NodeType::Trait, 1.0),
                node("trait_b", NodeType::Trait, 1.0),
                node("trait_c", NodeType::Trait, 1.0),
            ],
            edges: vec![edge("trait_a", "trait_b", 1.0), edge("trait_b", "trait_c", 1.0)],
        };
        let analytics = ConnectomeAnalytics::new(&connectome);
        assert!((analytics.density() - 2.0 / 6.0).abs() < 1e-9);

        let single = Connectome {
            nodes: vec![node("trait_a", NodeType::Trait, 1.0)],
            edges: Vec::new(),
        };
        assert!(ConnectomeAnalytics::new(&single).density().abs() < f64::EPSILON);
        assert!(ConnectomeAnalytics::new(&Connectome::default()).density().abs() < f64::EPSILON);
    }

    #[test]
    fn cluster_output_is_a_partition() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let clusters = analytics.cluster(5.0);
        assert_eq!(clusters.len(), 2);

        let mut seen = HashSet::new();
        for cluster in &clusters {
            for id in &cluster.nodes {
                assert!(seen.insert((cluster.node_type, id.clone())), "{id} twice");
            }
        }
        // analytical seeds first (id order) and pulls creative; empathetic is left alone
        assert_eq!(clusters[0].nodes, ["trait_analytical", "trait_creative"]);
        assert_eq!(clusters[0].name, "Trait Group: analytical & others");
        assert_eq!(clusters[1].nodes, ["interest_music", "interest_work"]);
    }

    #[test]
    fn cross_cluster_collects_strong_partners() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let associations = analytics.cross_cluster(NodeType::Trait, NodeType::Interest, 7.0);
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].anchor, "trait_creative");
        assert_eq!(associations[0].partners, ["interest_music"]);
        assert!(associations[0].name.starts_with("trait-interest Association"));
    }

    #[test]
    fn dominant_type_ties_are_lexicographic() {
        let connectome = Connectome {
            nodes: vec![
                node("value_a", NodeType::Value, 1.0),
                node("interest_a", NodeType::Interest, 1.0),
            ],
            edges: Vec::new(),
        };
        let analytics = ConnectomeAnalytics::new(&connectome);
        assert_eq!(analytics.dominant_type(), Some(NodeType::Interest));
        assert_eq!(ConnectomeAnalytics::new(&sample()).dominant_type(), Some(NodeType::Trait));
        assert_eq!(ConnectomeAnalytics::new(&Connectome::default()).dominant_type(), None);
    }

    #[test]
    fn insights_follow_thresholds() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let dist = analytics.edge_weight_distribution();
        assert_eq!(dist, EdgeWeightDistribution { positive: 4, negative: 2, neutral: 0 });

        let insights = analytics.insights(&AnalyticsThresholds::default());
        let titles: Vec<&str> = insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "Personality Summary",
                "Core Strengths",
                "Key Influences",
                "Personality Patterns",
                "Character Balance",
                "Complexity"
            ]
        );
        assert!(insights[3].text.contains("Detected 3 distinct patterns"));
        assert!(insights[4].text.contains("balanced"));
        // 6 edges over 30 possible
        assert!(insights[5].text.contains("moderate"));

        let strict = AnalyticsThresholds {
            amplified_ratio: 1.5,
            high_density: 0.15,
            ..AnalyticsThresholds::default()
        };
        let insights = analytics.insights(&strict);
        assert!(insights[4].text.contains("amplified"));
        assert!(insights[5].text.contains("high complexity"));
    }

    #[test]
    fn sparse_negative_graph_reads_reserved_and_simple() {
        let mut nodes = Vec::new();
        for i in 0..5 {
            nodes.push(node(&format!("emotion_{i}"), NodeType::Emotion, 1.0));
        }
        let connectome = Connectome {
            nodes,
            edges: vec![edge("emotion_0", "emotion_1", -3.0)],
        };
        let insights =
            ConnectomeAnalytics::new(&connectome).insights(&AnalyticsThresholds::default());
        let balance = insights.iter().find(|i| i.title == "Character Balance").unwrap();
        let complexity = insights.iter().find(|i| i.title == "Complexity").unwrap();
        assert!(balance.text.contains("reserved"));
        assert!(complexity.text.contains("low complexity"));
    }

    #[test]
    fn complexity_and_deficiencies() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        // nodes 6/20*30 = 9, edges 6/40*30 = 4.5, types 3/4*20 = 15, density 6/15*20 = 8
        assert_eq!(analytics.complexity_score(), 37);
        assert_eq!(ConnectomeAnalytics::new(&Connectome::default()).complexity_score(), 0);

        let deficient = analytics.deficient_types();
        let types: Vec<NodeType> = deficient.iter().map(|d| d.node_type).collect();
        assert_eq!(types, [NodeType::Interest, NodeType::Value, NodeType::Emotion]);
        assert_eq!(deficient[1].current_count, 0);
    }

    #[test]
    fn recommendations_are_deterministic() {
        let connectome = sample();
        let analytics = ConnectomeAnalytics::new(&connectome);
        let topics = analytics.recommended_topics(5);
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0].topic, "free-time activities");
        assert_eq!(topics[1].topic, "values");
        assert_eq!(topics[3].topic, "creative and music");
        assert_eq!(topics, analytics.recommended_topics(5));
    }

    #[test]
    fn dangling_edges_are_left_out_of_the_weight_distribution() {
        let mut connectome = sample();
        connectome.edges.push(edge("trait_creative", "value_missing", 3.0));
        connectome.edges.push(edge("ghost", "interest_work", -2.0));
        let analytics = ConnectomeAnalytics::new(&connectome);
        let dist = analytics.edge_weight_distribution();
        assert_eq!(dist.positive, 4);
        assert_eq!(dist.negative, 2);
        let report = analytics.report(&AnalyticsThresholds::default());
        assert_eq!(dist.positive + dist.negative + dist.neutral, report.edge_count);
    }

    #[test]
    fn report_serializes() {
        let connectome = sample();
        let report = ConnectomeAnalytics::new(&connectome).report(&AnalyticsThresholds::default());
        assert_eq!(report.node_count, 6);
        assert_eq!(report.type_counts[&NodeType::Value], 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dominant_type"], "trait");
        assert_eq!(json["type_counts"]["trait"], 3);
    }
}
