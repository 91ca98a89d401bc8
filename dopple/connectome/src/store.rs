use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{node_id, slugify, Connectome, ConnectomeEdge, ConnectomeNode, NodeType};

/// Errors raised by the connectome store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectomeError {
    /// Edge endpoint missing, or an edge from a node to itself.
    #[error("invalid edge reference {source_id} -> {target_id}: {reason}")]
    InvalidReference {
        /// Requested source id.
        source_id: String,
        /// Requested target id.
        target_id: String,
        /// Why the reference was refused.
        reason: String,
    },
    /// Node name without any word characters.
    #[error("invalid node name: {0:?}")]
    InvalidName(String),
    /// Non-finite delta or out-of-range rate.
    #[error("invalid delta: {0}")]
    InvalidDelta(f64),
    /// Snapshot violating a graph invariant.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Upper bounds for node strength and edge weight magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectomeLimits {
    /// Maximum node strength (`Smax`).
    pub max_strength: f64,
    /// Maximum absolute edge weight (`Wmax`).
    pub max_edge_weight: f64,
}

impl Default for ConnectomeLimits {
    fn default() -> Self {
        Self {
            max_strength: 10.0,
            max_edge_weight: 10.0,
        }
    }
}

/// Result of a node reinforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReinforcement {
    /// Id of the resolved or created node.
    pub id: String,
    /// Strength after the update.
    pub strength: f64,
    /// True when the node did not exist before.
    pub created: bool,
}

type EdgeKey = (String, String);

/// Indexed connectome owned by one conversation.
///
/// Nodes are keyed by id and by `(type, normalized name)`; edges by their
/// ordered endpoint pair. Per-node adjacency sets make neighbour lookups
/// independent of the edge count.
#[derive(Debug, Clone, Default)]
pub struct ConnectomeStore {
    limits: ConnectomeLimits,
    nodes: IndexMap<String, ConnectomeNode>,
    keys: HashMap<(NodeType, String), String>,
    edges: IndexMap<EdgeKey, ConnectomeEdge>,
    outgoing: HashMap<String, IndexSet<String>>,
    incoming: HashMap<String, IndexSet<String>>,
}

impl ConnectomeStore {
    /// Creates an empty store with the given bounds.
    #[must_use]
    pub fn new(limits: ConnectomeLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Creates a store pre-loaded with a snapshot.
    pub fn from_connectome(
        limits: ConnectomeLimits,
        connectome: Connectome,
    ) -> Result<Self, ConnectomeError> {
        let mut store = Self::new(limits);
        store.load(connectome)?;
        Ok(store)
    }

    /// Bounds in effect.
    #[must_use]
    pub const fn limits(&self) -> ConnectomeLimits {
        self.limits
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when the store holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ConnectomeNode> {
        self.nodes.get(id)
    }

    /// Resolves the id of the node with this name and type, if present.
    #[must_use]
    pub fn node_id(&self, name: &str, node_type: NodeType) -> Option<&str> {
        self.keys
            .get(&(node_type, slugify(name)))
            .map(String::as_str)
    }

    /// Looks up the edge for an ordered pair.
    #[must_use]
    pub fn edge(&self, source_id: &str, target_id: &str) -> Option<&ConnectomeEdge> {
        self.edges
            .get(&(source_id.to_string(), target_id.to_string()))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ConnectomeNode> {
        self.nodes.values()
    }

    /// Applies `s' = min(Smax, s + δ(1 − s/Smax))` to the node with this name
    /// and type, creating it at `δ` when absent.
    pub fn reinforce_node(
        &mut self,
        name: &str,
        node_type: NodeType,
        delta: f64,
    ) -> Result<NodeReinforcement, ConnectomeError> {
        if !delta.is_finite() {
            return Err(ConnectomeError::InvalidDelta(delta));
        }
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ConnectomeError::InvalidName(name.to_string()));
        }
        let max = self.limits.max_strength;
        let key = (node_type, slug);
        if let Some(node) = self
            .keys
            .get(&key)
            .and_then(|id| self.nodes.get_mut(id))
        {
            let strength = node.strength;
            node.strength = (strength + delta * (1.0 - strength / max))
                .min(max)
                .clamp(0.0, max);
            return Ok(NodeReinforcement {
                id: node.id.clone(),
                strength: node.strength,
                created: false,
            });
        }

        let id = self.unique_id(name, node_type);
        let strength = delta.clamp(0.0, max);
        self.nodes.insert(
            id.clone(),
            ConnectomeNode {
                id: id.clone(),
                name: name.trim().to_string(),
                node_type,
                strength,
                description: None,
            },
        );
        self.keys.insert(key, id.clone());
        Ok(NodeReinforcement {
            id,
            strength,
            created: true,
        })
    }

    /// Merges `weight_delta` into the edge `source_id -> target_id`, creating
    /// it when absent. The result is clamped to `[-Wmax, Wmax]`.
    pub fn reinforce_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        weight_delta: f64,
    ) -> Result<f64, ConnectomeError> {
        let invalid = |reason: &str| ConnectomeError::InvalidReference {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            reason: reason.to_string(),
        };
        if source_id == target_id {
            return Err(invalid("self-loop"));
        }
        if !self.nodes.contains_key(source_id) {
            return Err(invalid("unknown source node"));
        }
        if !self.nodes.contains_key(target_id) {
            return Err(invalid("unknown target node"));
        }
        if !weight_delta.is_finite() {
            return Err(ConnectomeError::InvalidDelta(weight_delta));
        }

        let max = self.limits.max_edge_weight;
        let key = (source_id.to_string(), target_id.to_string());
        if let Some(edge) = self.edges.get_mut(&key) {
            edge.weight = (edge.weight + weight_delta).clamp(-max, max);
            return Ok(edge.weight);
        }
        let weight = weight_delta.clamp(-max, max);
        self.insert_edge(ConnectomeEdge {
            source: key.0.clone(),
            target: key.1.clone(),
            weight,
            description: None,
        });
        Ok(weight)
    }

    /// Snapshot of the whole graph, order preserved.
    #[must_use]
    pub fn connectome(&self) -> Connectome {
        Connectome {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Replaces the whole graph. Invalid snapshots leave the store untouched.
    pub fn set_connectome(&mut self, connectome: Connectome) -> Result<(), ConnectomeError> {
        let mut fresh = Self::new(self.limits);
        fresh.load(connectome)?;
        debug!(
            nodes = fresh.node_count(),
            edges = fresh.edge_count(),
            "connectome replaced"
        );
        *self = fresh;
        Ok(())
    }

    /// Distinct neighbour ids, outgoing first.
    #[must_use]
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let mut seen = IndexSet::new();
        for set in [self.outgoing.get(id), self.incoming.get(id)]
            .into_iter()
            .flatten()
        {
            seen.extend(set.iter().map(String::as_str));
        }
        seen.into_iter().collect()
    }

    /// Strongest connections of a node by absolute weight, with the node on
    /// the other end.
    #[must_use]
    pub fn node_connections(
        &self,
        id: &str,
        limit: usize,
    ) -> Vec<(&ConnectomeNode, &ConnectomeEdge)> {
        let outgoing = self
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|other| self.edges.get(&(id.to_string(), other.clone())));
        let incoming = self
            .incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|other| self.edges.get(&(other.clone(), id.to_string())));
        let mut connections: Vec<_> = outgoing
            .chain(incoming)
            .filter_map(|edge| {
                let other = if edge.source == id {
                    &edge.target
                } else {
                    &edge.source
                };
                self.nodes.get(other).map(|node| (node, edge))
            })
            .collect();
        connections.sort_by(|(a_node, a_edge), (b_node, b_edge)| {
            b_edge
                .weight
                .abs()
                .total_cmp(&a_edge.weight.abs())
                .then_with(|| a_node.id.cmp(&b_node.id))
        });
        connections.truncate(limit);
        connections
    }

    /// Multiplies every strength and weight by `rate` (`0 < rate <= 1`).
    /// Strengths stop at `min_strength`; nodes already below it keep their
    /// value.
    pub fn apply_decay(&mut self, rate: f64, min_strength: f64) -> Result<(), ConnectomeError> {
        if rate.is_nan() || rate <= 0.0 || rate > 1.0 {
            return Err(ConnectomeError::InvalidDelta(rate));
        }
        if !min_strength.is_finite() || min_strength < 0.0 {
            return Err(ConnectomeError::InvalidDelta(min_strength));
        }
        for node in self.nodes.values_mut() {
            let floor = min_strength.min(node.strength);
            node.strength = (node.strength * rate).max(floor);
        }
        for edge in self.edges.values_mut() {
            edge.weight *= rate;
        }
        Ok(())
    }

    /// Drops edges whose absolute weight is below `min_abs_weight`; returns
    /// how many were removed.
    pub fn prune_edges(&mut self, min_abs_weight: f64) -> usize {
        let before = self.edges.len();
        let weak: Vec<EdgeKey> = self
            .edges
            .iter()
            .filter(|(_, edge)| edge.weight.abs() < min_abs_weight)
            .map(|(key, _)| key.clone())
            .collect();
        for (source, target) in weak {
            self.edges.shift_remove(&(source.clone(), target.clone()));
            if let Some(set) = self.outgoing.get_mut(&source) {
                set.shift_remove(&target);
            }
            if let Some(set) = self.incoming.get_mut(&target) {
                set.shift_remove(&source);
            }
        }
        before - self.edges.len()
    }

    fn unique_id(&self, name: &str, node_type: NodeType) -> String {
        let base = node_id(name, node_type).unwrap_or_else(|| node_type.as_str().to_string());
        if !self.nodes.contains_key(&base) {
            return base;
        }
        (2_usize..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.nodes.contains_key(candidate))
            .unwrap_or(base)
    }

    fn insert_edge(&mut self, edge: ConnectomeEdge) {
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone());
        self.edges
            .insert((edge.source.clone(), edge.target.clone()), edge);
    }

    fn load(&mut self, connectome: Connectome) -> Result<(), ConnectomeError> {
        let max_strength = self.limits.max_strength;
        let max_weight = self.limits.max_edge_weight;

        for node in connectome.nodes {
            if node.id.is_empty() {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "node {:?} has an empty id",
                    node.name
                )));
            }
            let slug = slugify(&node.name);
            if slug.is_empty() {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "node {} has an empty name",
                    node.id
                )));
            }
            if !node.strength.is_finite() || !(0.0..=max_strength).contains(&node.strength) {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "node {} strength {} outside [0, {max_strength}]",
                    node.id, node.strength
                )));
            }
            if self.nodes.contains_key(&node.id) {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            let key = (node.node_type, slug);
            if self.keys.contains_key(&key) {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "duplicate {} node named {:?}",
                    node.node_type, node.name
                )));
            }
            self.keys.insert(key, node.id.clone());
            self.nodes.insert(node.id.clone(), node);
        }

        let mut pairs = HashSet::new();
        for edge in connectome.edges {
            if edge.source == edge.target {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "self-loop on {}",
                    edge.source
                )));
            }
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "edge {} -> {} references an unknown node",
                    edge.source, edge.target
                )));
            }
            if !edge.weight.is_finite() || edge.weight.abs() > max_weight {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "edge {} -> {} weight {} outside [-{max_weight}, {max_weight}]",
                    edge.source, edge.target, edge.weight
                )));
            }
            if !pairs.insert((edge.source.clone(), edge.target.clone())) {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "duplicate edge {} -> {}",
                    edge.source, edge.target
                )));
            }
            self.insert_edge(edge);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConnectomeStore {
        ConnectomeStore::new(ConnectomeLimits::default())
    }

    #[test]
    fn repeated_reinforcement_merges_into_one_node() {
        let mut store = store();
        let first = store
            .reinforce_node("curiosity", NodeType::Trait, 5.0)
            .unwrap();
        let second = store
            .reinforce_node("curiosity", NodeType::Trait, 5.0)
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.node_count(), 1);
        assert!((second.strength - 7.5).abs() < 1e-9);
        assert_eq!(store.node(&first.id).unwrap().name, "curiosity");
    }

    #[test]
    fn strength_is_monotone_and_bounded() {
        let mut store = store();
        let mut last = 0.0;
        for _ in 0..200 {
            let update = store.reinforce_node("Music", NodeType::Interest, 4.0).unwrap();
            assert!(update.strength >= last);
            assert!(update.strength <= 10.0);
            last = update.strength;
        }
        let big = store.reinforce_node("Loud", NodeType::Emotion, 50.0).unwrap();
        assert!((big.strength - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn name_normalization_resolves_same_node() {
        let mut store = store();
        let a = store.reinforce_node("Deep Focus", NodeType::Trait, 1.0).unwrap();
        let b = store.reinforce_node("deep   focus", NodeType::Trait, 1.0).unwrap();
        let c = store.reinforce_node("deep focus", NodeType::Value, 1.0).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(store.node_id("DEEP FOCUS", NodeType::Trait), Some(a.id.as_str()));
    }

    #[test]
    fn rejects_empty_names_and_non_finite_deltas() {
        let mut store = store();
        assert!(matches!(
            store.reinforce_node("  ", NodeType::Trait, 1.0),
            Err(ConnectomeError::InvalidName(_))
        ));
        assert!(matches!(
            store.reinforce_node("calm", NodeType::Trait, f64::NAN),
            Err(ConnectomeError::InvalidDelta(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn edge_weights_stay_within_bounds() {
        let mut store = store();
        let a = store.reinforce_node("happy", NodeType::Emotion, 1.0).unwrap().id;
        let b = store.reinforce_node("work", NodeType::Interest, 1.0).unwrap().id;
        let deltas = [4.0, 9.5, -30.0, 2.5, 2.5, 100.0, -0.5, -7.0, -7.0, -7.0];
        for delta in deltas {
            let weight = store.reinforce_edge(&a, &b, delta).unwrap();
            assert!((-10.0..=10.0).contains(&weight));
            let reverse = store.reinforce_edge(&b, &a, -delta).unwrap();
            assert!((-10.0..=10.0).contains(&reverse));
        }
        assert_eq!(store.edge_count(), 2);
        assert!((store.edge(&a, &b).unwrap().weight + 10.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_references_leave_state_unchanged() {
        let mut store = store();
        let a = store.reinforce_node("happy", NodeType::Emotion, 2.0).unwrap().id;
        let before = store.connectome();

        let err = store.reinforce_edge("ghost", "phantom", 1.0).unwrap_err();
        assert!(matches!(err, ConnectomeError::InvalidReference { .. }));
        assert!(store.reinforce_edge(&a, "phantom", 1.0).is_err());
        let self_loop = store.reinforce_edge(&a, &a, 1.0).unwrap_err();
        assert!(self_loop.to_string().contains("self-loop"));

        assert_eq!(store.connectome(), before);
    }

    #[test]
    fn set_then_get_round_trips_exactly() {
        let json = r#"{
            "nodes": [
                {"id":"trait_creative","name":"creative","type":"trait","strength":6.25,"description":"makes things"},
                {"id":"interest_music","name":"music","type":"interest","strength":3.0},
                {"id":"emotion_sad","name":"sad","type":"emotion","strength":0.5}
            ],
            "edges": [
                {"source":"trait_creative","target":"interest_music","weight":7.3},
                {"source":"emotion_sad","target":"trait_creative","weight":-2.1,"description":"dampens"}
            ]
        }"#;
        let snapshot = Connectome::from_json(json).unwrap();
        let mut store = store();
        store.set_connectome(snapshot.clone()).unwrap();
        assert_eq!(store.connectome(), snapshot);
        let again = Connectome::from_json(&store.connectome().to_json().unwrap()).unwrap();
        assert_eq!(again, snapshot);
        assert_eq!(
            store.node_id("Music", NodeType::Interest),
            Some("interest_music")
        );
    }

    #[test]
    fn invalid_snapshot_is_rejected_without_side_effects() {
        let mut store = store();
        store.reinforce_node("kind", NodeType::Value, 3.0).unwrap();
        let before = store.connectome();

        let dangling = Connectome {
            nodes: before.nodes.clone(),
            edges: vec![ConnectomeEdge {
                source: "value_kind".into(),
                target: "missing".into(),
                weight: 1.0,
                description: None,
            }],
        };
        assert!(matches!(
            store.set_connectome(dangling),
            Err(ConnectomeError::InvalidSnapshot(_))
        ));

        let mut duplicate = before.clone();
        duplicate.nodes.push(duplicate.nodes[0].clone());
        assert!(store.set_connectome(duplicate).is_err());

        let mut too_strong = before.clone();
        too_strong.nodes[0].strength = 11.0;
        assert!(store.set_connectome(too_strong).is_err());

        assert_eq!(store.connectome(), before);
    }

    #[test]
    fn set_connectome_is_the_only_delete() {
        let mut store = store();
        store.reinforce_node("happy", NodeType::Emotion, 2.0).unwrap();
        store.set_connectome(Connectome::default()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn created_ids_avoid_collisions_with_loaded_nodes() {
        let mut store = store();
        store
            .set_connectome(Connectome {
                nodes: vec![ConnectomeNode {
                    id: "trait_calm".into(),
                    name: "serene".into(),
                    node_type: NodeType::Trait,
                    strength: 1.0,
                    description: None,
                }],
                edges: Vec::new(),
            })
            .unwrap();
        let calm = store.reinforce_node("calm", NodeType::Trait, 1.0).unwrap();
        assert_eq!(calm.id, "trait_calm_2");
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn neighbors_and_connections_use_adjacency() {
        let mut store = store();
        let a = store.reinforce_node("happy", NodeType::Emotion, 1.0).unwrap().id;
        let b = store.reinforce_node("work", NodeType::Interest, 1.0).unwrap().id;
        let c = store.reinforce_node("family", NodeType::Interest, 1.0).unwrap().id;
        store.reinforce_edge(&a, &b, 2.0).unwrap();
        store.reinforce_edge(&c, &a, -6.0).unwrap();
        store.reinforce_edge(&b, &a, 1.0).unwrap();

        assert_eq!(store.neighbors(&a), vec![b.as_str(), c.as_str()]);
        let connections = store.node_connections(&a, 2);
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].0.id, c);
        assert!((connections[0].1.weight + 6.0).abs() < 1e-9);
    }

    #[test]
    fn decay_and_prune() {
        let mut store = store();
        let a = store.reinforce_node("happy", NodeType::Emotion, 4.0).unwrap().id;
        let b = store.reinforce_node("work", NodeType::Interest, 4.0).unwrap().id;
        store.reinforce_edge(&a, &b, 0.5).unwrap();
        store.reinforce_edge(&b, &a, 5.0).unwrap();

        store.apply_decay(0.95, 0.0).unwrap();
        assert!((store.node(&a).unwrap().strength - 3.8).abs() < 1e-9);
        assert!(store.apply_decay(1.5, 0.0).is_err());
        assert!(store.apply_decay(0.5, -1.0).is_err());

        assert_eq!(store.prune_edges(0.5), 1);
        assert!(store.edge(&a, &b).is_none());
        assert_eq!(store.neighbors(&a), vec![b.as_str()]);
    }

    #[test]
    fn decay_stops_at_the_strength_floor() {
        let mut store = store();
        let strong = store.reinforce_node("happy", NodeType::Emotion, 3.0).unwrap().id;
        let faint = store.reinforce_node("calm", NodeType::Emotion, 0.4).unwrap().id;
        for _ in 0..50 {
            store.apply_decay(0.5, 1.0).unwrap();
        }
        assert!((store.node(&strong).unwrap().strength - 1.0).abs() < 1e-9);
        // already under the floor: left alone rather than raised or decayed
        assert!((store.node(&faint).unwrap().strength - 0.4).abs() < 1e-9);
    }
}
