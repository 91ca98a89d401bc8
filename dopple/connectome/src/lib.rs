#![deny(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![warn(missing_docs)]

//! Per-dopple connectome: a weighted graph of traits, interests, emotions and
//! values, reinforced from conversation and analysed for reporting.

/// Analytics derived from a read-only connectome snapshot.
pub mod analytics;
/// Node, edge and snapshot types plus id helpers.
pub mod model;
/// Mutable, indexed connectome store.
pub mod store;

pub use analytics::{
    AnalyticsThresholds, Association, Cluster, ConnectomeAnalytics, ConnectomeReport,
    DeficientType, EdgeWeightDistribution, Insight, NodeStat, RankMetric, TopicRecommendation,
};
pub use model::{
    node_id, slugify, Connectome, ConnectomeEdge, ConnectomeNode, NodeType, ParseNodeTypeError,
};
pub use store::{ConnectomeError, ConnectomeLimits, ConnectomeStore, NodeReinforcement};
