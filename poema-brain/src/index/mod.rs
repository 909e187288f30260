//! # Associative Index - The Archive's Memory
//!
//! Passages become nodes: a hashed feature vector plus a set of concept
//! tags. Two nodes are linked when their weighted similarity
//!
//! ```text
//! w = alpha * overlap(tags) + beta * cosine(v1, v2)
//! ```
//!
//! exceeds the edge threshold. Edges are symmetric (stored on both
//! endpoints), fade multiplicatively on every consolidation pass and are
//! dropped under the prune floor.
//!
//! The archive is bounded: past `max_nodes` the oldest passage goes, and
//! each node keeps at most `max_edges_per_node` of its strongest edges.
//!
//! The vector length is fixed at construction. Vectors of any other length
//! are rejected.

mod cluster;

pub use cluster::{kmeans, Cluster};

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use poema_core::config::IndexConfig;
use poema_core::error::{PoemaError, PoemaResult};
use poema_core::text::{self, Concept};
use poema_core::{Consolidation, ConsolidationReport, EntityId, RandomSource};

/// One archived passage
#[derive(Clone, Debug, Serialize)]
pub struct IndexNode {
    pub id: EntityId,
    pub text: String,
    pub tags: BTreeSet<Concept>,
    pub vector: Vec<f32>,
    /// Neighbour -> weight (mirrored on the neighbour)
    pub edges: BTreeMap<EntityId, f32>,
}

/// A ranked query result
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: EntityId,
    pub score: f32,
    pub text: String,
}

/// Index-wide figures
#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexStats {
    pub nodes: usize,
    pub edges: usize,
    pub concepts: usize,
    pub mean_degree: f32,
    pub mean_weight: f32,
}

/// Concept keys to ids, plus a similarity graph over fixed-length vectors
pub struct AssociativeIndex {
    dims: usize,
    alpha: f32,
    beta: f32,
    edge_threshold: f32,
    decay_factor: f32,
    prune_floor: f32,
    top_k: usize,
    max_nodes: usize,
    max_edges_per_node: usize,

    nodes: BTreeMap<EntityId, IndexNode>,
    concepts: BTreeMap<Concept, BTreeSet<EntityId>>,
}

impl AssociativeIndex {
    /// Build an empty index, validating the weights
    pub fn new(config: &IndexConfig) -> PoemaResult<Self> {
        if config.dims == 0 {
            return Err(PoemaError::config("index dims must be positive"));
        }
        if !(config.alpha.is_finite() && config.beta.is_finite())
            || ((config.alpha + config.beta) - 1.0).abs() > 1e-4
        {
            return Err(PoemaError::config(format!(
                "alpha + beta must equal 1 (got {} + {})",
                config.alpha, config.beta
            )));
        }
        if !(config.decay_factor > 0.0 && config.decay_factor < 1.0) {
            return Err(PoemaError::config("decay_factor must be within (0, 1)"));
        }
        if config.max_nodes == 0 || config.max_edges_per_node == 0 {
            return Err(PoemaError::config("archive capacity and edge cap must be positive"));
        }

        Ok(Self {
            dims: config.dims,
            alpha: config.alpha,
            beta: config.beta,
            edge_threshold: config.edge_threshold,
            decay_factor: config.decay_factor,
            prune_floor: config.prune_floor,
            top_k: config.top_k,
            max_nodes: config.max_nodes,
            max_edges_per_node: config.max_edges_per_node,
            nodes: BTreeMap::new(),
            concepts: BTreeMap::new(),
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    // ========================================================================
    // INDEXING
    // ========================================================================

    /// Index a passage under `id`, returning the number of edges created
    ///
    /// Re-indexing an existing id replaces its entry and edges.
    pub fn index_entity(&mut self, id: EntityId, passage: &str) -> PoemaResult<usize> {
        let tokens = text::tokenize(passage);
        let tags = text::concepts_for(&tokens);
        let vector = text::vectorize(&tokens, self.dims);
        self.index_vector(id, passage, vector, tags)
    }

    /// Index a precomputed vector
    ///
    /// At capacity the oldest (lowest) id is evicted first. The new node
    /// keeps only its strongest `max_edges_per_node` links, and a neighbour
    /// pushed over the cap drops its weakest edge on both endpoints.
    pub fn index_vector(
        &mut self,
        id: EntityId,
        passage: &str,
        vector: Vec<f32>,
        tags: BTreeSet<Concept>,
    ) -> PoemaResult<usize> {
        self.check_dims(&vector)?;
        self.remove(id);

        while self.nodes.len() >= self.max_nodes {
            let Some(oldest) = self.nodes.keys().next().copied() else {
                break;
            };
            self.remove(oldest);
            tracing::debug!("📚 Archive full, evicted {}", oldest);
        }

        let mut links = Vec::new();
        for (other_id, other) in &self.nodes {
            let w = self.weight(&tags, &vector, &other.tags, &other.vector);
            if w > self.edge_threshold {
                links.push((*other_id, w));
            }
        }
        links.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        links.truncate(self.max_edges_per_node);

        for concept in &tags {
            self.concepts.entry(*concept).or_default().insert(id);
        }
        self.nodes.insert(
            id,
            IndexNode {
                id,
                text: passage.to_string(),
                tags,
                vector,
                edges: links.iter().copied().collect(),
            },
        );

        for (other_id, w) in &links {
            if let Some(other) = self.nodes.get_mut(other_id) {
                other.edges.insert(id, *w);
            }
            self.trim_edges(*other_id);
        }

        let created = self.nodes.get(&id).map_or(0, |node| node.edges.len());
        tracing::debug!("📚 Indexed {} ({} edges)", id, created);
        Ok(created)
    }

    /// Id of an archived passage with exactly this text
    pub fn find_text(&self, passage: &str) -> Option<EntityId> {
        self.nodes.values().find(|node| node.text == passage).map(|node| node.id)
    }

    /// Drop the weakest edges of `id` until it is within the cap
    fn trim_edges(&mut self, id: EntityId) {
        loop {
            let weakest = match self.nodes.get(&id) {
                Some(node) if node.edges.len() > self.max_edges_per_node => node
                    .edges
                    .iter()
                    .min_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(a.0)))
                    .map(|(other, _)| *other),
                _ => None,
            };
            let Some(other) = weakest else {
                return;
            };
            if let Some(node) = self.nodes.get_mut(&id) {
                node.edges.remove(&other);
            }
            if let Some(node) = self.nodes.get_mut(&other) {
                node.edges.remove(&id);
            }
        }
    }

    /// Forget a node and every edge touching it
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        for neighbour in node.edges.keys() {
            if let Some(other) = self.nodes.get_mut(neighbour) {
                other.edges.remove(&id);
            }
        }
        for concept in &node.tags {
            if let Some(ids) = self.concepts.get_mut(concept) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.concepts.remove(concept);
                }
            }
        }
        true
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Rank nodes against free text (empty or stopword-only input: no hits)
    pub fn query(&self, passage: &str) -> Vec<QueryHit> {
        let tokens = text::tokenize(passage);
        if tokens.is_empty() {
            return Vec::new();
        }
        let tags = text::concepts_for(&tokens);
        let vector = text::vectorize(&tokens, self.dims);
        self.rank(&vector, &tags)
    }

    /// Rank nodes against a precomputed vector
    pub fn query_vector(&self, vector: &[f32], tags: &BTreeSet<Concept>) -> PoemaResult<Vec<QueryHit>> {
        self.check_dims(vector)?;
        Ok(self.rank(vector, tags))
    }

    /// Top-k by weighted similarity, descending; ties by ascending id
    fn rank(&self, vector: &[f32], tags: &BTreeSet<Concept>) -> Vec<QueryHit> {
        let mut hits: Vec<QueryHit> = self
            .nodes
            .values()
            .map(|node| QueryHit {
                id: node.id,
                score: self.weight(tags, vector, &node.tags, &node.vector),
                text: node.text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(self.top_k);
        hits
    }

    /// Neighbours of a node, strongest first
    pub fn neighbors(&self, id: EntityId) -> Vec<(EntityId, f32)> {
        let mut out: Vec<(EntityId, f32)> = self
            .nodes
            .get(&id)
            .map(|n| n.edges.iter().map(|(k, w)| (*k, *w)).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Ids tagged with a concept, ascending
    pub fn ids_for_concept(&self, concept: Concept) -> Vec<EntityId> {
        self.concepts
            .get(&concept)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn node(&self, id: EntityId) -> Option<&IndexNode> {
        self.nodes.get(&id)
    }

    // ========================================================================
    // CONSOLIDATION
    // ========================================================================

    /// Fade every edge by the decay factor and prune the faint ones
    pub fn decay(&mut self) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();
        let (factor, floor) = (self.decay_factor, self.prune_floor);

        for node in self.nodes.values_mut() {
            let id = node.id;
            node.edges.retain(|other, w| {
                *w *= factor;
                let keep = *w >= floor;
                // Count each symmetric edge once
                if id < *other {
                    if keep {
                        report.decayed += 1;
                    } else {
                        report.pruned += 1;
                    }
                }
                keep
            });
        }

        if report.pruned > 0 {
            tracing::debug!("🍂 Decay pruned {} edges ({} remain)", report.pruned, report.decayed);
        }
        report
    }

    // ========================================================================
    // CLUSTERS & STATS
    // ========================================================================

    /// K-means over node vectors
    pub fn clusters(&self, k: usize, iterations: usize, rng: &mut dyn RandomSource) -> Vec<Cluster> {
        let points: Vec<(EntityId, &[f32])> = self
            .nodes
            .values()
            .map(|n| (n.id, n.vector.as_slice()))
            .collect();
        kmeans(&points, k, iterations, rng)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct (undirected) edges
    pub fn edge_count(&self) -> usize {
        self.nodes
            .values()
            .map(|n| n.edges.keys().filter(|other| n.id < **other).count())
            .sum()
    }

    pub fn stats(&self) -> IndexStats {
        let nodes = self.nodes.len();
        let edges = self.edge_count();
        let weight_sum: f32 = self
            .nodes
            .values()
            .flat_map(|n| n.edges.iter().filter(move |(other, _)| n.id < **other).map(|(_, w)| *w))
            .sum();

        IndexStats {
            nodes,
            edges,
            concepts: self.concepts.len(),
            mean_degree: if nodes == 0 { 0.0 } else { 2.0 * edges as f32 / nodes as f32 },
            mean_weight: if edges == 0 { 0.0 } else { weight_sum / edges as f32 },
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn weight(&self, tags_a: &BTreeSet<Concept>, a: &[f32], tags_b: &BTreeSet<Concept>, b: &[f32]) -> f32 {
        self.alpha * text::tag_overlap(tags_a, tags_b) + self.beta * text::cosine_similarity(a, b)
    }

    fn check_dims(&self, vector: &[f32]) -> PoemaResult<()> {
        if vector.len() != self.dims {
            return Err(PoemaError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl Consolidation for AssociativeIndex {
    fn consolidate(&mut self) -> ConsolidationReport {
        self.decay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> AssociativeIndex {
        AssociativeIndex::new(&IndexConfig::default()).unwrap()
    }

    fn tags(list: &[Concept]) -> BTreeSet<Concept> {
        list.iter().copied().collect()
    }

    fn unit(dims: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_rejects_unbalanced_weights() {
        let config = IndexConfig { alpha: 0.5, beta: 0.6, ..IndexConfig::default() };
        assert!(matches!(AssociativeIndex::new(&config), Err(PoemaError::Config(_))));
    }

    #[test]
    fn test_empty_query() {
        let mut idx = index();
        idx.index_entity(EntityId(1), "the forest dreams").unwrap();
        assert!(idx.query("").is_empty());
        assert!(idx.query("the and of").is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut idx = index();
        let result = idx.index_vector(EntityId(1), "x", vec![1.0; 3], BTreeSet::new());
        assert!(matches!(result, Err(PoemaError::DimensionMismatch { expected: 32, actual: 3 })));
        assert!(idx.query_vector(&[0.5; 7], &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_edges_are_symmetric() {
        let mut idx = index();
        let dims = idx.dims();
        idx.index_vector(EntityId(1), "a", unit(dims, 0), tags(&[Concept::Nature])).unwrap();
        let created = idx.index_vector(EntityId(2), "b", unit(dims, 0), tags(&[Concept::Nature])).unwrap();
        idx.index_vector(EntityId(3), "c", unit(dims, 5), tags(&[Concept::Cosmos])).unwrap();

        assert_eq!(created, 1);
        assert_eq!(idx.edge_count(), 1);
        let w12 = idx.node(EntityId(1)).unwrap().edges[&EntityId(2)];
        let w21 = idx.node(EntityId(2)).unwrap().edges[&EntityId(1)];
        assert_eq!(w12, w21);
        assert!((w12 - 1.0).abs() < 1e-5);
        assert!(idx.neighbors(EntityId(3)).is_empty());
    }

    #[test]
    fn test_edges_vanish_under_decay() {
        let mut idx = index();
        let dims = idx.dims();
        idx.index_vector(EntityId(1), "a", unit(dims, 2), BTreeSet::new()).unwrap();
        idx.index_vector(EntityId(2), "b", unit(dims, 2), BTreeSet::new()).unwrap();
        assert_eq!(idx.edge_count(), 1);

        let first = idx.decay();
        assert_eq!(first, ConsolidationReport { decayed: 1, pruned: 0 });

        let mut rounds = 1;
        while idx.edge_count() > 0 {
            idx.decay();
            rounds += 1;
            assert!(rounds < 200);
        }
        assert!(idx.neighbors(EntityId(1)).is_empty());
        assert!(idx.neighbors(EntityId(2)).is_empty());
    }

    #[test]
    fn test_query_ranks_and_breaks_ties_by_id() {
        let config = IndexConfig { top_k: 2, ..IndexConfig::default() };
        let mut idx = AssociativeIndex::new(&config).unwrap();
        let dims = idx.dims();
        idx.index_vector(EntityId(3), "c", unit(dims, 1), BTreeSet::new()).unwrap();
        idx.index_vector(EntityId(1), "a", unit(dims, 1), BTreeSet::new()).unwrap();
        idx.index_vector(EntityId(2), "b", unit(dims, 4), BTreeSet::new()).unwrap();

        let hits = idx.query_vector(&unit(dims, 1), &BTreeSet::new()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, EntityId(1));
        assert_eq!(hits[1].id, EntityId(3));
    }

    #[test]
    fn test_text_roundtrip_finds_passage() {
        let mut idx = index();
        idx.index_entity(EntityId(1), "the river remembers the sea").unwrap();
        idx.index_entity(EntityId(2), "algorithms process digital signals").unwrap();
        let hits = idx.query("river and sea");
        assert_eq!(hits[0].id, EntityId(1));
        assert_eq!(idx.ids_for_concept(Concept::Nature), vec![EntityId(1)]);
    }

    #[test]
    fn test_reindex_replaces() {
        let mut idx = index();
        idx.index_entity(EntityId(1), "forest roots").unwrap();
        idx.index_entity(EntityId(1), "machine code").unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx.ids_for_concept(Concept::Nature).is_empty());
        assert_eq!(idx.ids_for_concept(Concept::Technology), vec![EntityId(1)]);

        assert!(idx.remove(EntityId(1)));
        assert!(idx.is_empty());
        assert_eq!(idx.stats().nodes, 0);
    }

    #[test]
    fn test_clusters_on_empty_index() {
        let idx = index();
        let mut rng = poema_core::SeededRandom::from_seed(1);
        assert!(idx.clusters(3, 10, &mut rng).is_empty());
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let config = IndexConfig { max_nodes: 3, ..IndexConfig::default() };
        let mut idx = AssociativeIndex::new(&config).unwrap();
        for n in 1..=5 {
            idx.index_entity(EntityId(n), &format!("passage number {} about the river", n)).unwrap();
        }

        assert_eq!(idx.len(), 3);
        assert!(idx.node(EntityId(1)).is_none());
        assert!(idx.node(EntityId(2)).is_none());
        for node in [3, 4, 5] {
            let node = idx.node(EntityId(node)).unwrap();
            assert!(node.edges.keys().all(|other| other.0 >= 3));
        }
    }

    #[test]
    fn test_edge_cap_keeps_strongest() {
        let config = IndexConfig { max_edges_per_node: 2, ..IndexConfig::default() };
        let mut idx = AssociativeIndex::new(&config).unwrap();
        let dims = idx.dims();

        // Neighbours are too far apart to link each other, but all reach
        // the hub on axis 0, the later ones more strongly
        for (n, lean) in [(1u64, 0.55f32), (2, 0.6), (3, 0.65), (4, 0.7)] {
            let mut v = vec![0.0; dims];
            v[0] = lean;
            v[n as usize] = (1.0 - lean * lean).sqrt();
            idx.index_vector(EntityId(n), "near", v, BTreeSet::new()).unwrap();
        }
        assert_eq!(idx.edge_count(), 0);
        let created = idx.index_vector(EntityId(10), "hub", unit(dims, 0), BTreeSet::new()).unwrap();

        assert_eq!(created, 2);
        let hub: Vec<_> = idx.node(EntityId(10)).unwrap().edges.keys().copied().collect();
        assert_eq!(hub, vec![EntityId(3), EntityId(4)]);
        for node in idx.nodes.values() {
            assert!(node.edges.len() <= 2);
            for (other, w) in &node.edges {
                assert_eq!(idx.node(*other).unwrap().edges.get(&node.id), Some(w));
            }
        }
    }

    #[test]
    fn test_many_passages_stay_bounded() {
        let config = IndexConfig { max_nodes: 40, max_edges_per_node: 4, ..IndexConfig::default() };
        let mut idx = AssociativeIndex::new(&config).unwrap();
        for n in 0..400u64 {
            idx.index_entity(EntityId(n), &format!("forest light {} dreams of the sea", n % 7)).unwrap();
        }

        let stats = idx.stats();
        assert_eq!(stats.nodes, 40);
        assert!(stats.edges <= 40 * 4 / 2);
    }

    #[test]
    fn test_find_text() {
        let mut idx = index();
        idx.index_entity(EntityId(4), "the moon hums").unwrap();
        assert_eq!(idx.find_text("the moon hums"), Some(EntityId(4)));
        assert_eq!(idx.find_text("the moon"), None);
    }
}
