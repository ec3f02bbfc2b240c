//! Academic Knowledge Graph
//!
//! Heterogeneous directed multigraph over students, courses and tracks:
//! - Course -> Track (`BelongsTo`)
//! - Course -> Course (`HasPrereq`)
//! - Student -> Course (`Took`, one edge per attempt)
//!
//! Node embeddings are trained with uniform random walks over the undirected
//! adjacency and a simplified skip-gram update without negative sampling.

use curricula_core::{Course, HistoryRecord};
use ndarray::{Array1, Array2};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const WINDOW_SIZE: usize = 5;
const LEARNING_RATE: f32 = 0.01;
const INIT_STD_DEV: f32 = 0.1;
const NORM_EPSILON: f32 = 1e-10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphNode {
    Student(String),
    Course(String),
    Track(String),
}

impl GraphNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            GraphNode::Student(_) => NodeKind::Student,
            GraphNode::Course(_) => NodeKind::Course,
            GraphNode::Track(_) => NodeKind::Track,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            GraphNode::Student(id) | GraphNode::Course(id) | GraphNode::Track(id) => id,
        }
    }

    fn new(kind: NodeKind, id: &str) -> Self {
        match kind {
            NodeKind::Student => GraphNode::Student(id.to_string()),
            NodeKind::Course => GraphNode::Course(id.to_string()),
            NodeKind::Track => GraphNode::Track(id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Student,
    Course,
    Track,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GraphEdge {
    BelongsTo,
    HasPrereq,
    Took { grade: f32, passed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Track,
    Prereq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedCourse {
    pub course_code: String,
    pub relation: Relation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_students: usize,
    pub num_courses: usize,
    pub num_tracks: usize,
    pub num_took: usize,
    pub num_prereq: usize,
    pub num_belongs_to: usize,
}

/// Knowledge graph plus its node embedding table
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    index: HashMap<GraphNode, NodeIndex>,
    dimensions: usize,
    /// Row `i` is the embedding of node index `i`
    embeddings: Option<Array2<f32>>,
}

impl KnowledgeGraph {
    /// Build the graph from catalog data
    ///
    /// Dangling prerequisites and history records for unknown courses are
    /// skipped; both are surfaced by the validation report.
    pub fn build(courses: &[Course], records: &[HistoryRecord], pass_threshold: f32) -> Self {
        let mut kg = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            dimensions: 0,
            embeddings: None,
        };

        for course in courses {
            kg.add_node(GraphNode::Course(course.code.clone()));
        }
        for course in courses {
            for track in &course.tracks {
                kg.add_node(GraphNode::Track(track.clone()));
            }
        }
        for record in records {
            kg.add_node(GraphNode::Student(record.student.clone()));
        }

        for course in courses {
            let from = kg.index[&GraphNode::Course(course.code.clone())];
            for track in &course.tracks {
                let to = kg.index[&GraphNode::Track(track.clone())];
                kg.graph.add_edge(from, to, GraphEdge::BelongsTo);
            }
        }

        for course in courses {
            let from = kg.index[&GraphNode::Course(course.code.clone())];
            for prereq in &course.prerequisites {
                if let Some(&to) = kg.index.get(&GraphNode::Course(prereq.clone())) {
                    kg.graph.add_edge(from, to, GraphEdge::HasPrereq);
                }
            }
        }

        let mut skipped = 0usize;
        for record in records {
            let Some(&to) = kg.index.get(&GraphNode::Course(record.course_code.clone())) else {
                skipped += 1;
                continue;
            };
            let from = kg.index[&GraphNode::Student(record.student.clone())];
            kg.graph.add_edge(
                from,
                to,
                GraphEdge::Took {
                    grade: record.grade,
                    passed: record.grade >= pass_threshold,
                },
            );
        }

        if skipped > 0 {
            debug!(skipped, "Skipped history records for courses outside the catalog");
        }

        info!(
            nodes = kg.graph.node_count(),
            edges = kg.graph.edge_count(),
            "Knowledge graph built"
        );

        kg
    }

    /// Rebuild a graph from persisted nodes and edges, preserving order
    pub fn from_parts(
        nodes: Vec<GraphNode>,
        edges: Vec<(usize, usize, GraphEdge)>,
        dimensions: usize,
        embeddings: Option<Array2<f32>>,
    ) -> anyhow::Result<Self> {
        let mut kg = Self {
            graph: DiGraph::with_capacity(nodes.len(), edges.len()),
            index: HashMap::with_capacity(nodes.len()),
            dimensions,
            embeddings: None,
        };

        for node in nodes {
            if kg.index.contains_key(&node) {
                anyhow::bail!("Duplicate graph node {:?}", node);
            }
            kg.add_node(node);
        }

        let n = kg.graph.node_count();
        for (from, to, edge) in edges {
            if from >= n || to >= n {
                anyhow::bail!("Edge ({}, {}) references a node outside 0..{}", from, to, n);
            }
            kg.graph
                .add_edge(NodeIndex::new(from), NodeIndex::new(to), edge);
        }

        if let Some(ref table) = embeddings {
            if table.nrows() != n || table.ncols() != dimensions {
                anyhow::bail!(
                    "Embedding table is {}x{}, expected {}x{}",
                    table.nrows(),
                    table.ncols(),
                    n,
                    dimensions
                );
            }
        }
        kg.embeddings = embeddings;

        Ok(kg)
    }

    fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.index.insert(node, idx);
        idx
    }

    /// Nodes in index order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(move |i| &self.graph[i])
    }

    /// Edges in insertion order as (source, target, edge)
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, GraphEdge)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
    }

    pub fn node_index(&self, kind: NodeKind, id: &str) -> Option<usize> {
        self.index.get(&GraphNode::new(kind, id)).map(|i| i.index())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embeddings(&self) -> Option<&Array2<f32>> {
        self.embeddings.as_ref()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            num_nodes: self.graph.node_count(),
            num_edges: self.graph.edge_count(),
            ..Default::default()
        };

        for node in self.graph.node_weights() {
            match node.kind() {
                NodeKind::Student => stats.num_students += 1,
                NodeKind::Course => stats.num_courses += 1,
                NodeKind::Track => stats.num_tracks += 1,
            }
        }
        for edge in self.graph.edge_weights() {
            match edge {
                GraphEdge::BelongsTo => stats.num_belongs_to += 1,
                GraphEdge::HasPrereq => stats.num_prereq += 1,
                GraphEdge::Took { .. } => stats.num_took += 1,
            }
        }

        stats
    }

    /// Distinct neighbors in either direction, ordered by node index
    fn undirected_adjacency(&self) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|n| {
                let distinct: BTreeSet<usize> = self
                    .graph
                    .neighbors_undirected(n)
                    .map(|m| m.index())
                    .collect();
                distinct.into_iter().collect()
            })
            .collect()
    }

    /// Train node embeddings in place
    pub fn train_embeddings(
        &mut self,
        dimensions: usize,
        walk_length: usize,
        num_walks: usize,
        rng: &mut StdRng,
    ) -> anyhow::Result<()> {
        let n = self.graph.node_count();
        let normal = Normal::new(0.0f32, INIT_STD_DEV)?;
        let mut embeddings = Array2::from_shape_fn((n, dimensions), |_| normal.sample(rng));

        let adjacency = self.undirected_adjacency();

        for walk_id in 0..num_walks {
            if (walk_id + 1) % 50 == 0 {
                debug!("Random walk round {}/{}", walk_id + 1, num_walks);
            }
            for start in 0..n {
                let walk = random_walk(start, walk_length, &adjacency, rng);
                update_embeddings(&mut embeddings, &walk);
            }
        }

        self.dimensions = dimensions;
        self.embeddings = Some(embeddings);

        info!(nodes = n, dimensions, num_walks, "Node embeddings trained");
        Ok(())
    }

    /// Stored embedding, or zeros of the configured dimension
    pub fn embedding(&self, kind: NodeKind, id: &str) -> Array1<f32> {
        match (self.node_index(kind, id), &self.embeddings) {
            (Some(idx), Some(table)) => table.row(idx).to_owned(),
            _ => Array1::zeros(self.dimensions),
        }
    }

    pub fn student_embedding(&self, student: &str) -> Array1<f32> {
        self.embedding(NodeKind::Student, student)
    }

    pub fn course_embedding(&self, course_code: &str) -> Array1<f32> {
        self.embedding(NodeKind::Course, course_code)
    }

    /// Outgoing neighbors in edge insertion order, without repeats
    fn successors_in_order(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);

        let mut seen = BTreeSet::new();
        edges
            .into_iter()
            .filter_map(|(_, t)| seen.insert(t).then_some(t))
            .collect()
    }

    fn predecessors_in_order(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);

        let mut seen = BTreeSet::new();
        edges
            .into_iter()
            .filter_map(|(_, s)| seen.insert(s).then_some(s))
            .collect()
    }

    /// Courses sharing a track, then direct prerequisites, truncated to `k`
    ///
    /// A sibling reached through several shared tracks appears once per track.
    pub fn related_courses(&self, course_code: &str, k: usize) -> Vec<RelatedCourse> {
        let Some(&course) = self.index.get(&GraphNode::Course(course_code.to_string())) else {
            return Vec::new();
        };

        let successors = self.successors_in_order(course);
        let mut related = Vec::new();

        for &succ in &successors {
            if !matches!(self.graph[succ], GraphNode::Track(_)) {
                continue;
            }
            for pred in self.predecessors_in_order(succ) {
                if pred == course {
                    continue;
                }
                if let GraphNode::Course(code) = &self.graph[pred] {
                    related.push(RelatedCourse {
                        course_code: code.clone(),
                        relation: Relation::Track,
                    });
                }
            }
        }

        for &succ in &successors {
            if let GraphNode::Course(code) = &self.graph[succ] {
                related.push(RelatedCourse {
                    course_code: code.clone(),
                    relation: Relation::Prereq,
                });
            }
        }

        related.truncate(k);
        related
    }
}

fn random_walk(
    start: usize,
    walk_length: usize,
    adjacency: &[Vec<usize>],
    rng: &mut StdRng,
) -> Vec<usize> {
    let mut walk = Vec::with_capacity(walk_length.max(1));
    walk.push(start);
    let mut current = start;

    for _ in 1..walk_length {
        match adjacency[current].choose(rng) {
            Some(&next) => {
                walk.push(next);
                current = next;
            }
            None => break,
        }
    }

    walk
}

/// Sequential in-place update; each step sees the previous step's writes
fn update_embeddings(embeddings: &mut Array2<f32>, walk: &[usize]) {
    for (i, &node) in walk.iter().enumerate() {
        let start = i.saturating_sub(WINDOW_SIZE);
        let end = (i + WINDOW_SIZE + 1).min(walk.len());

        for (j, &context) in walk.iter().enumerate().take(end).skip(start) {
            if i == j {
                continue;
            }

            let similarity = embeddings.row(node).dot(&embeddings.row(context));
            let gradient = (similarity - 1.0) * LEARNING_RATE;

            let context_vec = embeddings.row(context).to_owned();
            embeddings
                .row_mut(node)
                .scaled_add(-gradient, &context_vec);

            let node_vec = embeddings.row(node).to_owned();
            embeddings
                .row_mut(context)
                .scaled_add(-gradient, &node_vec);
        }

        let norm = embeddings.row(node).dot(&embeddings.row(node)).sqrt() + NORM_EPSILON;
        embeddings.row_mut(node).mapv_inplace(|v| v / norm);
    }
}
