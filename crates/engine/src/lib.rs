//! Curricula Recommendation Engine
//!
//! Hybrid course recommender for university students. Four signals are
//! learned from the course catalog and grade history:
//!
//! - `graph`: random-walk embeddings over a student/course/track graph
//! - `collaborative`: ALS factors of the pass matrix
//! - `content_based`: track vectors and student track profiles
//! - `hybrid`: a fusion network scoring concatenated embeddings
//!
//! `recommendation` layers curriculum rules over the fused score.

pub mod collaborative;
pub mod content_based;
pub mod features;
pub mod fusion;
pub mod graph;
pub mod hybrid;
pub mod matrix_factorization;
pub mod persistence;
pub mod pipeline;
pub mod recommendation;
pub mod server;
pub mod service;

// Re-export key types
pub use collaborative::CollaborativeFilter;
pub use content_based::ContentModel;
pub use features::FeatureIndex;
pub use fusion::FusionNetwork;
pub use graph::{GraphEdge, GraphNode, KnowledgeGraph, NodeKind, RelatedCourse, Relation};
pub use hybrid::{build_training_pairs, EmbeddingSources, HybridRanker, TrainingPair};
pub use matrix_factorization::{ALSConfig, MatrixFactorization, SparseMatrix};
pub use persistence::{ArtifactStore, Manifest, TrainedModels};
pub use pipeline::{TrainingPipeline, TrainingSummary};
pub use recommendation::{Explanation, Recommendation, Recommender, Tier, OBLIGATORY_COURSES};
pub use service::RecommenderService;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG for a fixed seed, entropy-seeded otherwise
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests;
