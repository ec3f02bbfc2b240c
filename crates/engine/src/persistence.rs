//! Trained artifact persistence
//!
//! Each model is written to its own bincode file under the models directory.
//! Matrices are stored as shape plus flat row-major data and rebuilt with
//! `Array2::from_shape_vec`, so a save/load round trip is bit-identical.
//!
//! Files:
//! - `kg_model.bin`: graph nodes and edges, embedding table, dimension
//! - `cf_model.bin`: indices, interaction entries and shape, factor matrices
//! - `content_model.bin`: track labels and per-course track vectors
//! - `hybrid_model.bin`: fusion weights keyed by layer name
//! - `manifest.json`: training metadata

use crate::collaborative::CollaborativeFilter;
use crate::content_based::ContentModel;
use crate::fusion::{FusionNetwork, HIDDEN_DIMS};
use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph};
use crate::hybrid::HybridRanker;
use crate::matrix_factorization::{MatrixFactorization, SparseMatrix};
use chrono::{DateTime, Utc};
use curricula_core::{CurriculaError, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const KG_MODEL_FILE: &str = "kg_model.bin";
pub const CF_MODEL_FILE: &str = "cf_model.bin";
pub const CONTENT_MODEL_FILE: &str = "content_model.bin";
pub const HYBRID_MODEL_FILE: &str = "hybrid_model.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Row-major matrix as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMatrix {
    shape: (usize, usize),
    data: Vec<f32>,
}

impl StoredMatrix {
    fn from_array(array: &Array2<f32>) -> Self {
        Self {
            shape: array.dim(),
            data: array.iter().copied().collect(),
        }
    }

    fn into_array(self, artifact: &str, name: &str) -> Result<Array2<f32>> {
        Array2::from_shape_vec(self.shape, self.data).map_err(|e| {
            CurriculaError::malformed(artifact, format!("Failed to reconstruct {}: {}", name, e))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<(usize, usize, GraphEdge)>,
    dimensions: usize,
    embeddings: Option<StoredMatrix>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableCollaborative {
    students: Vec<String>,
    courses: Vec<String>,
    shape: (usize, usize),
    entries: Vec<(usize, usize, f32)>,
    factors: usize,
    user_factors: StoredMatrix,
    item_factors: StoredMatrix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableContent {
    track_labels: Vec<String>,
    course_codes: Vec<String>,
    course_vectors: StoredMatrix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableHybrid {
    input_dim: usize,
    hidden_dims: Vec<usize>,
    weights: BTreeMap<String, (Vec<usize>, Vec<f32>)>,
}

/// Training metadata written next to the model files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub trained_at: DateTime<Utc>,
    pub pass_threshold: f32,
    pub kg_dimensions: usize,
    pub cf_factors: usize,
    pub num_tracks: usize,
    pub fusion_input_dim: usize,
    pub num_students: usize,
    pub num_courses: usize,
    pub num_training_pairs: usize,
    pub epoch_losses: Vec<f32>,
}

/// The four trained component models
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub graph: KnowledgeGraph,
    pub collaborative: CollaborativeFilter,
    pub content: ContentModel,
    pub ranker: HybridRanker,
}

impl TrainedModels {
    /// Width the fusion network expects given the component models
    pub fn expected_fusion_input(&self) -> usize {
        2 * (self.graph.dimensions() + self.collaborative.factors() + self.content.dimensions())
    }
}

/// Reads and writes trained artifacts in a models directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.models_dir.join(file)
    }

    /// True when every model file is present
    pub fn exists(&self) -> bool {
        [KG_MODEL_FILE, CF_MODEL_FILE, CONTENT_MODEL_FILE, HYBRID_MODEL_FILE]
            .iter()
            .all(|f| self.path(f).exists())
    }

    fn write_bincode<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.models_dir)?;
        let bytes = bincode::serialize(value)
            .map_err(|e| CurriculaError::malformed(file, format!("Failed to serialize: {}", e)))?;
        fs::write(self.path(file), &bytes)?;
        debug!(file, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    fn read_bincode<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.path(file);
        if !path.exists() {
            return Err(CurriculaError::MissingInput { path });
        }
        let bytes = fs::read(&path)?;
        bincode::deserialize(&bytes)
            .map_err(|e| CurriculaError::malformed(file, format!("Failed to deserialize: {}", e)))
    }

    pub fn save_graph(&self, graph: &KnowledgeGraph) -> Result<()> {
        let serializable = SerializableGraph {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().collect(),
            dimensions: graph.dimensions(),
            embeddings: graph.embeddings().map(StoredMatrix::from_array),
        };
        self.write_bincode(KG_MODEL_FILE, &serializable)
    }

    pub fn load_graph(&self) -> Result<KnowledgeGraph> {
        let stored: SerializableGraph = self.read_bincode(KG_MODEL_FILE)?;
        let embeddings = stored
            .embeddings
            .map(|m| m.into_array(KG_MODEL_FILE, "embeddings"))
            .transpose()?;

        KnowledgeGraph::from_parts(stored.nodes, stored.edges, stored.dimensions, embeddings)
            .map_err(|e| CurriculaError::malformed(KG_MODEL_FILE, e.to_string()))
    }

    pub fn save_collaborative(&self, cf: &CollaborativeFilter) -> Result<()> {
        let matrix = cf.interactions();
        let serializable = SerializableCollaborative {
            students: cf.students().to_vec(),
            courses: cf.courses().to_vec(),
            shape: (matrix.num_users, matrix.num_items),
            entries: matrix.entries.iter().map(|(&(u, i), &v)| (u, i, v)).collect(),
            factors: cf.factors(),
            user_factors: StoredMatrix::from_array(&cf.model().user_factors),
            item_factors: StoredMatrix::from_array(&cf.model().item_factors),
        };
        self.write_bincode(CF_MODEL_FILE, &serializable)
    }

    pub fn load_collaborative(&self) -> Result<CollaborativeFilter> {
        let stored: SerializableCollaborative = self.read_bincode(CF_MODEL_FILE)?;

        let (num_users, num_items) = stored.shape;
        if stored.students.len() != num_users || stored.courses.len() != num_items {
            return Err(CurriculaError::malformed(
                CF_MODEL_FILE,
                format!(
                    "Index sizes {}x{} do not match matrix shape {}x{}",
                    stored.students.len(),
                    stored.courses.len(),
                    num_users,
                    num_items
                ),
            ));
        }

        let mut interactions = SparseMatrix::new(num_users, num_items);
        for (u, i, v) in stored.entries {
            if !interactions.insert(u, i, v) {
                return Err(CurriculaError::malformed(
                    CF_MODEL_FILE,
                    format!("Interaction ({}, {}) outside matrix shape", u, i),
                ));
            }
        }

        let user_factors = stored.user_factors.into_array(CF_MODEL_FILE, "user factors")?;
        let item_factors = stored.item_factors.into_array(CF_MODEL_FILE, "item factors")?;
        if user_factors.nrows() != num_users
            || item_factors.nrows() != num_items
            || user_factors.ncols() != stored.factors
        {
            return Err(CurriculaError::malformed(
                CF_MODEL_FILE,
                "Factor matrices do not match the interaction shape",
            ));
        }

        let model = MatrixFactorization::from_factors(user_factors, item_factors)
            .map_err(|e| CurriculaError::malformed(CF_MODEL_FILE, e.to_string()))?;

        Ok(CollaborativeFilter::from_parts(
            stored.students,
            stored.courses,
            interactions,
            model,
        ))
    }

    pub fn save_content(&self, content: &ContentModel) -> Result<()> {
        let serializable = SerializableContent {
            track_labels: content.track_labels().to_vec(),
            course_codes: content.course_codes().to_vec(),
            course_vectors: StoredMatrix::from_array(content.course_vectors()),
        };
        self.write_bincode(CONTENT_MODEL_FILE, &serializable)
    }

    pub fn load_content(&self) -> Result<ContentModel> {
        let stored: SerializableContent = self.read_bincode(CONTENT_MODEL_FILE)?;
        let vectors = stored
            .course_vectors
            .into_array(CONTENT_MODEL_FILE, "course vectors")?;

        if vectors.dim() != (stored.course_codes.len(), stored.track_labels.len()) {
            return Err(CurriculaError::malformed(
                CONTENT_MODEL_FILE,
                format!(
                    "Course vectors are {:?}, expected ({}, {})",
                    vectors.dim(),
                    stored.course_codes.len(),
                    stored.track_labels.len()
                ),
            ));
        }

        Ok(ContentModel::from_parts(
            stored.track_labels,
            stored.course_codes,
            vectors,
        ))
    }

    pub fn save_ranker(&self, ranker: &HybridRanker) -> Result<()> {
        let serializable = SerializableHybrid {
            input_dim: ranker.network().input_dim(),
            hidden_dims: HIDDEN_DIMS.to_vec(),
            weights: ranker.network().state_dict(),
        };
        self.write_bincode(HYBRID_MODEL_FILE, &serializable)
    }

    pub fn load_ranker(&self) -> Result<HybridRanker> {
        let stored: SerializableHybrid = self.read_bincode(HYBRID_MODEL_FILE)?;
        if stored.hidden_dims != HIDDEN_DIMS {
            return Err(CurriculaError::malformed(
                HYBRID_MODEL_FILE,
                format!("Unsupported hidden layout {:?}", stored.hidden_dims),
            ));
        }

        let network = FusionNetwork::from_state_dict(&stored.weights)
            .map_err(|e| CurriculaError::malformed(HYBRID_MODEL_FILE, format!("{:#}", e)))?;
        if network.input_dim() != stored.input_dim {
            return Err(CurriculaError::malformed(
                HYBRID_MODEL_FILE,
                format!(
                    "Declared input {} but first layer takes {}",
                    stored.input_dim,
                    network.input_dim()
                ),
            ));
        }

        Ok(HybridRanker::new(network))
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(&self.models_dir)?;
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| CurriculaError::malformed(MANIFEST_FILE, e.to_string()))?;
        fs::write(self.path(MANIFEST_FILE), json)?;
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        let path = self.path(MANIFEST_FILE);
        if !path.exists() {
            return Err(CurriculaError::MissingInput { path });
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CurriculaError::malformed(MANIFEST_FILE, e.to_string()))
    }

    pub fn save_all(&self, models: &TrainedModels, manifest: &Manifest) -> Result<()> {
        self.save_graph(&models.graph)?;
        self.save_collaborative(&models.collaborative)?;
        self.save_content(&models.content)?;
        self.save_ranker(&models.ranker)?;
        self.save_manifest(manifest)?;

        info!(dir = %self.models_dir.display(), "Artifacts saved");
        Ok(())
    }

    /// Load every model and check that their widths agree
    pub fn load_all(&self) -> Result<TrainedModels> {
        let models = TrainedModels {
            graph: self.load_graph()?,
            collaborative: self.load_collaborative()?,
            content: self.load_content()?,
            ranker: self.load_ranker()?,
        };

        let expected = models.expected_fusion_input();
        let actual = models.ranker.network().input_dim();
        if expected != actual {
            return Err(CurriculaError::malformed(
                HYBRID_MODEL_FILE,
                format!(
                    "Fusion network takes {} inputs but component models produce {}",
                    actual, expected
                ),
            ));
        }

        info!(dir = %self.models_dir.display(), "Artifacts loaded");
        Ok(models)
    }
}
