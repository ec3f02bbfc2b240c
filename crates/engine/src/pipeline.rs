//! End-to-end training: catalog in, artifacts out

use crate::collaborative::CollaborativeFilter;
use crate::content_based::ContentModel;
use crate::features::FeatureIndex;
use crate::graph::KnowledgeGraph;
use crate::hybrid::{build_training_pairs, EmbeddingSources, HybridRanker};
use crate::matrix_factorization::ALSConfig;
use crate::persistence::{ArtifactStore, Manifest, TrainedModels};
use crate::seeded_rng;
use anyhow::{Context, Result};
use chrono::Utc;
use curricula_core::{Catalog, CsvCatalogLoader, CurriculaConfig, ValidationReport};
use rand::rngs::StdRng;
use std::time::Instant;
use tracing::{info, warn};

const TOTAL_STEPS: usize = 7;

/// Result of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub manifest: Manifest,
    pub validation: ValidationReport,
    pub elapsed_secs: f64,
}

pub struct TrainingPipeline {
    config: CurriculaConfig,
}

impl TrainingPipeline {
    pub fn new(config: CurriculaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CurriculaConfig {
        &self.config
    }

    /// Load the CSV catalog, train every model and save the artifacts
    pub fn run(&self) -> Result<TrainingSummary> {
        let started = Instant::now();
        let mut rng = seeded_rng(self.config.training.seed);

        step(1, "Loading catalog");
        let loader = CsvCatalogLoader::new(&self.config.data.data_dir);
        let catalog = Catalog::from_provider(&loader).with_context(|| {
            format!(
                "Failed to load catalog from {}",
                self.config.data.data_dir.display()
            )
        })?;

        let validation = ValidationReport::build(&catalog);
        for warning in &validation.warnings {
            warn!("{}", warning);
        }

        let (models, manifest) = self.train(&catalog, &mut rng)?;

        step(7, "Saving artifacts");
        ArtifactStore::new(&self.config.models.models_dir)
            .save_all(&models, &manifest)
            .context("Failed to save trained artifacts")?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(elapsed_secs, "Training complete");

        Ok(TrainingSummary {
            manifest,
            validation,
            elapsed_secs,
        })
    }

    /// Steps 2 through 6 over an in-memory catalog
    pub fn train(&self, catalog: &Catalog, rng: &mut StdRng) -> Result<(TrainedModels, Manifest)> {
        let threshold = self.config.training.pass_threshold;

        step(2, "Building feature index");
        let index = FeatureIndex::build(catalog);
        info!(
            students = index.num_students(),
            courses = index.num_courses(),
            tracks = index.num_tracks(),
            "Feature index built"
        );

        step(3, "Building knowledge graph");
        let mut graph = KnowledgeGraph::build(catalog.courses(), catalog.records(), threshold);
        let kg = &self.config.kg;
        graph
            .train_embeddings(kg.embedding_dim, kg.walk_length, kg.num_walks, rng)
            .context("Failed to train graph embeddings")?;

        step(4, "Training collaborative filter");
        let als = ALSConfig {
            latent_factors: self.config.cf.factors,
            regularization: self.config.cf.regularization,
            iterations: self.config.cf.iterations,
        };
        let collaborative =
            CollaborativeFilter::train(&index, catalog.records(), threshold, als, rng)?;

        step(5, "Encoding course tracks");
        let content = ContentModel::build(&index);

        step(6, "Training fusion network");
        let pairs = build_training_pairs(catalog, threshold, rng);
        let sources = EmbeddingSources {
            catalog,
            graph: &graph,
            collaborative: &collaborative,
            content: &content,
        };
        let (ranker, epoch_losses) = HybridRanker::train(sources, &pairs, &self.config.hybrid, rng)
            .context("Failed to train fusion network")?;

        let manifest = Manifest {
            trained_at: Utc::now(),
            pass_threshold: threshold,
            kg_dimensions: graph.dimensions(),
            cf_factors: collaborative.factors(),
            num_tracks: content.dimensions(),
            fusion_input_dim: ranker.network().input_dim(),
            num_students: index.num_students(),
            num_courses: index.num_courses(),
            num_training_pairs: pairs.len(),
            epoch_losses,
        };

        let models = TrainedModels {
            graph,
            collaborative,
            content,
            ranker,
        };

        Ok((models, manifest))
    }
}

fn step(n: usize, message: &str) {
    info!("[{}/{}] {}", n, TOTAL_STEPS, message);
}
