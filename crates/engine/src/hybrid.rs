//! Hybrid ranker: fusion network over KG, CF and content embeddings
//!
//! Entity embedding = `[kg ‖ cf ‖ tracks]`; the student side uses the track
//! profile and the course side its track vector.

use crate::collaborative::CollaborativeFilter;
use crate::content_based::ContentModel;
use crate::fusion::{Adam, FusionNetwork, Mode};
use crate::graph::KnowledgeGraph;
use anyhow::{Context, Result};
use curricula_core::config::HybridConfig;
use curricula_core::Catalog;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Labeled (student, course) example
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPair {
    pub student: String,
    pub course: String,
    pub label: f32,
}

/// Positives are passed courses; negatives are sampled without replacement
/// from the catalog courses the student has not passed, one per positive
/// while they last.
pub fn build_training_pairs(
    catalog: &Catalog,
    pass_threshold: f32,
    rng: &mut StdRng,
) -> Vec<TrainingPair> {
    let mut pairs = Vec::new();

    for student in catalog.all_students() {
        let history = catalog.student_history(student, pass_threshold);
        if history.passed_courses.is_empty() {
            continue;
        }

        let passed: BTreeSet<&str> = history.passed_courses.iter().map(String::as_str).collect();
        let not_passed: Vec<&str> = catalog
            .all_course_codes()
            .filter(|code| !passed.contains(code))
            .collect();

        for course in &history.passed_courses {
            pairs.push(TrainingPair {
                student: student.clone(),
                course: course.clone(),
                label: 1.0,
            });
        }

        let sample_size = passed.len().min(not_passed.len());
        for &course in not_passed.choose_multiple(rng, sample_size) {
            pairs.push(TrainingPair {
                student: student.clone(),
                course: course.to_string(),
                label: 0.0,
            });
        }
    }

    info!(pairs = pairs.len(), "Training pairs generated");
    pairs
}

/// Read-only view over the trained component models
#[derive(Clone, Copy)]
pub struct EmbeddingSources<'a> {
    pub catalog: &'a Catalog,
    pub graph: &'a KnowledgeGraph,
    pub collaborative: &'a CollaborativeFilter,
    pub content: &'a ContentModel,
}

impl<'a> EmbeddingSources<'a> {
    /// Width of one entity embedding
    pub fn entity_dim(&self) -> usize {
        self.graph.dimensions() + self.collaborative.factors() + self.content.dimensions()
    }

    pub fn student_embedding(&self, student: &str) -> Array1<f32> {
        let profile = self.content.student_profile_for(self.catalog, student);
        concat(&[
            self.graph.student_embedding(student),
            self.collaborative.student_embedding(student),
            profile,
        ])
    }

    pub fn course_embedding(&self, course_code: &str) -> Array1<f32> {
        concat(&[
            self.graph.course_embedding(course_code),
            self.collaborative.course_embedding(course_code),
            self.content.course_vector(course_code),
        ])
    }
}

fn concat(parts: &[Array1<f32>]) -> Array1<f32> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Stack `[student ‖ course]` rows
fn pair_matrix<'r>(
    rows: impl ExactSizeIterator<Item = (&'r Array1<f32>, &'r Array1<f32>)>,
    width: usize,
) -> Result<Array2<f32>> {
    let n = rows.len();
    let mut data = Vec::with_capacity(n * width);
    for (student, course) in rows {
        data.extend(student.iter().copied());
        data.extend(course.iter().copied());
    }
    Array2::from_shape_vec((n, width), data)
        .with_context(|| format!("Pair embeddings do not match network width {}", width))
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridRanker {
    network: FusionNetwork,
}

impl HybridRanker {
    pub fn new(network: FusionNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &FusionNetwork {
        &self.network
    }

    /// Train a fresh network; returns the ranker and the mean loss per epoch
    pub fn train(
        sources: EmbeddingSources<'_>,
        pairs: &[TrainingPair],
        config: &HybridConfig,
        rng: &mut StdRng,
    ) -> Result<(Self, Vec<f32>)> {
        let entity_dim = sources.entity_dim();
        let width = entity_dim * 2;
        let mut network = FusionNetwork::new(width, rng);
        let mut optimizer = Adam::new(config.learning_rate);

        if pairs.is_empty() {
            warn!("No training pairs; fusion network left untrained");
            return Ok((Self { network }, Vec::new()));
        }

        let students: BTreeSet<&str> = pairs.iter().map(|p| p.student.as_str()).collect();
        let courses: BTreeSet<&str> = pairs.iter().map(|p| p.course.as_str()).collect();
        info!(
            students = students.len(),
            courses = courses.len(),
            "Precomputing embeddings"
        );

        let student_cache: BTreeMap<&str, Array1<f32>> = students
            .into_iter()
            .map(|s| (s, sources.student_embedding(s)))
            .collect();
        let course_cache: BTreeMap<&str, Array1<f32>> = courses
            .into_iter()
            .map(|c| (c, sources.course_embedding(c)))
            .collect();

        let batch_size = config.batch_size.max(2);
        let mut indices: Vec<usize> = (0..pairs.len()).collect();
        let mut epoch_losses = Vec::with_capacity(config.epochs);

        for epoch in 0..config.epochs {
            indices.shuffle(rng);
            let mut total_loss = 0.0;
            let mut batches = 0usize;

            for chunk in indices.chunks(batch_size) {
                if chunk.len() < 2 {
                    debug!("Skipping trailing batch of size {}", chunk.len());
                    continue;
                }

                let inputs = pair_matrix(
                    chunk.iter().map(|&i| {
                        let pair = &pairs[i];
                        (
                            &student_cache[pair.student.as_str()],
                            &course_cache[pair.course.as_str()],
                        )
                    }),
                    width,
                )?;
                let labels: Array1<f32> = chunk.iter().map(|&i| pairs[i].label).collect();

                total_loss += network.train_batch(&inputs, &labels, &mut optimizer, rng)?;
                batches += 1;
            }

            let avg_loss = if batches > 0 { total_loss / batches as f32 } else { 0.0 };
            info!("Fusion epoch {}/{}: loss = {:.4}", epoch + 1, config.epochs, avg_loss);
            epoch_losses.push(avg_loss);
        }

        Ok((Self { network }, epoch_losses))
    }

    /// Evaluation-mode logit for one pair
    pub fn predict_score(
        &self,
        sources: EmbeddingSources<'_>,
        student: &str,
        course_code: &str,
    ) -> Result<f32> {
        let scores = self.score_courses(sources, student, &[course_code])?;
        Ok(scores.first().copied().unwrap_or_default())
    }

    /// Evaluation-mode logits for one student against many courses
    ///
    /// Rows are scored independently, so this equals calling
    /// [`HybridRanker::predict_score`] per course.
    pub fn score_courses(
        &self,
        sources: EmbeddingSources<'_>,
        student: &str,
        courses: &[&str],
    ) -> Result<Vec<f32>> {
        if courses.is_empty() {
            return Ok(Vec::new());
        }

        let student_emb = sources.student_embedding(student);
        let course_embs: Vec<Array1<f32>> =
            courses.iter().map(|c| sources.course_embedding(c)).collect();

        let inputs = pair_matrix(
            course_embs.iter().map(|c| (&student_emb, c)),
            self.network.input_dim(),
        )?;
        Ok(self.network.forward(&inputs, Mode::Eval).to_vec())
    }
}
