//! Shared fixtures for engine tests

mod persistence_test;
mod recommendation_test;

use crate::persistence::TrainedModels;
use crate::pipeline::TrainingPipeline;
use crate::seeded_rng;
use crate::service::RecommenderService;
use curricula_core::{Catalog, Course, CurriculaConfig, HistoryRecord};

pub(crate) const FIXTURE_SEED: u64 = 7;

/// Seven courses over three tracks; F declares a prerequisite outside the catalog
pub(crate) fn fixture_catalog() -> Catalog {
    Catalog::new(
        vec![
            Course::new("A", "Programming I", &[], &["software"]),
            Course::new("B", "Programming II", &["A"], &["software"]),
            Course::new("C", "Calculus", &[], &["math"]),
            Course::new("D", "Linear Algebra", &["C"], &["math"]),
            Course::new("E", "Databases", &["B"], &["software", "data"]),
            Course::new("F", "Statistics", &["C", "ZZ9"], &["math", "data"]),
            Course::new("X", "Ethics", &[], &[]),
        ],
        vec![
            HistoryRecord::new("s1", "A", 1, 15.0),
            HistoryRecord::new("s1", "C", 1, 8.0),
            HistoryRecord::new("s1", "X", 1, 8.0),
            HistoryRecord::new("s1", "C", 2, 12.0),
            HistoryRecord::new("s1", "B", 2, 14.0),
            HistoryRecord::new("s2", "A", 1, 9.0),
            HistoryRecord::new("s2", "C", 1, 16.0),
            HistoryRecord::new("s2", "D", 2, 13.0),
            HistoryRecord::new("s3", "C", 1, 11.0),
            HistoryRecord::new("s3", "A", 1, 12.0),
            HistoryRecord::new("s3", "E", 2, 5.0),
        ],
    )
    .expect("fixture catalog")
}

pub(crate) fn fixture_config() -> CurriculaConfig {
    let mut config = CurriculaConfig::default();
    config.training.seed = Some(FIXTURE_SEED);
    config.kg.embedding_dim = 8;
    config.kg.walk_length = 6;
    config.kg.num_walks = 4;
    config.cf.factors = 4;
    config.cf.iterations = 3;
    config.hybrid.epochs = 2;
    config.hybrid.batch_size = 4;
    config.hybrid.learning_rate = 0.01;
    config
}

pub(crate) fn fixture_models(catalog: &Catalog) -> TrainedModels {
    let config = fixture_config();
    let mut rng = seeded_rng(config.training.seed);
    let (models, _) = TrainingPipeline::new(config)
        .train(catalog, &mut rng)
        .expect("fixture training");
    models
}

pub(crate) fn fixture_service() -> RecommenderService {
    let catalog = fixture_catalog();
    let models = fixture_models(&catalog);
    RecommenderService::new(catalog, models, None)
}
