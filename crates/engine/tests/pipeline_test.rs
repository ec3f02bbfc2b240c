//! End-to-end: CSV files in, trained artifacts out, recommendations served

use curricula_core::CurriculaConfig;
use curricula_engine::{ArtifactStore, RecommenderService, TrainingPipeline};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const COURSES_CSV: &str = "\
course_code,course_name,prereq_codes,lineas_carrera
BMA01,Calculus I,,math
BMA02,Calculus II,BMA01,math
BIC01,Programming I,,software
BIC02,Programming II,BIC01,software;data
BIC03,Databases,BIC02;BXX99,data
BEG01,Ethics,,
";

const HISTORY_CSV: &str = "\
alumno,course_code,cycle,grade
a001,BMA01,1,15
a001,BIC01,1,9
a001,BIC01,2,13
a001,BMA02,2,12
a002,BMA01,1,8
a002,BIC01,1,17
a002,BIC02,2,16
a003,BMA01,1,12
a003,BIC01,1,14
a003,ZZZ00,1,18
";

fn write_data(dir: &Path) {
    fs::write(dir.join("courses.csv"), COURSES_CSV).unwrap();
    fs::write(dir.join("courses_taken.csv"), HISTORY_CSV).unwrap();
}

fn config(root: &TempDir) -> CurriculaConfig {
    let mut config = CurriculaConfig::default();
    config.data.data_dir = root.path().join("data");
    config.models.models_dir = root.path().join("models");
    config.training.seed = Some(42);
    config.kg.embedding_dim = 8;
    config.kg.walk_length = 5;
    config.kg.num_walks = 3;
    config.cf.factors = 4;
    config.cf.iterations = 3;
    config.hybrid.epochs = 2;
    config.hybrid.batch_size = 4;
    config
}

#[test]
fn test_train_then_serve() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("data")).unwrap();
    write_data(&root.path().join("data"));
    let config = config(&root);

    let summary = TrainingPipeline::new(config.clone()).run().unwrap();
    assert_eq!(summary.manifest.num_courses, 6);
    assert_eq!(summary.manifest.num_students, 3);
    assert_eq!(summary.manifest.fusion_input_dim, 2 * (8 + 4 + 3));
    assert_eq!(summary.manifest.epoch_losses.len(), 2);
    assert_eq!(summary.validation.unknown_courses, vec!["ZZZ00"]);
    assert!(summary
        .validation
        .missing_prerequisite_codes()
        .contains("BXX99"));

    assert!(ArtifactStore::new(&config.models.models_dir).exists());

    let service = RecommenderService::load(&config).unwrap();
    assert!(service.manifest().is_some());

    let recs = service.recommend("a002", 5).unwrap();
    assert!(!recs.is_empty());
    assert!(recs.len() <= 5);
    // Passed courses are never recommended again
    for rec in &recs {
        assert!(!["BIC01", "BIC02"].contains(&rec.course_code.as_str()));
    }
}

#[test]
fn test_seeded_training_is_reproducible() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    for root in [&first, &second] {
        fs::create_dir_all(root.path().join("data")).unwrap();
        write_data(&root.path().join("data"));
        TrainingPipeline::new(config(root)).run().unwrap();
    }

    let a = RecommenderService::load(&config(&first)).unwrap();
    let b = RecommenderService::load(&config(&second)).unwrap();
    for student in ["a001", "a002", "a003"] {
        assert_eq!(a.recommend(student, 10).unwrap(), b.recommend(student, 10).unwrap());
    }
}

#[test]
fn test_service_load_without_artifacts_fails() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("data")).unwrap();
    write_data(&root.path().join("data"));

    let err = RecommenderService::load(&config(&root)).err().unwrap();
    let cause = err.downcast_ref::<curricula_core::CurriculaError>().unwrap();
    assert!(cause.is_missing_input());
}

#[test]
fn test_missing_data_dir_fails_training() {
    let root = TempDir::new().unwrap();
    let err = TrainingPipeline::new(config(&root)).run().unwrap_err();
    assert!(format!("{:#}", err).contains("Missing input"));
}
