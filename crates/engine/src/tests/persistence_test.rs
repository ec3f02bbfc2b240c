//! Artifact save/load tests

use super::{fixture_catalog, fixture_models};
use crate::persistence::{ArtifactStore, Manifest, CF_MODEL_FILE, HYBRID_MODEL_FILE};
use crate::recommendation::Recommender;
use chrono::Utc;
use curricula_core::CurriculaError;
use tempfile::TempDir;

fn manifest() -> Manifest {
    Manifest {
        trained_at: Utc::now(),
        pass_threshold: 11.0,
        kg_dimensions: 8,
        cf_factors: 4,
        num_tracks: 3,
        fusion_input_dim: 30,
        num_students: 3,
        num_courses: 7,
        num_training_pairs: 14,
        epoch_losses: vec![0.7, 0.6],
    }
}

#[test]
fn test_round_trip_is_bit_identical() {
    let catalog = fixture_catalog();
    let models = fixture_models(&catalog);
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    store.save_all(&models, &manifest()).unwrap();
    assert!(store.exists());
    let loaded = store.load_all().unwrap();

    assert_eq!(
        models.graph.nodes().collect::<Vec<_>>(),
        loaded.graph.nodes().collect::<Vec<_>>()
    );
    assert_eq!(
        models.graph.edges().collect::<Vec<_>>(),
        loaded.graph.edges().collect::<Vec<_>>()
    );
    assert_eq!(models.graph.embeddings(), loaded.graph.embeddings());
    assert_eq!(models.graph.dimensions(), loaded.graph.dimensions());

    assert_eq!(models.collaborative.interactions(), loaded.collaborative.interactions());
    assert_eq!(models.collaborative.factors(), loaded.collaborative.factors());
    for student in catalog.all_students() {
        for code in catalog.all_course_codes() {
            let before = models.collaborative.predict_score(student, code);
            let after = loaded.collaborative.predict_score(student, code);
            assert_eq!(before.to_bits(), after.to_bits());
        }
    }

    assert_eq!(models.content.track_labels(), loaded.content.track_labels());
    assert_eq!(models.content.course_vectors(), loaded.content.course_vectors());
    assert_eq!(models.ranker, loaded.ranker);

    let original = Recommender::from_models(catalog.clone(), models);
    let restored = Recommender::from_models(catalog, loaded);
    for student in ["s1", "s2", "s3"] {
        assert_eq!(
            original.recommend(student, 10).unwrap(),
            restored.recommend(student, 10).unwrap()
        );
    }
}

#[test]
fn test_manifest_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    let manifest = manifest();

    store.save_manifest(&manifest).unwrap();
    assert_eq!(store.load_manifest().unwrap(), manifest);
}

#[test]
fn test_missing_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path().join("nothing-here"));

    assert!(!store.exists());
    let err = store.load_all().unwrap_err();
    assert!(err.is_missing_input());
}

#[test]
fn test_corrupt_artifact_is_malformed() {
    let catalog = fixture_catalog();
    let models = fixture_models(&catalog);
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save_all(&models, &manifest()).unwrap();

    std::fs::write(dir.path().join(CF_MODEL_FILE), b"not bincode").unwrap();

    match store.load_collaborative() {
        Err(CurriculaError::MalformedArtifact { artifact, .. }) => {
            assert_eq!(artifact, CF_MODEL_FILE)
        }
        other => panic!("expected malformed artifact, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_mismatched_fusion_width_is_rejected() {
    let catalog = fixture_catalog();
    let mut models = fixture_models(&catalog);
    let dir = TempDir::new().unwrap();

    // Swap in a graph trained at a different width
    models
        .graph
        .train_embeddings(5, 3, 1, &mut crate::seeded_rng(Some(1)))
        .unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save_all(&models, &manifest()).unwrap();

    match store.load_all() {
        Err(CurriculaError::MalformedArtifact { artifact, .. }) => {
            assert_eq!(artifact, HYBRID_MODEL_FILE)
        }
        other => panic!("expected malformed artifact, got {:?}", other.map(|_| ())),
    }
}
