//! Orchestrator rule tests

use super::{fixture_catalog, fixture_models};
use crate::recommendation::{Recommender, Tier};

fn recommender() -> Recommender {
    let catalog = fixture_catalog();
    let models = fixture_models(&catalog);
    Recommender::from_models(catalog, models).with_obligatory(["A", "B", "X"])
}

#[test]
fn test_sorted_by_priority_then_score() {
    let recommender = recommender();
    for student in ["s1", "s2", "s3", "ghost"] {
        let recs = recommender.recommend(student, 100).unwrap();
        for pair in recs.windows(2) {
            assert!(pair[0].priority <= pair[1].priority, "{}", student);
            if pair[0].priority == pair[1].priority {
                assert!(pair[0].score >= pair[1].score, "{}", student);
            }
        }
    }
}

#[test]
fn test_failed_obligatory_gets_top_priority_and_boost() {
    let recommender = recommender();
    let recs = recommender.recommend("s1", 100).unwrap();

    let x = recs.iter().find(|r| r.course_code == "X").unwrap();
    assert!(x.is_failed);
    assert!(x.is_obligatory);
    assert_eq!(x.priority, 1);
    assert_eq!(recs[0].course_code, "X");

    // X has no tracks, so the score is the fused logit plus the tier boost
    let fusion = recommender
        .ranker()
        .predict_score(recommender.sources(), "s1", "X")
        .unwrap();
    assert!((x.score - (fusion + 2.0)).abs() < 1e-4);
}

#[test]
fn test_retaken_course_counts_as_passed() {
    let recommender = recommender();
    let recs = recommender.recommend("s1", 100).unwrap();

    // C failed in cycle 1 but passed in cycle 2
    assert!(recs.iter().all(|r| r.course_code != "C"));
    assert!(recs.iter().all(|r| r.course_code != "A"));
}

#[test]
fn test_student_without_history() {
    let recommender = recommender();
    let recs = recommender.recommend("ghost", 100).unwrap();
    assert!(!recs.is_empty());

    for rec in &recs {
        assert_eq!(rec.reasons.collaborative_score, 0.0);
        assert!(rec.reasons.prerequisites_met);
        assert!(!rec.is_failed);
    }

    // B and everything downstream of it is locked behind A
    let codes: Vec<&str> = recs.iter().map(|r| r.course_code.as_str()).collect();
    assert_eq!(codes[..2].iter().filter(|c| ["A", "X"].contains(c)).count(), 2);
    assert!(recs[..2].iter().all(|r| r.priority == 2));
    assert!(!codes.contains(&"B"));
    assert!(!codes.contains(&"E"));
    assert!(codes.contains(&"C"));
}

#[test]
fn test_prerequisites_met_without_prerequisites() {
    let recommender = recommender();
    assert!(recommender.prerequisites_met("ghost", "A"));
    assert!(recommender.prerequisites_met("ghost", "X"));
    assert!(!recommender.prerequisites_met("ghost", "B"));
    // A prerequisite outside the catalog can never be passed
    assert!(!recommender.prerequisites_met("s2", "F"));
}

#[test]
fn test_track_performance_weight_bounds() {
    let recommender = recommender();

    // s2 passed C (16) and D (13), both math only
    assert_eq!(recommender.track_performance_weight("s2", "E"), 0.0);
    let weight = recommender.track_performance_weight("s2", "F");
    assert!((weight - 0.45).abs() < 1e-6);

    for student in ["s1", "s2", "s3", "ghost"] {
        for code in ["A", "B", "C", "D", "E", "F", "X", "MISSING"] {
            let w = recommender.track_performance_weight(student, code);
            assert!((0.0..=1.0).contains(&w));
        }
    }
}

#[test]
fn test_candidate_tiers() {
    let recommender = recommender();
    let history = recommender.catalog().student_history("s2", 10.0);
    let candidates = recommender.candidates(&history);

    // A taken with 9, B and X never taken
    assert_eq!(candidates[0], ("A".to_string(), Tier::FailedObligatory));
    assert_eq!(candidates[1], ("B".to_string(), Tier::MissingObligatory));
    assert_eq!(candidates[2], ("X".to_string(), Tier::MissingObligatory));
    let others: Vec<&str> = candidates[3..].iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(others, vec!["E", "F"]);
}

#[test]
fn test_obligatory_code_outside_catalog_still_recommended() {
    let catalog = fixture_catalog();
    let models = fixture_models(&catalog);
    let recommender = Recommender::from_models(catalog, models).with_obligatory(["Q1"]);

    let recs = recommender.recommend("s1", 100).unwrap();
    let q = recs.iter().find(|r| r.course_code == "Q1").unwrap();
    assert_eq!(q.priority, 2);
    assert!(q.course_name.is_empty());
    assert!(q.tracks.is_empty());
}

#[test]
fn test_top_k_truncates() {
    let recommender = recommender();
    assert_eq!(recommender.recommend("ghost", 1).unwrap().len(), 1);
    assert!(recommender.recommend("ghost", 0).unwrap().is_empty());
}

#[test]
fn test_explain_lists_declared_prerequisites() {
    let recommender = recommender();
    let explanation = recommender.explain("s2", "F");
    assert_eq!(explanation.prerequisites, vec!["C", "ZZ9"]);
    assert!(!explanation.prerequisites_met);
    assert!(explanation.related_courses.len() <= 3);
}
