//! Content-based filtering implementation
//!
//! Courses are multi-hot vectors over the sorted track labels. A student's
//! profile is the L2-normalized mean of the vectors of their passed courses.

use crate::features::FeatureIndex;
use curricula_core::{Catalog, StudentHistory, DEFAULT_PASS_THRESHOLD};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

const NORM_EPSILON: f32 = 1e-10;

/// Content-based recommendation engine
#[derive(Debug, Clone)]
pub struct ContentModel {
    track_labels: Vec<String>,
    course_codes: Vec<String>,
    /// One row per course in `course_codes` order
    course_vectors: Array2<f32>,
    course_lookup: HashMap<String, usize>,
}

impl ContentModel {
    /// Cache the course track vectors of the feature index
    pub fn build(index: &FeatureIndex) -> Self {
        Self::from_parts(
            index.track_labels().to_vec(),
            index.courses().to_vec(),
            index.course_track_matrix().clone(),
        )
    }

    pub(crate) fn from_parts(
        track_labels: Vec<String>,
        course_codes: Vec<String>,
        course_vectors: Array2<f32>,
    ) -> Self {
        let course_lookup = course_codes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            track_labels,
            course_codes,
            course_vectors,
            course_lookup,
        }
    }

    pub fn track_labels(&self) -> &[String] {
        &self.track_labels
    }

    pub fn course_codes(&self) -> &[String] {
        &self.course_codes
    }

    pub fn course_vectors(&self) -> &Array2<f32> {
        &self.course_vectors
    }

    pub fn dimensions(&self) -> usize {
        self.track_labels.len()
    }

    /// Track vector of a course; zeros for unknown codes
    pub fn course_vector(&self, course_code: &str) -> Array1<f32> {
        match self.course_lookup.get(course_code) {
            Some(&idx) => self.course_vectors.row(idx).to_owned(),
            None => Array1::zeros(self.dimensions()),
        }
    }

    /// Normalized mean track vector over passed courses
    ///
    /// Passed courses outside the catalog contribute a zero vector to the mean.
    pub fn student_profile(&self, history: &StudentHistory) -> Array1<f32> {
        let mut profile = Array1::<f32>::zeros(self.dimensions());
        if history.passed_courses.is_empty() {
            return profile;
        }

        for code in &history.passed_courses {
            if let Some(&idx) = self.course_lookup.get(code.as_str()) {
                profile += &self.course_vectors.row(idx);
            }
        }
        profile /= history.passed_courses.len() as f32;

        let norm = profile.dot(&profile).sqrt() + NORM_EPSILON;
        profile / norm
    }

    /// Profile of a student at the default 10.0 pass threshold
    pub fn student_profile_for(&self, catalog: &Catalog, student: &str) -> Array1<f32> {
        self.student_profile(&catalog.student_history(student, DEFAULT_PASS_THRESHOLD))
    }

    /// Cosine similarity between a profile and a course vector
    ///
    /// 0.0 for unknown courses or when either vector is near zero.
    pub fn similarity(&self, profile: &Array1<f32>, course_code: &str) -> f32 {
        let Some(&idx) = self.course_lookup.get(course_code) else {
            return 0.0;
        };
        let course = self.course_vectors.row(idx);

        let profile_norm = profile.dot(profile).sqrt();
        let course_norm = course.dot(&course).sqrt();
        if profile_norm < NORM_EPSILON || course_norm < NORM_EPSILON {
            return 0.0;
        }

        profile.dot(&course) / (profile_norm * course_norm)
    }

    /// Rank candidate courses by similarity to the profile
    pub fn recommend(
        &self,
        profile: &Array1<f32>,
        candidates: &[String],
        top_k: usize,
    ) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = candidates
            .iter()
            .map(|c| (c.clone(), self.similarity(profile, c)))
            .collect();

        // stable: equal scores keep candidate order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_core::{Course, HistoryRecord};

    fn fixture() -> (Catalog, ContentModel) {
        let catalog = Catalog::new(
            vec![
                Course::new("A", "A", &[], &["math"]),
                Course::new("B", "B", &[], &["math", "ee"]),
                Course::new("C", "C", &[], &["ee"]),
                Course::new("N", "N", &[], &[]),
            ],
            vec![
                HistoryRecord::new("s1", "A", 1, 14.0),
                HistoryRecord::new("s1", "C", 1, 6.0),
                HistoryRecord::new("s2", "C", 1, 5.0),
            ],
        )
        .unwrap();
        let model = ContentModel::build(&FeatureIndex::build(&catalog));
        (catalog, model)
    }

    #[test]
    fn test_profile_is_unit_mean_of_passed() {
        let (catalog, model) = fixture();
        let profile = model.student_profile_for(&catalog, "s1");

        // labels sorted: ["ee", "math"]
        assert!((profile[0] - 0.0).abs() < 1e-6);
        assert!((profile[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_profile_zero_without_passed_courses() {
        let (catalog, model) = fixture();
        let profile = model.student_profile_for(&catalog, "s2");
        assert!(profile.iter().all(|&v| v == 0.0));
        assert_eq!(model.similarity(&profile, "A"), 0.0);
    }

    #[test]
    fn test_similarity_cosine() {
        let (catalog, model) = fixture();
        let profile = model.student_profile_for(&catalog, "s1");

        assert!((model.similarity(&profile, "A") - 1.0).abs() < 1e-5);
        assert!((model.similarity(&profile, "B") - 1.0 / 2f32.sqrt()).abs() < 1e-5);
        assert_eq!(model.similarity(&profile, "C"), 0.0);
        // course without tracks and unknown course
        assert_eq!(model.similarity(&profile, "N"), 0.0);
        assert_eq!(model.similarity(&profile, "zzz"), 0.0);
    }

    #[test]
    fn test_recommend_orders_by_similarity() {
        let (catalog, model) = fixture();
        let profile = model.student_profile_for(&catalog, "s1");
        let candidates = vec!["C".to_string(), "B".to_string(), "A".to_string()];

        let recs = model.recommend(&profile, &candidates, 2);
        assert_eq!(recs[0].0, "A");
        assert_eq!(recs[1].0, "B");
    }
}
