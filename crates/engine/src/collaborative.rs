//! Collaborative Filtering Engine
//!
//! Student x course "passed" matrix factorized with ALS. Owns its own
//! student/course indices so a persisted model stays consistent with the
//! factors it was trained with.

use crate::features::FeatureIndex;
use crate::matrix_factorization::{ALSConfig, MatrixFactorization, SparseMatrix};
use anyhow::{Context, Result};
use curricula_core::HistoryRecord;
use ndarray::Array1;
use rand::rngs::StdRng;
use std::collections::HashMap;
use tracing::info;

/// Collaborative Filtering Engine
#[derive(Debug, Clone)]
pub struct CollaborativeFilter {
    students: Vec<String>,
    courses: Vec<String>,
    student_lookup: HashMap<String, usize>,
    course_lookup: HashMap<String, usize>,
    interactions: SparseMatrix,
    model: MatrixFactorization,
}

impl CollaborativeFilter {
    /// Binary matrix: 1 where a student has an attempt at or above the threshold
    ///
    /// Records whose student or course is not indexed are dropped.
    pub fn build_interactions(
        index: &FeatureIndex,
        records: &[HistoryRecord],
        pass_threshold: f32,
    ) -> SparseMatrix {
        let mut matrix = SparseMatrix::new(index.num_students(), index.num_courses());
        for record in records.iter().filter(|r| r.grade >= pass_threshold) {
            if let (Some(u), Some(i)) = (
                index.student_index(&record.student),
                index.course_index(&record.course_code),
            ) {
                matrix.insert(u, i, 1.0);
            }
        }
        matrix
    }

    pub fn train(
        index: &FeatureIndex,
        records: &[HistoryRecord],
        pass_threshold: f32,
        config: ALSConfig,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let interactions = Self::build_interactions(index, records, pass_threshold);

        info!(
            users = interactions.num_users,
            items = interactions.num_items,
            interactions = interactions.nnz(),
            factors = config.latent_factors,
            "Training ALS"
        );

        let mut model =
            MatrixFactorization::new(config, interactions.num_users, interactions.num_items);
        model
            .fit(&interactions, rng)
            .context("ALS training failed")?;

        Ok(Self::from_parts(
            index.students().to_vec(),
            index.courses().to_vec(),
            interactions,
            model,
        ))
    }

    pub(crate) fn from_parts(
        students: Vec<String>,
        courses: Vec<String>,
        interactions: SparseMatrix,
        model: MatrixFactorization,
    ) -> Self {
        let student_lookup = students
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        let course_lookup = courses
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        Self {
            students,
            courses,
            student_lookup,
            course_lookup,
            interactions,
            model,
        }
    }

    pub fn students(&self) -> &[String] {
        &self.students
    }

    pub fn courses(&self) -> &[String] {
        &self.courses
    }

    pub fn interactions(&self) -> &SparseMatrix {
        &self.interactions
    }

    pub fn model(&self) -> &MatrixFactorization {
        &self.model
    }

    pub fn factors(&self) -> usize {
        self.model.latent_factors()
    }

    /// Student factor vector, zeros for unseen students
    pub fn student_embedding(&self, student: &str) -> Array1<f32> {
        match self.student_lookup.get(student) {
            Some(&u) => self.model.user_factors.row(u).to_owned(),
            None => Array1::zeros(self.factors()),
        }
    }

    /// Course factor vector, zeros for unseen courses
    pub fn course_embedding(&self, course_code: &str) -> Array1<f32> {
        match self.course_lookup.get(course_code) {
            Some(&i) => self.model.item_factors.row(i).to_owned(),
            None => Array1::zeros(self.factors()),
        }
    }

    /// 0 when either side is unseen
    pub fn predict_score(&self, student: &str, course_code: &str) -> f32 {
        match (
            self.student_lookup.get(student),
            self.course_lookup.get(course_code),
        ) {
            (Some(&u), Some(&i)) => self.model.predict(u, i),
            _ => 0.0,
        }
    }

    /// Top-K courses the student has not passed, by descending score
    pub fn recommend(&self, student: &str, top_k: usize) -> Vec<(String, f32)> {
        let Some(&u) = self.student_lookup.get(student) else {
            return Vec::new();
        };

        let scores = self.model.score_items(u);
        let mut ranked: Vec<(usize, f32)> = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.interactions.contains(u, *i))
            .map(|(i, &s)| (i, s))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(i, s)| (self.courses[i].clone(), s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_core::{Catalog, Course};
    use rand::SeedableRng;

    fn fixture() -> (Catalog, FeatureIndex) {
        let catalog = Catalog::new(
            vec![
                Course::new("A", "A", &[], &[]),
                Course::new("B", "B", &[], &[]),
                Course::new("C", "C", &[], &[]),
                Course::new("D", "D", &[], &[]),
            ],
            vec![
                HistoryRecord::new("s1", "A", 1, 15.0),
                HistoryRecord::new("s1", "B", 1, 12.0),
                HistoryRecord::new("s1", "C", 2, 9.0),
                HistoryRecord::new("s2", "A", 1, 13.0),
                HistoryRecord::new("s2", "C", 1, 16.0),
                HistoryRecord::new("s3", "Q", 1, 18.0),
            ],
        )
        .unwrap();
        let index = FeatureIndex::build(&catalog);
        (catalog, index)
    }

    fn trained() -> CollaborativeFilter {
        let (catalog, index) = fixture();
        CollaborativeFilter::train(
            &index,
            catalog.records(),
            11.0,
            ALSConfig {
                latent_factors: 4,
                regularization: 0.01,
                iterations: 10,
            },
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap()
    }

    #[test]
    fn test_interactions_use_threshold_and_drop_unknown_courses() {
        let (catalog, index) = fixture();
        let matrix = CollaborativeFilter::build_interactions(&index, catalog.records(), 11.0);

        assert_eq!(matrix.nnz(), 4);
        // s1 failed C, s3 only took an unknown course
        assert!(!matrix.contains(0, 2));
        assert!(matrix.user_items(2).is_empty());
    }

    #[test]
    fn test_recommend_excludes_interacted() {
        let cf = trained();
        let recs = cf.recommend("s1", 10);
        let codes: Vec<&str> = recs.iter().map(|(c, _)| c.as_str()).collect();

        assert_eq!(codes.len(), 2);
        assert!(!codes.contains(&"A"));
        assert!(!codes.contains(&"B"));
        for pair in recs.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_unknown_entities() {
        let cf = trained();
        assert!(cf.recommend("ghost", 5).is_empty());
        assert_eq!(cf.predict_score("ghost", "A"), 0.0);
        assert_eq!(cf.predict_score("s1", "nope"), 0.0);
        assert_eq!(cf.student_embedding("ghost").len(), 4);
    }
}
