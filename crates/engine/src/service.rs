//! Read-only query layer over a loaded catalog and trained models
//!
//! Shared by the HTTP service and the CLI. Every method takes `&self`, so a
//! single instance can sit behind an `Arc` across workers.

use crate::graph::RelatedCourse;
use crate::persistence::{ArtifactStore, Manifest, TrainedModels};
use crate::recommendation::{Explanation, Recommendation, Recommender};
use anyhow::{Context, Result};
use curricula_core::analytics::{
    course_statistics, curriculum_progress, prerequisite_chains, student_performance,
    CourseStatistics, CurriculumProgress, StudentPerformance,
};
use curricula_core::{
    Catalog, Course, CsvCatalogLoader, CurriculaConfig, StudentHistory, ValidationReport,
    DEFAULT_PASS_THRESHOLD,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

const RELATED_COURSE_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    pub student_id: String,
    pub total_courses: usize,
    pub passed_courses: usize,
    pub courses: Vec<String>,
    pub performance: StudentPerformance,
    pub curriculum_progress: CurriculumProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub statistics: CourseStatistics,
    pub related_courses: Vec<RelatedCourse>,
    pub prerequisite_chains: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub total_students: usize,
    pub total_courses: usize,
    pub total_records: usize,
    pub total_tracks: usize,
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub kg_nodes: usize,
    pub kg_edges: usize,
    pub embedding_dim: usize,
    pub cf_factors: usize,
    pub cf_interactions: usize,
    pub fusion_input_dim: usize,
    pub trained_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub system: CatalogSummary,
    pub models: ModelSummary,
    pub data_quality: ValidationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub tracks: Vec<String>,
    pub total: usize,
    pub courses_per_track: BTreeMap<String, usize>,
}

pub struct RecommenderService {
    recommender: Recommender,
    validation: ValidationReport,
    manifest: Option<Manifest>,
}

impl RecommenderService {
    /// Load the catalog and every trained artifact named by the config
    pub fn load(config: &CurriculaConfig) -> Result<Self> {
        let loader = CsvCatalogLoader::new(&config.data.data_dir);
        let catalog = Catalog::from_provider(&loader).with_context(|| {
            format!("Failed to load catalog from {}", config.data.data_dir.display())
        })?;

        let store = ArtifactStore::new(&config.models.models_dir);
        let models = store.load_all().with_context(|| {
            format!(
                "Failed to load models from {}",
                config.models.models_dir.display()
            )
        })?;

        let manifest = match store.load_manifest() {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(error = %e, "Training manifest unavailable");
                None
            }
        };

        info!(
            students = catalog.all_students().len(),
            courses = catalog.courses().len(),
            "Recommender service ready"
        );

        Ok(Self::new(catalog, models, manifest))
    }

    pub fn new(catalog: Catalog, models: TrainedModels, manifest: Option<Manifest>) -> Self {
        let validation = ValidationReport::build(&catalog);
        Self {
            recommender: Recommender::from_models(catalog, models),
            validation,
            manifest,
        }
    }

    pub fn recommender(&self) -> &Recommender {
        &self.recommender
    }

    pub fn catalog(&self) -> &Catalog {
        self.recommender.catalog()
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn has_student(&self, student: &str) -> bool {
        self.catalog().has_student(student)
    }

    pub fn recommend(&self, student: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        self.recommender.recommend(student, top_k)
    }

    pub fn explain(&self, student: &str, course_code: &str) -> Explanation {
        self.recommender.explain(student, course_code)
    }

    pub fn student_history(&self, student: &str) -> StudentHistory {
        self.catalog().student_history(student, DEFAULT_PASS_THRESHOLD)
    }

    pub fn student_detail(&self, student: &str) -> Option<StudentDetail> {
        if !self.has_student(student) {
            return None;
        }
        let history = self.student_history(student);
        let obligatory = self.recommender.obligatory().iter().map(String::as_str);

        Some(StudentDetail {
            student_id: student.to_string(),
            total_courses: history.all_courses.len(),
            passed_courses: history.passed_courses.len(),
            performance: student_performance(self.catalog(), student, DEFAULT_PASS_THRESHOLD),
            curriculum_progress: curriculum_progress(
                self.catalog(),
                student,
                obligatory,
                DEFAULT_PASS_THRESHOLD,
            ),
            courses: history.all_courses,
        })
    }

    pub fn course_detail(&self, course_code: &str) -> Option<CourseDetail> {
        let course = self.catalog().course(course_code)?;
        Some(CourseDetail {
            course: course.clone(),
            statistics: course_statistics(self.catalog(), course_code),
            related_courses: self
                .recommender
                .graph()
                .related_courses(course_code, RELATED_COURSE_LIMIT),
            prerequisite_chains: prerequisite_chains(self.catalog(), course_code),
        })
    }

    /// Distinct students with any attempt at the course, sorted
    pub fn students_who_took(&self, course_code: &str) -> Vec<String> {
        self.catalog()
            .records()
            .iter()
            .filter(|r| r.course_code == course_code)
            .map(|r| r.student.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn tracks(&self) -> TrackSummary {
        let tracks: Vec<String> = self.recommender.content().track_labels().to_vec();
        let courses_per_track = tracks
            .iter()
            .map(|t| {
                let count = self
                    .catalog()
                    .courses()
                    .iter()
                    .filter(|c| c.tracks.contains(t))
                    .count();
                (t.clone(), count)
            })
            .collect();

        TrackSummary {
            total: tracks.len(),
            tracks,
            courses_per_track,
        }
    }

    pub fn system_stats(&self) -> SystemStats {
        let graph_stats = self.recommender.graph().stats();
        let tracks = self.recommender.content().track_labels().to_vec();

        SystemStats {
            system: CatalogSummary {
                total_students: self.catalog().all_students().len(),
                total_courses: self.catalog().courses().len(),
                total_records: self.catalog().records().len(),
                total_tracks: tracks.len(),
                tracks,
            },
            models: ModelSummary {
                kg_nodes: graph_stats.num_nodes,
                kg_edges: graph_stats.num_edges,
                embedding_dim: self.recommender.graph().dimensions(),
                cf_factors: self.recommender.collaborative().factors(),
                cf_interactions: self.recommender.collaborative().interactions().nnz(),
                fusion_input_dim: self.recommender.ranker().network().input_dim(),
                trained_at: self.manifest.as_ref().map(|m| m.trained_at.to_rfc3339()),
            },
            data_quality: self.validation.clone(),
        }
    }
}
