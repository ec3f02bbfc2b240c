//! Recommendation Orchestrator
//!
//! Business rules layered over the fused scores:
//! 1. Partition candidates into failed-obligatory, missing-obligatory and
//!    other courses, each tier ordered by course code
//! 2. Drop candidates whose prerequisites are not met
//! 3. `score = fusion + 0.5 * track_weight`, plus a tier boost
//! 4. Sort by (priority, score desc, code) and explain the top K

use crate::collaborative::CollaborativeFilter;
use crate::content_based::ContentModel;
use crate::graph::{KnowledgeGraph, RelatedCourse};
use crate::hybrid::{EmbeddingSources, HybridRanker};
use crate::persistence::TrainedModels;
use anyhow::Result;
use curricula_core::{Catalog, StudentHistory, DEFAULT_PASS_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Required courses of the basic and professional cycles
pub const OBLIGATORY_COURSES: [&str; 49] = [
    "BAE01", "BFI01", "BIC01", "BMA01", "BMA03", "BRN01", "CBS01", //
    "BFI05", "BMA02", "BMA09", "BQU01", "BRC01", "CBS02", //
    "BEG01", "BFI03", "BMA05", "BMA10", "BMA15", "EE306", //
    "BEF01", "CBN01", "BMA07", "BMA18", "EE320", "EE410", "BIE01", //
    "BMA22", "TLR01", "TLN01", "EE428", "EE522", "CBS05", //
    "EE430", "TLR02", "EE458", "EE588", "EE604", "TLN02", //
    "TLR03", "EE530", "EE590", //
    "BEG06", "EE498", "EE592", //
    "TLR04", "CIB45", "TLR05", //
    "EE712", "CIB46",
];

const TRACK_WEIGHT_FACTOR: f32 = 0.5;
const RELATED_COURSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    FailedObligatory,
    MissingObligatory,
    Other,
}

impl Tier {
    pub fn priority(&self) -> u8 {
        match self {
            Tier::FailedObligatory => 1,
            Tier::MissingObligatory => 2,
            Tier::Other => 3,
        }
    }

    pub fn boost(&self) -> f32 {
        match self {
            Tier::FailedObligatory => 2.0,
            Tier::MissingObligatory => 1.0,
            Tier::Other => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub content_similarity: f32,
    pub collaborative_score: f32,
    pub track_performance: f32,
    pub related_courses: Vec<RelatedCourse>,
    pub prerequisites: Vec<String>,
    pub prerequisites_met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub course_code: String,
    pub course_name: String,
    pub score: f32,
    pub tracks: Vec<String>,
    pub is_failed: bool,
    pub is_obligatory: bool,
    pub priority: u8,
    pub reasons: Explanation,
}

/// Trained models plus the catalog they were trained on
#[derive(Debug, Clone)]
pub struct Recommender {
    catalog: Catalog,
    graph: KnowledgeGraph,
    collaborative: CollaborativeFilter,
    content: ContentModel,
    ranker: HybridRanker,
    obligatory: BTreeSet<String>,
}

impl Recommender {
    pub fn new(
        catalog: Catalog,
        graph: KnowledgeGraph,
        collaborative: CollaborativeFilter,
        content: ContentModel,
        ranker: HybridRanker,
    ) -> Self {
        Self {
            catalog,
            graph,
            collaborative,
            content,
            ranker,
            obligatory: OBLIGATORY_COURSES.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn from_models(catalog: Catalog, models: TrainedModels) -> Self {
        Self::new(
            catalog,
            models.graph,
            models.collaborative,
            models.content,
            models.ranker,
        )
    }

    /// Replace the obligatory course set
    pub fn with_obligatory<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.obligatory = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn collaborative(&self) -> &CollaborativeFilter {
        &self.collaborative
    }

    pub fn content(&self) -> &ContentModel {
        &self.content
    }

    pub fn ranker(&self) -> &HybridRanker {
        &self.ranker
    }

    pub fn obligatory(&self) -> &BTreeSet<String> {
        &self.obligatory
    }

    pub fn sources(&self) -> EmbeddingSources<'_> {
        EmbeddingSources {
            catalog: &self.catalog,
            graph: &self.graph,
            collaborative: &self.collaborative,
            content: &self.content,
        }
    }

    fn history(&self, student: &str) -> StudentHistory {
        self.catalog.student_history(student, DEFAULT_PASS_THRESHOLD)
    }

    pub fn prerequisites_met(&self, student: &str, course_code: &str) -> bool {
        self.prerequisites_met_for(&self.history(student), course_code)
    }

    /// True for unknown courses and courses without prerequisites
    fn prerequisites_met_for(&self, history: &StudentHistory, course_code: &str) -> bool {
        match self.catalog.course(course_code) {
            Some(course) => course.prerequisites.iter().all(|p| history.has_passed(p)),
            None => true,
        }
    }

    pub fn track_performance_weight(&self, student: &str, course_code: &str) -> f32 {
        self.track_performance_weight_for(&self.history(student), course_code)
    }

    /// Mean best grade over passed courses sharing a track, mapped from
    /// [10, 20] onto [0, 1]
    fn track_performance_weight_for(&self, history: &StudentHistory, course_code: &str) -> f32 {
        let Some(target) = self.catalog.course(course_code) else {
            return 0.0;
        };
        if target.tracks.is_empty() {
            return 0.0;
        }

        let related: Vec<f32> = history
            .passed_courses
            .iter()
            .filter_map(|code| self.catalog.course(code))
            .filter(|course| course.shares_track_with(target))
            .map(|course| history.best_grade(&course.code).unwrap_or(0.0))
            .collect();

        if related.is_empty() {
            return 0.0;
        }

        let avg = related.iter().sum::<f32>() / related.len() as f32;
        ((avg - 10.0) / 10.0).clamp(0.0, 1.0)
    }

    /// Candidate courses in tier order
    pub fn candidates(&self, history: &StudentHistory) -> Vec<(String, Tier)> {
        let mut candidates = Vec::new();

        for code in &self.obligatory {
            if history.has_taken(code) && !history.has_passed(code) {
                candidates.push((code.clone(), Tier::FailedObligatory));
            }
        }
        for code in &self.obligatory {
            if !history.has_taken(code) {
                candidates.push((code.clone(), Tier::MissingObligatory));
            }
        }

        let others: BTreeSet<&str> = self
            .catalog
            .all_course_codes()
            .filter(|code| !history.has_passed(code) && !self.obligatory.contains(*code))
            .collect();
        candidates.extend(others.into_iter().map(|c| (c.to_string(), Tier::Other)));

        candidates
    }

    pub fn recommend(&self, student: &str, top_k: usize) -> Result<Vec<Recommendation>> {
        let history = self.history(student);

        let eligible: Vec<(String, Tier)> = self
            .candidates(&history)
            .into_iter()
            .filter(|(code, _)| self.prerequisites_met_for(&history, code))
            .collect();
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let codes: Vec<&str> = eligible.iter().map(|(c, _)| c.as_str()).collect();
        let fusion_scores = self.ranker.score_courses(self.sources(), student, &codes)?;

        let mut scored: Vec<(String, Tier, f32)> = eligible
            .into_iter()
            .zip(fusion_scores)
            .map(|((code, tier), fusion)| {
                let weight = self.track_performance_weight_for(&history, &code);
                let score = fusion + TRACK_WEIGHT_FACTOR * weight + tier.boost();
                (code, tier, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            a.1.cmp(&b.1)
                .then(b.2.total_cmp(&a.2))
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        let mut recommendations = Vec::with_capacity(scored.len());
        for (code, tier, score) in scored {
            let reasons = self.explain_for(student, &history, &code);
            let (course_name, tracks) = match self.catalog.course(&code) {
                Some(course) => (course.name.clone(), course.tracks.clone()),
                None => (String::new(), Vec::new()),
            };

            recommendations.push(Recommendation {
                is_obligatory: self.obligatory.contains(&code),
                course_code: code,
                course_name,
                score,
                tracks,
                is_failed: tier == Tier::FailedObligatory,
                priority: tier.priority(),
                reasons,
            });
        }

        Ok(recommendations)
    }

    pub fn explain(&self, student: &str, course_code: &str) -> Explanation {
        self.explain_for(student, &self.history(student), course_code)
    }

    fn explain_for(
        &self,
        student: &str,
        history: &StudentHistory,
        course_code: &str,
    ) -> Explanation {
        let profile = self.content.student_profile(history);

        Explanation {
            content_similarity: self.content.similarity(&profile, course_code),
            collaborative_score: self.collaborative.predict_score(student, course_code),
            track_performance: self.track_performance_weight_for(history, course_code),
            related_courses: self.graph.related_courses(course_code, RELATED_COURSES),
            prerequisites: self
                .catalog
                .course(course_code)
                .map(|c| c.prerequisites.clone())
                .unwrap_or_default(),
            prerequisites_met: self.prerequisites_met_for(history, course_code),
        }
    }
}
