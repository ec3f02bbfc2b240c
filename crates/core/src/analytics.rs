//! Descriptive statistics over the catalog
//!
//! Nothing here feeds the models; these queries back the CLI `analyze`
//! command and the course/student endpoints of the service.

use crate::catalog::{Catalog, DEFAULT_PASS_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[serde(rename = "n/a")]
    NotAvailable,
}

impl Difficulty {
    pub fn from_average(avg_grade: f32) -> Self {
        if avg_grade >= 14.0 {
            Difficulty::Easy
        } else if avg_grade >= 11.0 {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::NotAvailable => "n/a",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStatistics {
    pub course_code: String,
    /// Number of attempts, retakes included
    pub num_records: usize,
    pub avg_grade: f32,
    /// Percentage of attempts at or above 10.0
    pub pass_rate: f32,
    pub difficulty: Difficulty,
}

pub fn course_statistics(catalog: &Catalog, course_code: &str) -> CourseStatistics {
    let grades: Vec<f32> = catalog
        .records()
        .iter()
        .filter(|r| r.course_code == course_code)
        .map(|r| r.grade)
        .collect();

    if grades.is_empty() {
        return CourseStatistics {
            course_code: course_code.to_string(),
            num_records: 0,
            avg_grade: 0.0,
            pass_rate: 0.0,
            difficulty: Difficulty::NotAvailable,
        };
    }

    let n = grades.len() as f32;
    let avg_grade = grades.iter().sum::<f32>() / n;
    let passed = grades
        .iter()
        .filter(|&&g| g >= DEFAULT_PASS_THRESHOLD)
        .count();

    CourseStatistics {
        course_code: course_code.to_string(),
        num_records: grades.len(),
        avg_grade,
        pass_rate: passed as f32 / n * 100.0,
        difficulty: Difficulty::from_average(avg_grade),
    }
}

/// Every chain from a root prerequisite down to `course_code`
///
/// Chains are ordered root first. A code already on the current path is not
/// revisited, so cyclic declarations terminate. Codes missing from the
/// catalog act as roots.
pub fn prerequisite_chains(catalog: &Catalog, course_code: &str) -> Vec<Vec<String>> {
    fn walk(catalog: &Catalog, code: &str, path: &mut Vec<String>) -> Vec<Vec<String>> {
        if path.iter().any(|c| c == code) {
            return Vec::new();
        }

        let prereqs = match catalog.course(code) {
            Some(course) if !course.prerequisites.is_empty() => &course.prerequisites,
            _ => return vec![vec![code.to_string()]],
        };

        path.push(code.to_string());
        let mut chains = Vec::new();
        for prereq in prereqs {
            for mut chain in walk(catalog, prereq, path) {
                chain.push(code.to_string());
                chains.push(chain);
            }
        }
        path.pop();

        chains
    }

    walk(catalog, course_code, &mut Vec::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPerformance {
    pub student_id: String,
    /// Attempts, retakes included
    pub total_courses: usize,
    pub passed_courses: usize,
    pub failed_courses: usize,
    pub pass_rate: f32,
    pub avg_grade_passed: f32,
    /// Average best grade of passed courses per track
    pub track_performance: BTreeMap<String, f32>,
    pub best_track: Option<(String, f32)>,
    pub worst_track: Option<(String, f32)>,
}

pub fn student_performance(
    catalog: &Catalog,
    student_id: &str,
    pass_threshold: f32,
) -> StudentPerformance {
    let history = catalog.student_history(student_id, pass_threshold);

    let total_courses = history.all_courses.len();
    let passed_courses = history.passed_courses.len();

    let passed_grades: Vec<f32> = history
        .grades
        .values()
        .copied()
        .filter(|&g| g >= pass_threshold)
        .collect();
    let avg_grade_passed = mean(&passed_grades);

    let mut by_track: BTreeMap<String, Vec<f32>> = BTreeMap::new();
    for code in &history.passed_courses {
        let Some(course) = catalog.course(code) else {
            continue;
        };
        let grade = history.best_grade(code).unwrap_or(0.0);
        for track in &course.tracks {
            by_track.entry(track.clone()).or_default().push(grade);
        }
    }

    let track_performance: BTreeMap<String, f32> = by_track
        .into_iter()
        .map(|(track, grades)| (track, mean(&grades)))
        .collect();

    // First maximum/minimum in label order wins ties
    let mut best_track: Option<(String, f32)> = None;
    let mut worst_track: Option<(String, f32)> = None;
    for (track, &avg) in &track_performance {
        if best_track.as_ref().map_or(true, |(_, b)| avg > *b) {
            best_track = Some((track.clone(), avg));
        }
        if worst_track.as_ref().map_or(true, |(_, w)| avg < *w) {
            worst_track = Some((track.clone(), avg));
        }
    }

    StudentPerformance {
        student_id: student_id.to_string(),
        total_courses,
        passed_courses,
        failed_courses: total_courses.saturating_sub(passed_courses),
        pass_rate: if total_courses > 0 {
            passed_courses as f32 / total_courses as f32 * 100.0
        } else {
            0.0
        },
        avg_grade_passed,
        track_performance,
        best_track,
        worst_track,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentComparison {
    pub student_a: String,
    pub student_b: String,
    pub common_courses: Vec<String>,
    pub only_a: Vec<String>,
    pub only_b: Vec<String>,
    /// Jaccard index of the two passed sets
    pub similarity: f32,
}

pub fn compare_students(
    catalog: &Catalog,
    student_a: &str,
    student_b: &str,
    pass_threshold: f32,
) -> StudentComparison {
    let history_a = catalog.student_history(student_a, pass_threshold);
    let history_b = catalog.student_history(student_b, pass_threshold);

    let passed_a: BTreeSet<&String> = history_a.passed_courses.iter().collect();
    let passed_b: BTreeSet<&String> = history_b.passed_courses.iter().collect();

    let common: Vec<String> = passed_a.intersection(&passed_b).map(|s| s.to_string()).collect();
    let union = passed_a.union(&passed_b).count();

    StudentComparison {
        student_a: student_a.to_string(),
        student_b: student_b.to_string(),
        only_a: passed_a.difference(&passed_b).map(|s| s.to_string()).collect(),
        only_b: passed_b.difference(&passed_a).map(|s| s.to_string()).collect(),
        similarity: if union > 0 {
            common.len() as f32 / union as f32
        } else {
            0.0
        },
        common_courses: common,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumProgress {
    pub student_id: String,
    pub obligatory_passed: usize,
    pub obligatory_failed: Vec<String>,
    pub obligatory_pending: Vec<String>,
    pub total_obligatory: usize,
    pub progress_percentage: f32,
}

/// Progress through a set of required courses
pub fn curriculum_progress<'a>(
    catalog: &Catalog,
    student_id: &str,
    obligatory: impl IntoIterator<Item = &'a str>,
    pass_threshold: f32,
) -> CurriculumProgress {
    let history = catalog.student_history(student_id, pass_threshold);
    let obligatory: BTreeSet<&str> = obligatory.into_iter().collect();

    let mut passed = 0;
    let mut failed = Vec::new();
    let mut pending = Vec::new();
    for &code in &obligatory {
        if history.has_passed(code) {
            passed += 1;
        } else if history.has_taken(code) {
            failed.push(code.to_string());
        } else {
            pending.push(code.to_string());
        }
    }

    CurriculumProgress {
        student_id: student_id.to_string(),
        obligatory_passed: passed,
        obligatory_failed: failed,
        obligatory_pending: pending,
        total_obligatory: obligatory.len(),
        progress_percentage: if obligatory.is_empty() {
            0.0
        } else {
            passed as f32 / obligatory.len() as f32 * 100.0
        },
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
