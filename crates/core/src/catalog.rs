//! Course catalog and student grade history
//!
//! The catalog is loaded once and never mutated. Student views are derived
//! on demand for a given pass threshold.

use crate::error::{CurriculaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

/// Pass threshold used by rule evaluation and content profiles
pub const DEFAULT_PASS_THRESHOLD: f32 = 10.0;

/// Lowest and highest valid grades
pub const GRADE_RANGE: (f32, f32) = (0.0, 20.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: String,
    /// Prerequisite course codes, in declaration order
    pub prerequisites: Vec<String>,
    /// Track labels the course belongs to
    pub tracks: Vec<String>,
}

impl Course {
    pub fn new(code: &str, name: &str, prerequisites: &[&str], tracks: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            prerequisites: prerequisites.iter().map(|s| s.to_string()).collect(),
            tracks: tracks.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn shares_track_with(&self, other: &Course) -> bool {
        self.tracks.iter().any(|t| other.tracks.contains(t))
    }
}

/// One attempt of one student at one course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub student: String,
    pub course_code: String,
    pub cycle: u32,
    pub grade: f32,
}

impl HistoryRecord {
    pub fn new(student: &str, course_code: &str, cycle: u32, grade: f32) -> Self {
        Self {
            student: student.to_string(),
            course_code: course_code.to_string(),
            cycle,
            grade,
        }
    }

    pub fn grade_in_range(&self) -> bool {
        self.grade >= GRADE_RANGE.0 && self.grade <= GRADE_RANGE.1
    }
}

/// Source of courses and grade history
pub trait CatalogProvider {
    fn courses(&self) -> Result<Vec<Course>>;
    fn history(&self) -> Result<Vec<HistoryRecord>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEntry {
    pub course_code: String,
    pub grade: f32,
}

/// Derived per-student view of the grade history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentHistory {
    pub student_id: String,
    /// Every attempted course, one entry per record (retakes repeat)
    pub all_courses: Vec<String>,
    /// Courses whose best grade reaches the threshold, sorted
    pub passed_courses: Vec<String>,
    /// Best grade per course
    pub grades: BTreeMap<String, f32>,
    pub by_cycle: BTreeMap<u32, Vec<CycleEntry>>,
}

impl StudentHistory {
    pub fn has_passed(&self, course_code: &str) -> bool {
        self.passed_courses
            .binary_search_by(|c| c.as_str().cmp(course_code))
            .is_ok()
    }

    pub fn has_taken(&self, course_code: &str) -> bool {
        self.grades.contains_key(course_code)
    }

    pub fn best_grade(&self, course_code: &str) -> Option<f32> {
        self.grades.get(course_code).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.all_courses.is_empty()
    }
}

/// In-memory catalog of courses plus the full grade history
#[derive(Debug, Clone)]
pub struct Catalog {
    courses: Vec<Course>,
    course_index: HashMap<String, usize>,
    records: Vec<HistoryRecord>,
    students: Vec<String>,
    student_ranges: HashMap<String, Range<usize>>,
}

impl Catalog {
    /// Build a catalog; fails only on duplicate course codes
    pub fn new(courses: Vec<Course>, mut records: Vec<HistoryRecord>) -> Result<Self> {
        let mut course_index = HashMap::with_capacity(courses.len());
        let mut duplicates = BTreeSet::new();
        for (idx, course) in courses.iter().enumerate() {
            if course_index.insert(course.code.clone(), idx).is_some() {
                duplicates.insert(course.code.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(CurriculaError::invalid_data(format!(
                "Duplicate course codes in catalog: {:?}",
                duplicates
            )));
        }

        // Stable: attempts within a cycle keep their input order
        records.sort_by(|a, b| a.student.cmp(&b.student).then(a.cycle.cmp(&b.cycle)));

        let mut students = Vec::new();
        let mut student_ranges = HashMap::new();
        let mut start = 0;
        for i in 1..=records.len() {
            if i == records.len() || records[i].student != records[start].student {
                let student = records[start].student.clone();
                student_ranges.insert(student.clone(), start..i);
                students.push(student);
                start = i;
            }
        }

        Ok(Self {
            courses,
            course_index,
            records,
            students,
            student_ranges,
        })
    }

    pub fn from_provider(provider: &impl CatalogProvider) -> Result<Self> {
        Self::new(provider.courses()?, provider.history()?)
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn course(&self, code: &str) -> Option<&Course> {
        self.course_index.get(code).map(|&idx| &self.courses[idx])
    }

    pub fn contains_course(&self, code: &str) -> bool {
        self.course_index.contains_key(code)
    }

    /// Course codes in catalog order
    pub fn all_course_codes(&self) -> impl Iterator<Item = &str> {
        self.courses.iter().map(|c| c.code.as_str())
    }

    /// Distinct student ids, sorted
    pub fn all_students(&self) -> &[String] {
        &self.students
    }

    pub fn has_student(&self, student: &str) -> bool {
        self.student_ranges.contains_key(student)
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Records of one student ordered by cycle; empty for unknown students
    pub fn student_records(&self, student: &str) -> &[HistoryRecord] {
        match self.student_ranges.get(student) {
            Some(range) => &self.records[range.clone()],
            None => &[],
        }
    }

    /// Distinct track labels across all courses, sorted
    pub fn track_labels(&self) -> BTreeSet<String> {
        self.courses
            .iter()
            .flat_map(|c| c.tracks.iter().cloned())
            .collect()
    }

    /// Build the student's history view for a pass threshold
    pub fn student_history(&self, student: &str, pass_threshold: f32) -> StudentHistory {
        let records = self.student_records(student);

        let mut history = StudentHistory {
            student_id: student.to_string(),
            ..Default::default()
        };

        for record in records {
            history.all_courses.push(record.course_code.clone());

            history
                .grades
                .entry(record.course_code.clone())
                .and_modify(|best| *best = best.max(record.grade))
                .or_insert(record.grade);

            history
                .by_cycle
                .entry(record.cycle)
                .or_default()
                .push(CycleEntry {
                    course_code: record.course_code.clone(),
                    grade: record.grade,
                });
        }

        // BTreeMap iteration keeps the passed list sorted
        history.passed_courses = history
            .grades
            .iter()
            .filter(|(_, &grade)| grade >= pass_threshold)
            .map(|(code, _)| code.clone())
            .collect();

        history
    }

    /// Students with at least one attempt at `course_code` reaching the threshold
    pub fn students_who_passed(&self, course_code: &str, pass_threshold: f32) -> Vec<String> {
        let passed: BTreeSet<&str> = self
            .records
            .iter()
            .filter(|r| r.course_code == course_code && r.grade >= pass_threshold)
            .map(|r| r.student.as_str())
            .collect();

        passed.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        Catalog::new(
            vec![
                Course::new("A", "Algebra", &[], &["math"]),
                Course::new("B", "Calculus", &["A"], &["math", "physics"]),
            ],
            vec![
                HistoryRecord::new("s2", "A", 1, 12.0),
                HistoryRecord::new("s1", "A", 2, 8.0),
                HistoryRecord::new("s1", "A", 1, 15.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_records_sorted_by_student_and_cycle() {
        let catalog = sample();
        let s1: Vec<u32> = catalog.student_records("s1").iter().map(|r| r.cycle).collect();
        assert_eq!(s1, vec![1, 2]);
        assert_eq!(catalog.all_students(), &["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn test_best_grade_over_retakes() {
        let catalog = sample();
        let history = catalog.student_history("s1", 10.0);

        assert_eq!(history.all_courses, vec!["A", "A"]);
        assert_eq!(history.passed_courses, vec!["A"]);
        assert_eq!(history.best_grade("A"), Some(15.0));
        assert_eq!(history.by_cycle.len(), 2);
    }

    #[test]
    fn test_unknown_student_has_empty_history() {
        let catalog = sample();
        let history = catalog.student_history("nobody", 10.0);
        assert!(history.is_empty());
        assert!(history.passed_courses.is_empty());
    }

    #[test]
    fn test_duplicate_course_codes_rejected() {
        let result = Catalog::new(
            vec![
                Course::new("A", "Algebra", &[], &[]),
                Course::new("A", "Algebra II", &[], &[]),
            ],
            vec![],
        );
        assert!(matches!(result, Err(CurriculaError::InvalidData { .. })));
    }

    #[test]
    fn test_students_who_passed() {
        let catalog = sample();
        assert_eq!(catalog.students_who_passed("A", 11.0), vec!["s1", "s2"]);
        assert_eq!(catalog.students_who_passed("A", 13.0), vec!["s1"]);
    }

    #[test]
    fn test_track_labels_sorted() {
        let catalog = sample();
        let labels: Vec<String> = catalog.track_labels().into_iter().collect();
        assert_eq!(labels, vec!["math", "physics"]);
    }
}
