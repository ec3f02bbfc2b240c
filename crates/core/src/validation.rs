//! Data consistency report for a loaded catalog
//!
//! Structural problems are collected here instead of failing the load.

use crate::catalog::{Catalog, GRADE_RANGE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidPrerequisite {
    pub course: String,
    pub prerequisite: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfRangeGrade {
    pub student: String,
    pub course: String,
    pub cycle: u32,
    pub grade: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStats {
    pub num_courses: usize,
    pub num_students: usize,
    pub num_records: usize,
    pub avg_courses_per_student: f32,
    pub avg_grade: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False only when `issues` is non-empty
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    /// Course codes referenced by history but absent from the catalog
    pub unknown_courses: Vec<String>,
    pub invalid_prerequisites: Vec<InvalidPrerequisite>,
    pub out_of_range_grades: Vec<OutOfRangeGrade>,
    pub stats: DataStats,
}

impl ValidationReport {
    pub fn build(catalog: &Catalog) -> Self {
        let mut report = ValidationReport::default();

        let unknown: BTreeSet<&str> = catalog
            .records()
            .iter()
            .map(|r| r.course_code.as_str())
            .filter(|code| !catalog.contains_course(code))
            .collect();
        if !unknown.is_empty() {
            report.warnings.push(format!(
                "{} course(s) in history are not in the catalog",
                unknown.len()
            ));
            report.unknown_courses = unknown.into_iter().map(str::to_string).collect();
        }

        for course in catalog.courses() {
            // A course gated on itself can never become eligible
            if course.prerequisites.contains(&course.code) {
                report
                    .issues
                    .push(format!("Course {} lists itself as a prerequisite", course.code));
            }
            for prereq in &course.prerequisites {
                if !catalog.contains_course(prereq) {
                    report.invalid_prerequisites.push(InvalidPrerequisite {
                        course: course.code.clone(),
                        prerequisite: prereq.clone(),
                    });
                }
            }
        }
        if !report.invalid_prerequisites.is_empty() {
            report.warnings.push(format!(
                "{} prerequisite reference(s) point to unknown courses",
                report.invalid_prerequisites.len()
            ));
        }

        let non_finite = catalog
            .records()
            .iter()
            .filter(|r| !r.grade.is_finite())
            .count();
        if non_finite > 0 {
            report
                .issues
                .push(format!("{} grade(s) are not finite numbers", non_finite));
        }

        report.out_of_range_grades = catalog
            .records()
            .iter()
            .filter(|r| r.grade.is_finite() && !r.grade_in_range())
            .map(|r| OutOfRangeGrade {
                student: r.student.clone(),
                course: r.course_code.clone(),
                cycle: r.cycle,
                grade: r.grade,
            })
            .collect();
        if !report.out_of_range_grades.is_empty() {
            report.warnings.push(format!(
                "{} grade(s) outside [{}, {}]",
                report.out_of_range_grades.len(),
                GRADE_RANGE.0,
                GRADE_RANGE.1
            ));
        }

        let num_records = catalog.records().len();
        let num_students = catalog.all_students().len();
        report.stats = DataStats {
            num_courses: catalog.courses().len(),
            num_students,
            num_records,
            avg_courses_per_student: if num_students > 0 {
                num_records as f32 / num_students as f32
            } else {
                0.0
            },
            avg_grade: if num_records > 0 {
                catalog.records().iter().map(|r| r.grade).sum::<f32>() / num_records as f32
            } else {
                0.0
            },
        };

        report.valid = report.issues.is_empty();
        report
    }

    /// Prerequisite codes that do not resolve, deduplicated and sorted
    pub fn missing_prerequisite_codes(&self) -> BTreeSet<&str> {
        self.invalid_prerequisites
            .iter()
            .map(|p| p.prerequisite.as_str())
            .collect()
    }
}
