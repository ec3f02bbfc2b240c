//! CSV catalog loading
//!
//! Expects two files in the data directory:
//!
//! - `courses.csv`: `course_code, course_name, prereq_codes, lineas_carrera`
//!   where the last two columns are `;`-separated lists (blank allowed)
//! - `courses_taken.csv`: `alumno, course_code, cycle, grade`

use crate::catalog::{CatalogProvider, Course, HistoryRecord, GRADE_RANGE};
use crate::error::{CurriculaError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const COURSES_FILE: &str = "courses.csv";
pub const HISTORY_FILE: &str = "courses_taken.csv";

const COURSE_COLUMNS: [&str; 4] = ["course_code", "course_name", "prereq_codes", "lineas_carrera"];
const HISTORY_COLUMNS: [&str; 4] = ["alumno", "course_code", "cycle", "grade"];

#[derive(Debug, Deserialize)]
struct CourseRow {
    course_code: String,
    course_name: String,
    #[serde(default)]
    prereq_codes: Option<String>,
    #[serde(default)]
    lineas_carrera: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    alumno: String,
    course_code: String,
    cycle: u32,
    grade: f32,
}

/// Reads the catalog from CSV files under a data directory
#[derive(Debug, Clone)]
pub struct CsvCatalogLoader {
    data_dir: PathBuf,
}

impl CsvCatalogLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn courses_path(&self) -> PathBuf {
        self.data_dir.join(COURSES_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    fn open(path: &Path, required: &[&str]) -> Result<csv::Reader<File>> {
        if !path.exists() {
            return Err(CurriculaError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();

        if !missing.is_empty() {
            return Err(CurriculaError::invalid_data(format!(
                "{} is missing columns: {}",
                path.display(),
                missing.join(", ")
            )));
        }

        Ok(reader)
    }
}

impl CatalogProvider for CsvCatalogLoader {
    fn courses(&self) -> Result<Vec<Course>> {
        let path = self.courses_path();
        let mut reader = Self::open(&path, &COURSE_COLUMNS)?;

        let mut seen = HashSet::new();
        let mut courses = Vec::new();

        for row in reader.deserialize::<CourseRow>() {
            let row = row?;
            if !seen.insert(row.course_code.clone()) {
                return Err(CurriculaError::invalid_data(format!(
                    "Duplicate course code '{}' in {}",
                    row.course_code,
                    path.display()
                )));
            }

            courses.push(Course {
                code: row.course_code,
                name: row.course_name,
                prerequisites: split_list(row.prereq_codes.as_deref()),
                tracks: split_list(row.lineas_carrera.as_deref()),
            });
        }

        debug!(count = courses.len(), path = %path.display(), "Loaded courses");
        Ok(courses)
    }

    fn history(&self) -> Result<Vec<HistoryRecord>> {
        let path = self.history_path();
        let mut reader = Self::open(&path, &HISTORY_COLUMNS)?;

        let mut records = Vec::new();
        let mut out_of_range = 0usize;

        for row in reader.deserialize::<HistoryRow>() {
            let row = row?;
            let record = HistoryRecord {
                student: row.alumno,
                course_code: row.course_code,
                cycle: row.cycle,
                grade: row.grade,
            };
            if !record.grade_in_range() {
                out_of_range += 1;
            }
            records.push(record);
        }

        if out_of_range > 0 {
            warn!(
                count = out_of_range,
                min = GRADE_RANGE.0,
                max = GRADE_RANGE.1,
                "History contains grades outside the valid range"
            );
        }

        records.sort_by(|a, b| a.student.cmp(&b.student).then(a.cycle.cmp(&b.cycle)));

        debug!(count = records.len(), path = %path.display(), "Loaded history records");
        Ok(records)
    }
}

/// Split a `;`-separated cell, dropping blanks
fn split_list(cell: Option<&str>) -> Vec<String> {
    cell.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(Some("A; B;;C ")), vec!["A", "B", "C"]);
        assert!(split_list(Some("")).is_empty());
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_missing_directory_reports_path() {
        let loader = CsvCatalogLoader::new("/nonexistent/curricula");
        let err = loader.courses().unwrap_err();
        assert!(err.is_missing_input());
        assert!(err.to_string().contains(COURSES_FILE));
    }
}
