//! Integration tests for CSV catalog loading and validation

use curricula_core::catalog::{Catalog, CatalogProvider};
use curricula_core::loader::{CsvCatalogLoader, COURSES_FILE, HISTORY_FILE};
use curricula_core::validation::ValidationReport;
use curricula_core::CurriculaError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const COURSES_CSV: &str = "\
course_code,course_name,prereq_codes,lineas_carrera
BMA01,Calculo I,,Matematica
BMA02,Calculo II,BMA01,Matematica;Control
EE306,Circuitos,BMA02;BXX99,Electronica
";

const HISTORY_CSV: &str = "\
alumno,course_code,cycle,grade
S2,BMA01,1,12
S1,BMA01,2,8
S1,BMA01,1,15
S1,ZZZ00,2,21
";

fn write_data(dir: &Path, courses: &str, history: &str) {
    fs::write(dir.join(COURSES_FILE), courses).unwrap();
    fs::write(dir.join(HISTORY_FILE), history).unwrap();
}

#[test]
fn test_load_catalog_from_csv() {
    let dir = TempDir::new().unwrap();
    write_data(dir.path(), COURSES_CSV, HISTORY_CSV);

    let loader = CsvCatalogLoader::new(dir.path());
    let catalog = Catalog::from_provider(&loader).unwrap();

    let codes: Vec<&str> = catalog.all_course_codes().collect();
    assert_eq!(codes, vec!["BMA01", "BMA02", "EE306"]);

    let bma02 = catalog.course("BMA02").unwrap();
    assert_eq!(bma02.prerequisites, vec!["BMA01"]);
    assert_eq!(bma02.tracks, vec!["Matematica", "Control"]);

    let bma01 = catalog.course("BMA01").unwrap();
    assert!(bma01.prerequisites.is_empty());

    assert_eq!(catalog.all_students(), &["S1".to_string(), "S2".to_string()]);
}

#[test]
fn test_history_sorted_by_student_then_cycle() {
    let dir = TempDir::new().unwrap();
    write_data(dir.path(), COURSES_CSV, HISTORY_CSV);

    let history = CsvCatalogLoader::new(dir.path()).history().unwrap();
    let keys: Vec<(&str, u32)> = history
        .iter()
        .map(|r| (r.student.as_str(), r.cycle))
        .collect();
    assert_eq!(keys, vec![("S1", 1), ("S1", 2), ("S1", 2), ("S2", 1)]);
}

#[test]
fn test_retake_keeps_best_grade() {
    let dir = TempDir::new().unwrap();
    write_data(dir.path(), COURSES_CSV, HISTORY_CSV);

    let catalog = Catalog::from_provider(&CsvCatalogLoader::new(dir.path())).unwrap();
    let history = catalog.student_history("S1", 10.0);

    assert_eq!(history.best_grade("BMA01"), Some(15.0));
    assert!(history.has_passed("BMA01"));
    assert_eq!(
        history.all_courses.iter().filter(|c| *c == "BMA01").count(),
        2
    );
}

#[test]
fn test_validation_report_lists_dangling_prerequisite() {
    let dir = TempDir::new().unwrap();
    write_data(dir.path(), COURSES_CSV, HISTORY_CSV);

    let catalog = Catalog::from_provider(&CsvCatalogLoader::new(dir.path())).unwrap();
    let report = ValidationReport::build(&catalog);

    assert!(report.valid);
    assert!(report.missing_prerequisite_codes().contains("BXX99"));
    assert_eq!(report.unknown_courses, vec!["ZZZ00"]);
    assert_eq!(report.out_of_range_grades.len(), 1);
    assert_eq!(report.stats.num_courses, 3);
    assert_eq!(report.stats.num_records, 4);
}

#[test]
fn test_duplicate_course_code_rejected() {
    let dir = TempDir::new().unwrap();
    let courses = "\
course_code,course_name,prereq_codes,lineas_carrera
BMA01,Calculo I,,
BMA01,Calculo I bis,,
";
    write_data(dir.path(), courses, HISTORY_CSV);

    let err = CsvCatalogLoader::new(dir.path()).courses().unwrap_err();
    assert!(matches!(err, CurriculaError::InvalidData { .. }));
}

#[test]
fn test_missing_column_rejected() {
    let dir = TempDir::new().unwrap();
    let history = "\
alumno,course_code,grade
S1,BMA01,12
";
    write_data(dir.path(), COURSES_CSV, history);

    let err = CsvCatalogLoader::new(dir.path()).history().unwrap_err();
    match err {
        CurriculaError::InvalidData { message } => assert!(message.contains("cycle")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_history_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(COURSES_FILE), COURSES_CSV).unwrap();

    let err = Catalog::from_provider(&CsvCatalogLoader::new(dir.path())).unwrap_err();
    assert!(err.is_missing_input());
}
