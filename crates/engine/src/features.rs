//! Stable integer indices for students and courses, plus the multi-label
//! track encoding shared by the content and fusion models.

use curricula_core::Catalog;
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FeatureIndex {
    students: Vec<String>,
    courses: Vec<String>,
    track_labels: Vec<String>,
    /// Multi-hot track membership, one row per course in catalog order
    course_tracks: Array2<f32>,
    student_lookup: HashMap<String, usize>,
    course_lookup: HashMap<String, usize>,
}

impl FeatureIndex {
    /// Students in sorted order, courses in catalog order, track labels sorted
    pub fn build(catalog: &Catalog) -> Self {
        let students = catalog.all_students().to_vec();
        let courses: Vec<String> = catalog.all_course_codes().map(str::to_string).collect();
        let track_labels: Vec<String> = catalog.track_labels().into_iter().collect();

        let label_lookup: HashMap<&str, usize> = track_labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut course_tracks = Array2::<f32>::zeros((courses.len(), track_labels.len()));
        for (row, course) in catalog.courses().iter().enumerate() {
            for track in &course.tracks {
                if let Some(&col) = label_lookup.get(track.as_str()) {
                    course_tracks[[row, col]] = 1.0;
                }
            }
        }

        Self::from_parts(students, courses, track_labels, course_tracks)
    }

    pub(crate) fn from_parts(
        students: Vec<String>,
        courses: Vec<String>,
        track_labels: Vec<String>,
        course_tracks: Array2<f32>,
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
            track_labels,
            course_tracks,
            student_lookup,
            course_lookup,
        }
    }

    pub fn student_index(&self, student: &str) -> Option<usize> {
        self.student_lookup.get(student).copied()
    }

    pub fn course_index(&self, course_code: &str) -> Option<usize> {
        self.course_lookup.get(course_code).copied()
    }

    pub fn student_id(&self, idx: usize) -> Option<&str> {
        self.students.get(idx).map(String::as_str)
    }

    pub fn course_code(&self, idx: usize) -> Option<&str> {
        self.courses.get(idx).map(String::as_str)
    }

    pub fn num_students(&self) -> usize {
        self.students.len()
    }

    pub fn num_courses(&self) -> usize {
        self.courses.len()
    }

    pub fn students(&self) -> &[String] {
        &self.students
    }

    pub fn courses(&self) -> &[String] {
        &self.courses
    }

    pub fn track_labels(&self) -> &[String] {
        &self.track_labels
    }

    pub fn num_tracks(&self) -> usize {
        self.track_labels.len()
    }

    pub fn course_track_matrix(&self) -> &Array2<f32> {
        &self.course_tracks
    }

    pub fn course_track_row(&self, idx: usize) -> ArrayView1<'_, f32> {
        self.course_tracks.row(idx)
    }

    /// Multi-hot vector for a course; zeros for unknown codes
    pub fn course_track_vector(&self, course_code: &str) -> Array1<f32> {
        match self.course_index(course_code) {
            Some(idx) => self.course_tracks.row(idx).to_owned(),
            None => Array1::zeros(self.track_labels.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_core::{Course, HistoryRecord};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                Course::new("Z1", "Zeta", &[], &["power", "control"]),
                Course::new("A1", "Alpha", &[], &["control"]),
                Course::new("M1", "Mid", &[], &[]),
            ],
            vec![
                HistoryRecord::new("s9", "A1", 1, 12.0),
                HistoryRecord::new("s1", "Z1", 1, 9.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_index_orders() {
        let index = FeatureIndex::build(&catalog());

        assert_eq!(index.student_index("s1"), Some(0));
        assert_eq!(index.student_index("s9"), Some(1));
        assert_eq!(index.course_index("Z1"), Some(0));
        assert_eq!(index.course_code(1), Some("A1"));
        assert_eq!(index.track_labels(), &["control".to_string(), "power".to_string()]);
    }

    #[test]
    fn test_course_track_vectors() {
        let index = FeatureIndex::build(&catalog());

        assert_eq!(index.course_track_vector("Z1").to_vec(), vec![1.0, 1.0]);
        assert_eq!(index.course_track_vector("A1").to_vec(), vec![1.0, 0.0]);
        assert_eq!(index.course_track_vector("M1").to_vec(), vec![0.0, 0.0]);
        assert_eq!(index.course_track_vector("nope").to_vec(), vec![0.0, 0.0]);
    }
}
