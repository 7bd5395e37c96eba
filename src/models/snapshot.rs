use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::status::{SectionType, Status};

/// One normalized registrar record, as handed to the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionObservation {
    pub course_code: String,
    #[serde(default)]
    pub course_title: Option<String>,
    pub section_code: String,
    #[serde(default)]
    pub section_type: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    pub enrollment: i64,
    pub capacity: i64,
}

impl SectionObservation {
    pub fn fill(&self) -> f64 {
        if self.capacity > 0 {
            self.enrollment as f64 / self.capacity as f64
        } else {
            0.0
        }
    }

    pub fn section_type(&self) -> SectionType {
        match &self.section_type {
            Some(code) => SectionType::from_code(code),
            None => SectionType::from_section_code(&self.section_code),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.course_code.trim().is_empty() {
            return Err(AppError::Validation("empty course code".to_string()));
        }
        if self.section_code.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "empty section code for course {}",
                self.course_code
            )));
        }
        if self.enrollment < 0 || self.capacity < 0 {
            return Err(AppError::Validation(format!(
                "negative counts for {} {}: {}/{}",
                self.course_code, self.section_code, self.enrollment, self.capacity
            )));
        }
        Ok(())
    }
}

/// A full poll of the registrar feed, ready for atomic ingestion.
#[derive(Debug, Clone)]
pub struct SnapshotBatch {
    pub timestamp: String,
    pub semester: String,
    pub records: Vec<SectionObservation>,
}

impl SnapshotBatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.timestamp.trim().is_empty() {
            return Err(AppError::Validation("empty snapshot timestamp".to_string()));
        }
        if self.semester.trim().is_empty() {
            return Err(AppError::Validation("empty semester label".to_string()));
        }
        for record in &self.records {
            record.validate()?;
        }
        Ok(())
    }

    /// Overall fill is the plain mean of section fill ratios, not an
    /// enrollment-weighted one.
    pub fn overall_fill(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().map(|r| r.fill()).sum::<f64>() / self.records.len() as f64
    }
}

pub fn department_of(course_code: &str) -> String {
    course_code
        .split_whitespace()
        .next()
        .unwrap_or(course_code)
        .to_string()
}

/// A section's state within one snapshot, as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionState {
    pub section_code: String,
    pub section_type: SectionType,
    pub instructor: Option<String>,
    pub enrollment: i64,
    pub capacity: i64,
    pub fill: f64,
    pub status: Status,
}

impl SectionState {
    pub fn is_filled(&self) -> bool {
        self.fill >= 1.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseState {
    pub course_code: String,
    pub course_title: Option<String>,
    pub department: String,
    pub average_fill: f64,
    pub sections: BTreeMap<String, SectionState>,
}

impl CourseState {
    pub fn recompute_average_fill(&mut self) {
        if self.sections.is_empty() {
            self.average_fill = 0.0;
        } else {
            self.average_fill =
                self.sections.values().map(|s| s.fill).sum::<f64>() / self.sections.len() as f64;
        }
    }

    /// A course is effectively filled when every section of at least one
    /// type is full: a student needs a seat in each required type.
    pub fn is_filled(&self) -> bool {
        if self.sections.is_empty() {
            return false;
        }

        let mut by_type: BTreeMap<&'static str, Vec<&SectionState>> = BTreeMap::new();
        for section in self.sections.values() {
            by_type
                .entry(section.section_type.as_code())
                .or_default()
                .push(section);
        }

        by_type
            .values()
            .any(|sections| sections.iter().all(|s| s.is_filled()))
    }
}

/// A fully reconstructed snapshot: metadata plus every course and section
/// observed at that point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotData {
    pub snapshot_id: i64,
    pub timestamp: String,
    pub semester: String,
    pub overall_fill: f64,
    pub courses: BTreeMap<String, CourseState>,
}
