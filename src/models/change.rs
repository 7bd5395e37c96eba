use crate::models::snapshot::{CourseState, SectionState};
use crate::models::status::Status;

/// Fill deltas at or below this are noise, not changes.
pub const FILL_EPSILON: f64 = 0.001;

/// A section present in both snapshots whose numbers moved.
#[derive(Debug, Clone)]
pub struct SectionChange {
    pub section_code: String,
    pub previous_enrollment: i64,
    pub current_enrollment: i64,
    pub previous_capacity: i64,
    pub current_capacity: i64,
    pub previous_fill: f64,
    pub current_fill: f64,
    pub previous_status: Status,
    pub current_status: Status,
}

impl SectionChange {
    pub fn enrollment_delta(&self) -> i64 {
        self.current_enrollment - self.previous_enrollment
    }

    pub fn capacity_changed(&self) -> bool {
        self.current_capacity != self.previous_capacity
    }

    /// The section crossed into FULL with this change.
    pub fn filled_up(&self) -> bool {
        self.previous_status != Status::Full && self.current_status == Status::Full
    }

    /// The section crossed out of FULL, i.e. seats opened up again.
    pub fn reopened(&self) -> bool {
        self.previous_status == Status::Full && self.current_status != Status::Full
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseChange {
    pub course_code: String,
    pub previous_average_fill: f64,
    pub current_average_fill: f64,
    pub added_sections: Vec<SectionState>,
    pub removed_sections: Vec<SectionState>,
    pub modified_sections: Vec<SectionChange>,
}

impl CourseChange {
    pub fn is_empty(&self) -> bool {
        self.added_sections.is_empty()
            && self.removed_sections.is_empty()
            && self.modified_sections.is_empty()
    }
}

/// Structured diff between two snapshots. Backs both the change report and
/// the dashboard's change markers.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub baseline_timestamp: Option<String>,
    pub current_timestamp: String,
    pub baseline_overall_fill: f64,
    pub current_overall_fill: f64,
    pub new_courses: Vec<CourseState>,
    pub removed_courses: Vec<CourseState>,
    pub changed_courses: Vec<CourseChange>,
}

impl ChangeSet {
    pub fn overall_fill_delta(&self) -> f64 {
        self.current_overall_fill - self.baseline_overall_fill
    }

    pub fn is_empty(&self) -> bool {
        self.new_courses.is_empty()
            && self.removed_courses.is_empty()
            && self.changed_courses.is_empty()
            && self.overall_fill_delta().abs() <= FILL_EPSILON
    }
}
