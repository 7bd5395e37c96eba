use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::repository;
use crate::error::AppError;
use crate::models::{department_of, CourseState, SectionState, SectionType, Status};

// The dashboard client consumes a minified-key document; the short names
// below are a stable wire contract, kept in one place as serde renames.

/// One `(snapshot index, enrollment, capacity, fill)` point of a section's
/// time series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    #[serde(rename = "i")]
    pub snapshot_index: usize,
    #[serde(rename = "e")]
    pub enrollment: i64,
    #[serde(rename = "c")]
    pub capacity: i64,
    #[serde(rename = "f")]
    pub fill: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionExport {
    #[serde(rename = "t")]
    pub section_type: String,
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(rename = "ce")]
    pub current_enrollment: i64,
    #[serde(rename = "cc")]
    pub current_capacity: i64,
    #[serde(rename = "cf")]
    pub current_fill: f64,
    #[serde(rename = "h")]
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseExport {
    #[serde(rename = "d")]
    pub department: String,
    #[serde(rename = "ti", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "af")]
    pub average_fill: f64,
    #[serde(rename = "if")]
    pub is_filled: bool,
    #[serde(rename = "s")]
    pub sections: BTreeMap<String, SectionExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRef {
    #[serde(rename = "ts")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterData {
    #[serde(rename = "sem")]
    pub semester: String,
    #[serde(rename = "lrt", skip_serializing_if = "Option::is_none")]
    pub last_report_time: Option<String>,
    #[serde(rename = "sn")]
    pub snapshots: Vec<SnapshotRef>,
    #[serde(rename = "cr")]
    pub courses: BTreeMap<String, CourseExport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub time: String,
    pub label: String,
    pub color: String,
}

pub type MilestoneMap = BTreeMap<String, Vec<Milestone>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardExport {
    #[serde(rename = "sems")]
    pub semesters: Vec<String>,
    #[serde(rename = "as")]
    pub active_semester: String,
    #[serde(rename = "sd")]
    pub semester_data: BTreeMap<String, SemesterData>,
    #[serde(rename = "md")]
    pub milestones: BTreeMap<String, Vec<Milestone>>,
}

/// Registration milestones are deployment data, not code; absent file means
/// no markers.
pub fn load_milestones(path: &Path) -> Result<MilestoneMap, AppError> {
    if !path.exists() {
        return Ok(MilestoneMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::Validation(format!("malformed milestones file {}: {e}", path.display()))
    })
}

/// Project one semester's history into the dashboard document. Pure read:
/// derivable at any time from store contents alone.
pub async fn semester_export(db: &SqlitePool, semester: &str) -> Result<SemesterData, AppError> {
    let snapshots = repository::list_snapshots(db, Some(semester)).await?;
    let snapshot_index: BTreeMap<i64, usize> = snapshots
        .iter()
        .enumerate()
        .map(|(idx, (id, _))| (*id, idx))
        .collect();

    let rows = repository::enrollment_history(db, semester).await?;

    let mut courses: BTreeMap<String, CourseExport> = BTreeMap::new();
    for row in rows {
        let course = courses
            .entry(row.course_code.clone())
            .or_insert_with(|| CourseExport {
                department: row
                    .department
                    .clone()
                    .unwrap_or_else(|| department_of(&row.course_code)),
                title: row.course_title.clone().map(|t| t.trim().to_string()),
                average_fill: 0.0,
                is_filled: false,
                sections: BTreeMap::new(),
            });

        let section_type = row
            .section_type
            .clone()
            .unwrap_or_else(|| SectionType::from_section_code(&row.section_code).as_code().to_string());

        let section = course
            .sections
            .entry(row.section_code.clone())
            .or_insert_with(|| SectionExport {
                section_type,
                instructor: row.instructor.clone(),
                current_enrollment: 0,
                current_capacity: 0,
                current_fill: 0.0,
                history: Vec::new(),
            });

        // Rows arrive in timestamp order, so the last point is the current
        // state.
        section.history.push(HistoryPoint {
            snapshot_index: snapshot_index.get(&row.snapshot_id).copied().unwrap_or(0),
            enrollment: row.enrollment_count,
            capacity: row.capacity_count,
            fill: row.fill_percentage,
        });
        section.current_enrollment = row.enrollment_count;
        section.current_capacity = row.capacity_count;
        section.current_fill = row.fill_percentage;
    }

    for course in courses.values_mut() {
        if course.sections.is_empty() {
            continue;
        }
        course.average_fill = course
            .sections
            .values()
            .map(|s| s.current_fill)
            .sum::<f64>()
            / course.sections.len() as f64;
        course.is_filled = course_is_filled(course);
    }

    Ok(SemesterData {
        semester: semester.to_string(),
        last_report_time: repository::last_report_time(db).await?,
        snapshots: snapshots
            .into_iter()
            .map(|(_, timestamp)| SnapshotRef { timestamp })
            .collect(),
        courses,
    })
}

/// Same filled rule the report formatter applies.
fn course_is_filled(course: &CourseExport) -> bool {
    let state = CourseState {
        course_code: String::new(),
        course_title: None,
        department: course.department.clone(),
        average_fill: course.average_fill,
        sections: course
            .sections
            .iter()
            .map(|(code, section)| {
                (
                    code.clone(),
                    SectionState {
                        section_code: code.clone(),
                        section_type: SectionType::from_code(&section.section_type),
                        instructor: section.instructor.clone(),
                        enrollment: section.current_enrollment,
                        capacity: section.current_capacity,
                        fill: section.current_fill,
                        status: Status::classify(section.current_fill),
                    },
                )
            })
            .collect(),
    };
    state.is_filled()
}

/// Assemble the multi-semester document. The active semester is an explicit
/// parameter; it defaults to the most recently observed one.
pub async fn dashboard_export(
    db: &SqlitePool,
    active: Option<&str>,
    milestones: &MilestoneMap,
) -> Result<DashboardExport, AppError> {
    let semesters = repository::semesters(db).await?;
    let active_semester = active
        .map(str::to_string)
        .or_else(|| semesters.first().cloned())
        .unwrap_or_default();

    let mut semester_data = BTreeMap::new();
    let mut milestone_map = BTreeMap::new();
    for semester in &semesters {
        semester_data.insert(semester.clone(), semester_export(db, semester).await?);
        milestone_map.insert(
            semester.clone(),
            milestones.get(semester).cloned().unwrap_or_default(),
        );
    }

    Ok(DashboardExport {
        semesters,
        active_semester,
        semester_data,
        milestones: milestone_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_uses_the_minified_key_contract() {
        let point = HistoryPoint {
            snapshot_index: 2,
            enrollment: 18,
            capacity: 20,
            fill: 0.9,
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["i"], 2);
        assert_eq!(json["e"], 18);
        assert_eq!(json["c"], 20);
        assert_eq!(json["f"], 0.9);

        let section = SectionExport {
            section_type: "L".to_string(),
            instructor: Some("Dr. Smith".to_string()),
            current_enrollment: 18,
            current_capacity: 20,
            current_fill: 0.9,
            history: vec![point],
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["t"], "L");
        assert_eq!(json["in"], "Dr. Smith");
        assert_eq!(json["ce"], 18);
        assert!(json["h"].is_array());

        let export = DashboardExport {
            semesters: vec!["Spring 2026".to_string()],
            active_semester: "Spring 2026".to_string(),
            semester_data: BTreeMap::new(),
            milestones: BTreeMap::new(),
        };
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["as"], "Spring 2026");
        assert!(json["sems"].is_array());
        assert!(json["sd"].is_object());
        assert!(json["md"].is_object());
    }

    #[test]
    fn missing_milestone_file_yields_empty_map() {
        let map = load_milestones(Path::new("does-not-exist.json")).unwrap();
        assert!(map.is_empty());
    }
}
