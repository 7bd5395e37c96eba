use crate::models::{ChangeSet, CourseChange, SectionChange, SnapshotData, FILL_EPSILON};

/// Compute the structured change-set between a baseline snapshot and the
/// current one. With no baseline (first-ever snapshot) every course is
/// reported as newly observed and there are no deltas.
pub fn diff(baseline: Option<&SnapshotData>, current: &SnapshotData) -> ChangeSet {
    let mut changes = ChangeSet {
        baseline_timestamp: baseline.map(|b| b.timestamp.clone()),
        current_timestamp: current.timestamp.clone(),
        baseline_overall_fill: baseline.map(|b| b.overall_fill).unwrap_or(0.0),
        current_overall_fill: current.overall_fill,
        new_courses: Vec::new(),
        removed_courses: Vec::new(),
        changed_courses: Vec::new(),
    };

    let Some(baseline) = baseline else {
        changes.new_courses = current.courses.values().cloned().collect();
        return changes;
    };

    for (code, course) in &current.courses {
        if !baseline.courses.contains_key(code) {
            changes.new_courses.push(course.clone());
        }
    }

    for (code, course) in &baseline.courses {
        if !current.courses.contains_key(code) {
            changes.removed_courses.push(course.clone());
        }
    }

    for (code, current_course) in &current.courses {
        let Some(previous_course) = baseline.courses.get(code) else {
            continue;
        };

        let mut detail = CourseChange {
            course_code: code.clone(),
            previous_average_fill: previous_course.average_fill,
            current_average_fill: current_course.average_fill,
            ..CourseChange::default()
        };

        for (section_code, section) in &current_course.sections {
            if !previous_course.sections.contains_key(section_code) {
                detail.added_sections.push(section.clone());
            }
        }

        for (section_code, section) in &previous_course.sections {
            if !current_course.sections.contains_key(section_code) {
                detail.removed_sections.push(section.clone());
            }
        }

        for (section_code, current_section) in &current_course.sections {
            let Some(previous_section) = previous_course.sections.get(section_code) else {
                continue;
            };

            let moved = (current_section.fill - previous_section.fill).abs() > FILL_EPSILON
                || current_section.enrollment != previous_section.enrollment
                || current_section.capacity != previous_section.capacity;

            if moved {
                detail.modified_sections.push(SectionChange {
                    section_code: section_code.clone(),
                    previous_enrollment: previous_section.enrollment,
                    current_enrollment: current_section.enrollment,
                    previous_capacity: previous_section.capacity,
                    current_capacity: current_section.capacity,
                    previous_fill: previous_section.fill,
                    current_fill: current_section.fill,
                    previous_status: previous_section.status,
                    current_status: current_section.status,
                });
            }
        }

        // Average fill is derived, so it alone never marks a course changed.
        if !detail.is_empty() {
            changes.changed_courses.push(detail);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{CourseState, SectionState, SectionType, Status};

    fn section(code: &str, enrollment: i64, capacity: i64) -> SectionState {
        let fill = if capacity > 0 {
            enrollment as f64 / capacity as f64
        } else {
            0.0
        };
        SectionState {
            section_code: code.to_string(),
            section_type: SectionType::from_section_code(code),
            instructor: None,
            enrollment,
            capacity,
            fill,
            status: Status::classify(fill),
        }
    }

    fn snapshot(timestamp: &str, courses: Vec<(&str, Vec<SectionState>)>) -> SnapshotData {
        let mut course_map = BTreeMap::new();
        let mut fills = Vec::new();
        for (code, sections) in courses {
            let mut course = CourseState {
                course_code: code.to_string(),
                course_title: None,
                department: code.split_whitespace().next().unwrap().to_string(),
                average_fill: 0.0,
                sections: sections
                    .into_iter()
                    .map(|s| (s.section_code.clone(), s))
                    .collect(),
            };
            course.recompute_average_fill();
            fills.extend(course.sections.values().map(|s| s.fill));
            course_map.insert(code.to_string(), course);
        }
        let overall_fill = if fills.is_empty() {
            0.0
        } else {
            fills.iter().sum::<f64>() / fills.len() as f64
        };
        SnapshotData {
            snapshot_id: 0,
            timestamp: timestamp.to_string(),
            semester: "Spring 2026".to_string(),
            overall_fill,
            courses: course_map,
        }
    }

    #[test]
    fn no_baseline_reports_everything_as_new() {
        let current = snapshot("t1", vec![("CSCI 101", vec![section("1L", 10, 20)])]);
        let changes = diff(None, &current);

        assert_eq!(changes.new_courses.len(), 1);
        assert!(changes.removed_courses.is_empty());
        assert!(changes.changed_courses.is_empty());
        assert!(!changes.is_empty());
    }

    #[test]
    fn capacity_change_and_status_transition_are_reported() {
        let baseline = snapshot("t1", vec![("CSCI 101", vec![section("1L", 20, 20)])]);
        let current = snapshot(
            "t2",
            vec![
                ("CSCI 101", vec![section("1L", 20, 25)]),
                ("MATH 201", vec![section("1L", 10, 10)]),
            ],
        );

        let changes = diff(Some(&baseline), &current);

        assert_eq!(changes.new_courses.len(), 1);
        assert_eq!(changes.new_courses[0].course_code, "MATH 201");
        assert!(changes.removed_courses.is_empty());

        assert_eq!(changes.changed_courses.len(), 1);
        let detail = &changes.changed_courses[0];
        assert_eq!(detail.modified_sections.len(), 1);

        let change = &detail.modified_sections[0];
        assert!(change.capacity_changed());
        assert_eq!(change.previous_capacity, 20);
        assert_eq!(change.current_capacity, 25);
        assert_eq!(change.previous_status, Status::Full);
        assert_eq!(change.current_status, Status::Near);
        assert!(change.reopened());
        assert!(!change.filled_up());

        // Overall fill went from 1.0 to mean(0.8, 1.0) = 0.9.
        assert!((changes.overall_fill_delta() + 0.1).abs() < 1e-9);
    }

    #[test]
    fn unchanged_snapshots_produce_an_empty_change_set() {
        let baseline = snapshot("t1", vec![("CSCI 101", vec![section("1L", 10, 20)])]);
        let mut current = baseline.clone();
        current.timestamp = "t2".to_string();

        let changes = diff(Some(&baseline), &current);
        assert!(changes.is_empty());
    }

    #[test]
    fn added_and_removed_sections_mark_the_course_changed() {
        let baseline = snapshot(
            "t1",
            vec![("CSCI 101", vec![section("1L", 10, 20), section("1R", 5, 20)])],
        );
        let current = snapshot(
            "t2",
            vec![("CSCI 101", vec![section("1L", 10, 20), section("2L", 0, 20)])],
        );

        let changes = diff(Some(&baseline), &current);
        assert_eq!(changes.changed_courses.len(), 1);
        let detail = &changes.changed_courses[0];
        assert_eq!(detail.added_sections.len(), 1);
        assert_eq!(detail.added_sections[0].section_code, "2L");
        assert_eq!(detail.removed_sections.len(), 1);
        assert_eq!(detail.removed_sections[0].section_code, "1R");
    }
}
