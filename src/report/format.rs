use std::collections::BTreeSet;

use crate::models::{
    section_sort_key, ChangeSet, CourseState, SectionChange, SectionState, SnapshotData,
    NEAR_THRESHOLD,
};

/// Overall/average fill swings above this get the 🔺 marker.
const SIGNIFICANT_CHANGE_THRESHOLD: f64 = 0.15;

fn pct(fill: f64) -> String {
    format!("{:.0}%", fill * 100.0)
}

fn delta_str(delta: f64) -> String {
    if delta.abs() > SIGNIFICANT_CHANGE_THRESHOLD {
        format!("🔺{:+.0}%", delta * 100.0)
    } else {
        format!("{:+.0}%", delta * 100.0)
    }
}

fn fill_emoji(fill: f64) -> &'static str {
    if fill >= 1.0 {
        "🔴"
    } else if fill >= NEAR_THRESHOLD {
        "🟠"
    } else {
        "🟢"
    }
}

fn course_emoji(course: &CourseState) -> &'static str {
    if course.is_filled() {
        "🔴"
    } else {
        fill_emoji(course.average_fill)
    }
}

fn sorted_sections(sections: &[SectionState]) -> Vec<&SectionState> {
    let mut sorted: Vec<&SectionState> = sections.iter().collect();
    sorted.sort_by_key(|s| section_sort_key(&s.section_code, s.section_type));
    sorted
}

fn section_line(section: &SectionState, suffix: &str) -> String {
    format!(
        "  {} {:<4}: {:>3}/{}{}",
        fill_emoji(section.fill),
        section.section_code,
        section.enrollment,
        section.capacity,
        suffix
    )
}

fn modified_line(change: &SectionChange) -> String {
    let marker = if change.filled_up() {
        " 🔒 filled"
    } else if change.reopened() {
        " 🔓 reopened"
    } else {
        ""
    };
    format!(
        "  {} {:<4}: {:>3}/{} ({:+}){}",
        fill_emoji(change.current_fill),
        change.section_code,
        change.current_enrollment,
        change.current_capacity,
        change.enrollment_delta(),
        marker
    )
}

/// Render a change-set into the compact text report that goes out over the
/// notification channel.
pub fn format_changes_report(changes: &ChangeSet, current: &SnapshotData) -> String {
    let mut lines = Vec::new();

    let header_delta = match changes.baseline_timestamp {
        Some(_) => format!("({})", delta_str(changes.overall_fill_delta())),
        None => "(first snapshot)".to_string(),
    };
    lines.push(format!(
        "📅 {} | 📈 {} {}",
        changes.current_timestamp,
        pct(changes.current_overall_fill),
        header_delta
    ));
    lines.push(String::new());

    let mut course_codes: BTreeSet<&str> = BTreeSet::new();
    course_codes.extend(changes.new_courses.iter().map(|c| c.course_code.as_str()));
    course_codes.extend(changes.removed_courses.iter().map(|c| c.course_code.as_str()));
    course_codes.extend(changes.changed_courses.iter().map(|c| c.course_code.as_str()));

    if course_codes.is_empty() {
        lines.push("No significant changes detected.".to_string());
        return lines.join("\n");
    }

    for code in course_codes {
        if let Some(course) = changes.new_courses.iter().find(|c| c.course_code == code) {
            lines.push(format!("✨ {} {} (NEW)", code, pct(course.average_fill)));
            let sections: Vec<SectionState> = course.sections.values().cloned().collect();
            for section in sorted_sections(&sections) {
                lines.push(section_line(section, ""));
            }
        } else if let Some(course) = changes
            .removed_courses
            .iter()
            .find(|c| c.course_code == code)
        {
            lines.push(format!(
                "❌ {} (REMOVED) was {}",
                code,
                pct(course.average_fill)
            ));
        } else if let Some(detail) = changes
            .changed_courses
            .iter()
            .find(|c| c.course_code == code)
        {
            let emoji = current
                .courses
                .get(code)
                .map(course_emoji)
                .unwrap_or_else(|| fill_emoji(detail.current_average_fill));
            let avg_delta = detail.current_average_fill - detail.previous_average_fill;
            lines.push(format!(
                "{} {} {} ({})",
                emoji,
                code,
                pct(detail.current_average_fill),
                delta_str(avg_delta)
            ));

            for section in sorted_sections(&detail.added_sections) {
                lines.push(section_line(section, " (NEW)"));
            }
            for section in sorted_sections(&detail.removed_sections) {
                lines.push(format!("  ❌ {:<4}: (REMOVED)", section.section_code));
            }

            let mut modified: Vec<&SectionChange> = detail.modified_sections.iter().collect();
            modified.sort_by_key(|m| {
                let section_type = current
                    .courses
                    .get(code)
                    .and_then(|c| c.sections.get(&m.section_code))
                    .map(|s| s.section_type)
                    .unwrap_or(crate::models::SectionType::Other);
                section_sort_key(&m.section_code, section_type)
            });
            for change in modified {
                lines.push(modified_line(change));
            }
        }

        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}
