pub mod format;

pub use format::format_changes_report;
