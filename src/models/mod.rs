pub mod change;
pub mod snapshot;
pub mod status;

pub use change::{ChangeSet, CourseChange, SectionChange, FILL_EPSILON};
pub use snapshot::{
    department_of, CourseState, SectionObservation, SectionState, SnapshotBatch, SnapshotData,
};
pub use status::{section_sort_key, SectionType, Status, NEAR_THRESHOLD};
