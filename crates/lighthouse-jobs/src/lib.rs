//! Pipeline job records and the status reconciler.

pub mod job;
pub mod reconciler;
pub mod store;

pub use job::{
    label_value, JobSpec, JobState, JobStatus, LighthouseJob, Pull, Refs, EVENT_GUID_ANNOTATION,
};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use store::{JobEvent, JobStore, JobStoreError, JobWatch, MemoryJobStore};
