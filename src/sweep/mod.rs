//! The fetch → filter → delete pipeline.
//!
//! [`fetch_all`] walks the user's timeline page by page,
//! [`select_for_deletion`] applies the retention thresholds, and
//! [`delete_all`] removes the matches one request at a time.
//! [`SweepContext`] ties the three together for one run.

mod executor;
mod filter;
mod paginate;
mod policy;
mod run;

pub use executor::{DeletionReport, DeletionResult, delete_all};
pub use filter::select_for_deletion;
pub use paginate::fetch_all;
pub use policy::{RetentionPolicy, ThresholdForm, ValidationError};
pub use run::{SweepContext, SweepError};
