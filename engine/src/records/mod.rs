//! Test-case records and the edit round-trip.
//!
//! Records are generated by the model, flattened into an editable view, edited
//! out-of-band as deltas against a versioned snapshot, reconciled, and finally
//! normalized back into the canonical schema.

pub mod delta;
pub mod normalize;
pub mod types;

pub use delta::{reconcile, Delta};
pub use normalize::{normalize, validate_collection, CollectionIssue};
pub use types::{editable_view, Record, RowMap, Snapshot, TestType};
