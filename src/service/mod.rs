pub mod batch;
pub mod polling;
pub mod reconcile;

pub use batch::{BatchEvent, BatchJobSubmitter, Selection};
pub use polling::{
    DocumentSource, PollingReconciler, ReconcileEvent, ReconcilerState, ReconcilerStatus,
    SnapshotSource, StopPolicy, StopReason, TargetSelector,
};
pub use reconcile::{DocumentChange, Reconciliation, reconcile};
