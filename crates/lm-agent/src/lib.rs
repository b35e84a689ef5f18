//! Cluster-side reconciliation agent: license-server adapters, the workload-scheduler
//! queue reader, the booking grace-time sweep and the reconciliation cycle that ties
//! them together (spec.md §4.2-§4.4).

pub mod adapters;
pub mod booking;
pub mod queue;
pub mod reconcile;
pub mod server;
