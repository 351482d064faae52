//! # fg-compute
//!
//! Execution backends and the result cache for fgrid.
//!
//! The [`Executor`] applies a pure function over the rows of a matrix in
//! one of three interchangeable modes: serial, a shared-memory thread
//! pool, or scatter/gather across a fixed group of cooperating processes
//! reached through the [`Communicator`] trait. Results always come back in
//! input order, whichever mode ran them.
//!
//! The [`Cache`] persists `(inputs, result)` triples for expensive matrix
//! computations and validates hits by exact element-wise comparison of the
//! stored inputs, never by checksum alone.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Exact-equality result cache.
pub mod cache;
/// Communicator trait, scatter/gather layout, distributed apply.
pub mod distributed;
/// Execution mode selection and the order-preserving apply contract.
pub mod executor;
/// Terminal progress reporting.
pub mod progress;

pub use cache::Cache;
pub use distributed::{distributed_apply, scatter_layout, Communicator, LocalCommunicator};
pub use executor::Executor;
pub use progress::Progress;
