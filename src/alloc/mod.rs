//! Allocation acquisition against the control daemon.
//!
//! An interactive task is placed in two steps:
//!
//! 1. [`AllocationClient::allocate`] submits the request once. A refusal is
//!    final and surfaces as [`SrunxError::RejectedAllocation`](crate::error::SrunxError).
//! 2. [`AllocationClient::acquire`] polls the allocation detail until the
//!    daemon has a node to offer. A pending answer is the normal queued state
//!    and is retried according to the configured [`RetryPolicy`].

pub mod client;
pub mod retry;

pub use client::{AllocationClient, ControlPlane};
pub use retry::RetryPolicy;
