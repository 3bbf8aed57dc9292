//! Client side of the task stream with the node daemon.
//!
//! One bidirectional stream carries a whole task execution. The client walks
//! a fixed sequence of states:
//!
//! ```text
//! Negotiation -> CheckResource -> ExecutiveInfo -> Running -> Finish
//!      |              |                               |
//!      +--------------+-------------> Abort <---------+
//! ```
//!
//! - **Negotiation** / **CheckResource**: send one request, await one `Result`.
//! - **ExecutiveInfo**: send the command, no reply awaited.
//! - **Running**: relay output, watch for the task confirmation, forward user
//!   interrupts as signals, stop on the exit status.
//!
//! Both terminal states close the client's write side before returning.

pub mod engine;
pub mod message;
pub mod state;

pub use engine::{TaskExecutor, TaskOutcome};
pub use message::{Reply, ReplyKind, Request};
pub use state::StreamState;
