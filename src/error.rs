use thiserror::Error;

use crate::stream::message::ReplyKind;
use crate::stream::state::StreamState;
use crate::task::TaskId;
use crate::tls::TlsError;

#[derive(Error, Debug)]
pub enum SrunxError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Allocation rejected by control daemon: {0}")]
    RejectedAllocation(String),

    #[error("Allocation for task {task_id} still pending after {attempts} attempts")]
    AllocationTimedOut { task_id: TaskId, attempts: u32 },

    #[error("Invalid allocation detail: {0}")]
    InvalidAllocation(String),

    #[error("Protocol violation in {state} state: expected {}, got {actual}", join_kinds(.expected))]
    ProtocolViolation {
        state: StreamState,
        expected: &'static [ReplyKind],
        actual: ReplyKind,
    },

    #[error("Malformed reply from node daemon: {0}")]
    MalformedReply(String),

    #[error("Node daemon rejected {state}: {reason}")]
    RemoteRejection { state: StreamState, reason: String },

    #[error("Task stream closed by peer")]
    StreamClosed,

    #[error("Cancelled by shutdown request")]
    Cancelled,

    #[error("gRPC error: {0}")]
    GrpcError(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SrunxError>;

fn join_kinds(kinds: &[ReplyKind]) -> String {
    kinds
        .iter()
        .map(ReplyKind::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
