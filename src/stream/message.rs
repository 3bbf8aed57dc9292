//! Typed views of the task stream messages.
//!
//! The wire messages carry a `oneof` payload; the engine works on these enums
//! so every state matches replies exhaustively.

use std::fmt;

use crate::error::{Result, SrunxError};
use crate::proto::stream_reply_exit_status::ExitReason;
use crate::proto::{
    task_stream_reply, task_stream_request, StreamReplyExitStatus, StreamReplyIo,
    StreamReplyResult, StreamRequestCheckResource, StreamRequestExecutiveInfo,
    StreamRequestNegotiation, StreamRequestSignal, TaskStreamReply, TaskStreamRequest,
};
use crate::task::{ExitStatus, RemoteCommand, TaskId};

/// Client to node daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Negotiation { version: u32 },
    CheckResource { task_id: TaskId, resource_uuid: String },
    ExecutiveInfo(RemoteCommand),
    Signal { signum: i32 },
}

/// Node daemon to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer to a negotiation, resource check, or task creation.
    Result { ok: bool, reason: String },
    /// A chunk of task output.
    IoRedirection(Vec<u8>),
    /// Final message of a run.
    ExitStatus(ExitStatus),
}

/// Tag of a [`Reply`], used when reporting protocol violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Result,
    IoRedirection,
    ExitStatus,
}

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Result { .. } => ReplyKind::Result,
            Reply::IoRedirection(_) => ReplyKind::IoRedirection,
            Reply::ExitStatus(_) => ReplyKind::ExitStatus,
        }
    }

    pub fn ok() -> Self {
        Reply::Result {
            ok: true,
            reason: String::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Reply::Result {
            ok: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Result => "Result",
            ReplyKind::IoRedirection => "IoRedirection",
            ReplyKind::ExitStatus => "ExitStatus",
        };
        f.write_str(name)
    }
}

impl From<Request> for TaskStreamRequest {
    fn from(request: Request) -> Self {
        use task_stream_request::Payload;

        let payload = match request {
            Request::Negotiation { version } => {
                Payload::Negotiation(StreamRequestNegotiation { version })
            }
            Request::CheckResource {
                task_id,
                resource_uuid,
            } => Payload::CheckResource(StreamRequestCheckResource {
                task_id,
                resource_uuid,
            }),
            Request::ExecutiveInfo(command) => Payload::ExecInfo(StreamRequestExecutiveInfo {
                executive_path: command.path,
                arguments: command.args,
            }),
            Request::Signal { signum } => Payload::Signal(StreamRequestSignal { signum }),
        };

        TaskStreamRequest {
            payload: Some(payload),
        }
    }
}

impl TryFrom<TaskStreamRequest> for Request {
    type Error = SrunxError;

    fn try_from(request: TaskStreamRequest) -> Result<Self> {
        use task_stream_request::Payload;

        match request.payload {
            Some(Payload::Negotiation(n)) => Ok(Request::Negotiation { version: n.version }),
            Some(Payload::CheckResource(c)) => Ok(Request::CheckResource {
                task_id: c.task_id,
                resource_uuid: c.resource_uuid,
            }),
            Some(Payload::ExecInfo(e)) => Ok(Request::ExecutiveInfo(RemoteCommand {
                path: e.executive_path,
                args: e.arguments,
            })),
            Some(Payload::Signal(s)) => Ok(Request::Signal { signum: s.signum }),
            None => Err(SrunxError::MalformedReply(
                "request without payload".to_string(),
            )),
        }
    }
}

impl From<Reply> for TaskStreamReply {
    fn from(reply: Reply) -> Self {
        use task_stream_reply::Payload;

        let payload = match reply {
            Reply::Result { ok, reason } => Payload::Result(StreamReplyResult { ok, reason }),
            Reply::IoRedirection(buf) => Payload::Io(StreamReplyIo { buf }),
            Reply::ExitStatus(status) => {
                let (reason, value) = match status {
                    ExitStatus::Normal(code) => (ExitReason::Normal, code),
                    ExitStatus::Signal(signum) => (ExitReason::Signal, signum),
                };
                Payload::ExitStatus(StreamReplyExitStatus {
                    reason: reason as i32,
                    value,
                })
            }
        };

        TaskStreamReply {
            payload: Some(payload),
        }
    }
}

impl TryFrom<TaskStreamReply> for Reply {
    type Error = SrunxError;

    fn try_from(reply: TaskStreamReply) -> Result<Self> {
        use task_stream_reply::Payload;

        match reply.payload {
            Some(Payload::Result(r)) => Ok(Reply::Result {
                ok: r.ok,
                reason: r.reason,
            }),
            Some(Payload::Io(io)) => Ok(Reply::IoRedirection(io.buf)),
            Some(Payload::ExitStatus(status)) => match ExitReason::try_from(status.reason) {
                Ok(ExitReason::Normal) => Ok(Reply::ExitStatus(ExitStatus::Normal(status.value))),
                Ok(ExitReason::Signal) => Ok(Reply::ExitStatus(ExitStatus::Signal(status.value))),
                Err(_) => Err(SrunxError::MalformedReply(format!(
                    "unknown exit reason {}",
                    status.reason
                ))),
            },
            None => Err(SrunxError::MalformedReply(
                "reply without payload".to_string(),
            )),
        }
    }
}
