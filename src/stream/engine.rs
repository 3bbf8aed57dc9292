use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::config::{DEFAULT_FORWARD_SIGNAL, PROTOCOL_VERSION};
use crate::error::{Result, SrunxError};
use crate::grpc;
use crate::interrupt::InterruptContext;
use crate::proto::slurm_xd_client::SlurmXdClient;
use crate::proto::{TaskStreamReply, TaskStreamRequest};
use crate::stream::message::{Reply, ReplyKind, Request};
use crate::stream::state::StreamState;
use crate::task::{AllocationDetail, ExitStatus, RemoteCommand, TaskId};
use crate::tls::TlsIdentity;

const REQUEST_BUFFER: usize = 8;

/// Final result of one task stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The daemon reported how the task ended.
    Finished(ExitStatus),
    /// The stream was abandoned before an exit status arrived.
    Aborted,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Finished(_))
    }
}

/// Write half of the task stream. Dropping the sender ends the request stream.
struct StreamWriter {
    tx: Option<mpsc::Sender<TaskStreamRequest>>,
}

impl StreamWriter {
    async fn send(&mut self, request: Request) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(SrunxError::StreamClosed)?;
        tracing::trace!(request = ?request, "Sending");
        tx.send(request.into())
            .await
            .map_err(|_| SrunxError::StreamClosed)
    }

    fn complete(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!("Closed write side of task stream");
        }
    }
}

struct ReplyReader<S> {
    replies: S,
}

impl<S> ReplyReader<S>
where
    S: Stream<Item = std::result::Result<TaskStreamReply, Status>> + Unpin,
{
    async fn next(&mut self) -> Result<Reply> {
        match self.replies.next().await {
            Some(Ok(reply)) => Reply::try_from(reply),
            Some(Err(status)) => Err(SrunxError::GrpcError(status)),
            None => Err(SrunxError::StreamClosed),
        }
    }
}

fn violation(state: StreamState, expected: &'static [ReplyKind], got: &Reply) -> SrunxError {
    SrunxError::ProtocolViolation {
        state,
        expected,
        actual: got.kind(),
    }
}

/// Accept only a successful `Result` reply in `state`.
fn expect_ok(state: StreamState, reply: Reply) -> Result<()> {
    match reply {
        Reply::Result { ok: true, .. } => Ok(()),
        Reply::Result { ok: false, reason } => Err(SrunxError::RemoteRejection { state, reason }),
        other => Err(violation(state, &[ReplyKind::Result], &other)),
    }
}

/// Drives one task over a stream to its node daemon.
///
/// Output chunks are written to `W` as they arrive; the CLI uses stdout.
pub struct TaskExecutor<W> {
    output: W,
    interrupts: InterruptContext,
    shutdown: CancellationToken,
    protocol_version: u32,
    forward_signal: i32,
    tls: Option<TlsIdentity>,
}

impl<W> TaskExecutor<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(output: W, interrupts: InterruptContext, shutdown: CancellationToken) -> Self {
        Self {
            output,
            interrupts,
            shutdown,
            protocol_version: PROTOCOL_VERSION,
            forward_signal: DEFAULT_FORWARD_SIGNAL,
            tls: None,
        }
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_forward_signal(mut self, signum: i32) -> Self {
        self.forward_signal = signum;
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsIdentity>) -> Self {
        self.tls = tls;
        self
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Run `command` on the allocated node. Returns `true` when the task ran
    /// and reported an exit status, `false` on any abort.
    pub async fn execute_task(
        &mut self,
        task_id: TaskId,
        detail: &AllocationDetail,
        command: &RemoteCommand,
    ) -> bool {
        self.run(task_id, detail, command).await.is_success()
    }

    /// Connect to the node daemon in `detail` and drive the task stream.
    pub async fn run(
        &mut self,
        task_id: TaskId,
        detail: &AllocationDetail,
        command: &RemoteCommand,
    ) -> TaskOutcome {
        let channel = match grpc::connect(&detail.addr.to_string(), self.tls.as_ref()).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(task_id, node = %detail.addr, error = %e, "Failed to connect to node daemon");
                return TaskOutcome::Aborted;
            }
        };

        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let mut client = SlurmXdClient::new(channel);
        let replies = match client.task_stream(ReceiverStream::new(rx)).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                tracing::error!(task_id, node = %detail.addr, error = %status, "Failed to open task stream");
                return TaskOutcome::Aborted;
            }
        };

        self.drive(task_id, detail, command, tx, replies).await
    }

    /// Drive the state machine over an already opened stream.
    ///
    /// `requests` must be the only sender feeding the request stream: the
    /// terminal states drop it to close the client's write side.
    pub async fn drive<S>(
        &mut self,
        task_id: TaskId,
        detail: &AllocationDetail,
        command: &RemoteCommand,
        requests: mpsc::Sender<TaskStreamRequest>,
        replies: S,
    ) -> TaskOutcome
    where
        S: Stream<Item = std::result::Result<TaskStreamReply, Status>> + Unpin,
    {
        if self.interrupts.discard() {
            tracing::info!(task_id, "Interrupt received before the task stream opened, ignored");
        }
        self.interrupts.reset();
        let mut writer = StreamWriter { tx: Some(requests) };
        let mut reader = ReplyReader { replies };
        let mut state = StreamState::Negotiation;
        let mut exit_status = None;

        loop {
            tracing::debug!(task_id, state = %state, "Entering state");

            let step = match state {
                StreamState::Negotiation => self
                    .negotiate(&mut writer, &mut reader)
                    .await
                    .map(|()| StreamState::CheckResource),
                StreamState::CheckResource => self
                    .check_resource(task_id, detail, &mut writer, &mut reader)
                    .await
                    .map(|()| StreamState::ExecutiveInfo),
                StreamState::ExecutiveInfo => writer
                    .send(Request::ExecutiveInfo(command.clone()))
                    .await
                    .map(|()| StreamState::Running),
                StreamState::Running => {
                    self.run_task(task_id, &mut writer, &mut reader)
                        .await
                        .map(|status| {
                            exit_status = Some(status);
                            StreamState::Finish
                        })
                }
                StreamState::Abort => {
                    writer.complete();
                    return TaskOutcome::Aborted;
                }
                StreamState::Finish => {
                    writer.complete();
                    return exit_status.map_or(TaskOutcome::Aborted, TaskOutcome::Finished);
                }
            };

            state = match step {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(task_id, state = %state, error = %e, "Aborting task stream");
                    StreamState::Abort
                }
            };
        }
    }

    async fn negotiate<S>(
        &self,
        writer: &mut StreamWriter,
        reader: &mut ReplyReader<S>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<TaskStreamReply, Status>> + Unpin,
    {
        writer
            .send(Request::Negotiation {
                version: self.protocol_version,
            })
            .await?;
        expect_ok(StreamState::Negotiation, reader.next().await?)
    }

    async fn check_resource<S>(
        &self,
        task_id: TaskId,
        detail: &AllocationDetail,
        writer: &mut StreamWriter,
        reader: &mut ReplyReader<S>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<TaskStreamReply, Status>> + Unpin,
    {
        writer
            .send(Request::CheckResource {
                task_id,
                resource_uuid: detail.resource_uuid.clone(),
            })
            .await?;
        expect_ok(StreamState::CheckResource, reader.next().await?)
    }

    /// Relay the running task until it reports an exit status.
    ///
    /// Output and the task confirmation may arrive in either order; the exit
    /// status is always last. An interrupt is forwarded only once the daemon has
    /// confirmed the task, and only one forwarded signal is outstanding at a time.
    /// Interrupts are polled ahead of replies so a stream of output cannot
    /// starve them.
    async fn run_task<S>(
        &mut self,
        task_id: TaskId,
        writer: &mut StreamWriter,
        reader: &mut ReplyReader<S>,
    ) -> Result<ExitStatus>
    where
        S: Stream<Item = std::result::Result<TaskStreamReply, Status>> + Unpin,
    {
        let mut task_is_running = false;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return Err(SrunxError::Cancelled),

                _ = self.interrupts.interrupted() => {
                    if task_is_running {
                        self.interrupts.begin_forward();
                        tracing::info!(task_id, signum = self.forward_signal, "Forwarding interrupt to task");
                        writer
                            .send(Request::Signal {
                                signum: self.forward_signal,
                            })
                            .await?;
                    } else {
                        tracing::info!(task_id, "Task not confirmed running yet, interrupt ignored");
                    }
                }

                reply = reader.next() => match reply? {
                    Reply::IoRedirection(buf) => self.relay(&buf).await,
                    Reply::Result { ok: true, .. } => {
                        if !task_is_running {
                            tracing::info!(task_id, "Task is running");
                            if self.interrupts.discard() {
                                tracing::info!(task_id, "Interrupt received before task confirmation, ignored");
                            }
                        }
                        task_is_running = true;
                        self.interrupts.end_forward();
                    }
                    Reply::Result { ok: false, reason } => {
                        return Err(SrunxError::RemoteRejection {
                            state: StreamState::Running,
                            reason,
                        });
                    }
                    Reply::ExitStatus(status) => {
                        tracing::info!(task_id, "Task {}", status);
                        return Ok(status);
                    }
                },
            }
        }
    }

    async fn relay(&mut self, buf: &[u8]) {
        if let Err(e) = self.output.write_all(buf).await {
            tracing::warn!(error = %e, "Failed to write task output");
            return;
        }
        if let Err(e) = self.output.flush().await {
            tracing::warn!(error = %e, "Failed to flush task output");
        }
    }
}
