//! One interactive run: allocate on the control daemon, then stream the
//! command to the node it hands out.

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::alloc::AllocationClient;
use crate::config::ClientConfig;
use crate::error::{Result, SrunxError};
use crate::grpc;
use crate::interrupt::InterruptContext;
use crate::resource::ResourceDescriptor;
use crate::stream::{TaskExecutor, TaskOutcome};
use crate::task::{AllocationDetail, RemoteCommand, TaskId};
use crate::tls::TlsIdentity;

pub struct Session {
    config: ClientConfig,
    tls: Option<TlsIdentity>,
    shutdown: CancellationToken,
}

impl Session {
    /// Build a session, loading TLS material when it is enabled.
    ///
    /// # Errors
    ///
    /// Fails when TLS is enabled but a path is missing or unreadable.
    pub async fn new(config: ClientConfig, shutdown: CancellationToken) -> Result<Self> {
        let tls = if config.tls.is_complete() {
            let identity = TlsIdentity::load(&config.tls).await?;
            tracing::info!("TLS enabled with mTLS authentication");
            Some(identity)
        } else if config.tls.enabled {
            return Err(SrunxError::InvalidArgument(
                "TLS enabled but missing required paths (--ca-cert, --cert, --key)".to_string(),
            ));
        } else {
            None
        };

        Ok(Self {
            config,
            tls,
            shutdown,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submit the allocation request and wait until the task is placed.
    pub async fn acquire(
        &self,
        resource: &ResourceDescriptor,
        time_limit_secs: u64,
    ) -> Result<(TaskId, AllocationDetail)> {
        let channel = grpc::connect(&self.config.ctld_addr, self.tls.as_ref()).await?;
        let mut client = AllocationClient::from_channel(channel, self.config.poll.clone());
        client
            .allocate_and_acquire(resource, time_limit_secs, &self.shutdown)
            .await
    }

    /// Stream `command` to the node in `detail`, relaying output into `output`.
    pub async fn execute<W>(
        &self,
        output: W,
        interrupts: InterruptContext,
        task_id: TaskId,
        detail: &AllocationDetail,
        command: &RemoteCommand,
    ) -> TaskOutcome
    where
        W: AsyncWrite + Unpin + Send,
    {
        tracing::info!(task_id, node = %detail.addr, command = %command, "Dispatching task");
        let mut executor = TaskExecutor::new(output, interrupts, self.shutdown.clone())
            .with_protocol_version(self.config.protocol_version)
            .with_forward_signal(self.config.forward_signal)
            .with_tls(self.tls.clone());
        executor.run(task_id, detail, command).await
    }
}
