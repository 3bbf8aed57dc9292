use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Status;

use crate::alloc::RetryPolicy;
use crate::error::{Result, SrunxError};
use crate::proto::slurm_ctl_xd_client::SlurmCtlXdClient;
use crate::proto::{
    AllocateInteractiveTaskReply, AllocateInteractiveTaskRequest,
    QueryInteractiveTaskAllocDetailReply, QueryInteractiveTaskAllocDetailRequest,
};
use crate::resource::ResourceDescriptor;
use crate::task::{AllocationDetail, TaskId};

/// The two control daemon calls the allocation client depends on.
#[tonic::async_trait]
pub trait ControlPlane: Send {
    async fn allocate(
        &mut self,
        request: AllocateInteractiveTaskRequest,
    ) -> std::result::Result<AllocateInteractiveTaskReply, Status>;

    async fn query_detail(
        &mut self,
        request: QueryInteractiveTaskAllocDetailRequest,
    ) -> std::result::Result<QueryInteractiveTaskAllocDetailReply, Status>;
}

#[tonic::async_trait]
impl ControlPlane for SlurmCtlXdClient<Channel> {
    async fn allocate(
        &mut self,
        request: AllocateInteractiveTaskRequest,
    ) -> std::result::Result<AllocateInteractiveTaskReply, Status> {
        self.allocate_interactive_task(request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn query_detail(
        &mut self,
        request: QueryInteractiveTaskAllocDetailRequest,
    ) -> std::result::Result<QueryInteractiveTaskAllocDetailReply, Status> {
        self.query_interactive_task_alloc_detail(request)
            .await
            .map(tonic::Response::into_inner)
    }
}

pub struct AllocationClient<C> {
    control: C,
    retry: RetryPolicy,
}

impl AllocationClient<SlurmCtlXdClient<Channel>> {
    pub fn from_channel(channel: Channel, retry: RetryPolicy) -> Self {
        Self::new(SlurmCtlXdClient::new(channel), retry)
    }
}

impl<C: ControlPlane> AllocationClient<C> {
    pub fn new(control: C, retry: RetryPolicy) -> Self {
        Self { control, retry }
    }

    /// Submit an interactive allocation request.
    ///
    /// # Errors
    ///
    /// [`SrunxError::RejectedAllocation`] when the daemon declines the request,
    /// [`SrunxError::GrpcError`] when the call itself fails.
    pub async fn allocate(
        &mut self,
        resource: &ResourceDescriptor,
        time_limit_secs: u64,
    ) -> Result<TaskId> {
        let reply = self
            .control
            .allocate(AllocateInteractiveTaskRequest {
                partition_name: resource.partition_name.clone(),
                required_resources: Some(resource.to_proto()),
                time_limit_sec: time_limit_secs,
            })
            .await?;

        if !reply.ok {
            tracing::error!(reason = %reply.reason, "Error occurred while trying to allocate resource");
            return Err(SrunxError::RejectedAllocation(reply.reason));
        }

        tracing::info!(
            task_id = reply.task_id,
            partition = %resource.partition_name,
            "Allocation request accepted"
        );
        Ok(reply.task_id)
    }

    /// Ask for the placement of `task_id`. `Ok(None)` means the task is still
    /// queued and the caller should ask again later.
    pub async fn query_detail(&mut self, task_id: TaskId) -> Result<Option<AllocationDetail>> {
        let reply = self
            .control
            .query_detail(QueryInteractiveTaskAllocDetailRequest { task_id })
            .await?;

        if !reply.ok {
            return Ok(None);
        }

        let detail = reply.detail.ok_or_else(|| {
            SrunxError::InvalidAllocation("daemon reported ok without a detail".to_string())
        })?;
        AllocationDetail::try_from(detail).map(Some)
    }

    /// Poll until the control daemon places `task_id`, sleeping the policy
    /// interval between attempts.
    pub async fn acquire(
        &mut self,
        task_id: TaskId,
        shutdown: &CancellationToken,
    ) -> Result<AllocationDetail> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if let Some(detail) = self.query_detail(task_id).await? {
                tracing::info!(
                    task_id,
                    attempts,
                    node = %detail.addr,
                    "Allocation acquired"
                );
                return Ok(detail);
            }

            if !self.retry.allows_retry(attempts, started.elapsed()) {
                tracing::error!(task_id, attempts, "Gave up waiting for allocation");
                return Err(SrunxError::AllocationTimedOut { task_id, attempts });
            }

            tracing::debug!(task_id, attempts, "Allocation pending, retrying");
            tokio::select! {
                _ = shutdown.cancelled() => return Err(SrunxError::Cancelled),
                _ = sleep(self.retry.interval) => {}
            }
        }
    }

    /// Submit the request and wait for its placement.
    pub async fn allocate_and_acquire(
        &mut self,
        resource: &ResourceDescriptor,
        time_limit_secs: u64,
        shutdown: &CancellationToken,
    ) -> Result<(TaskId, AllocationDetail)> {
        let task_id = self.allocate(resource, time_limit_secs).await?;
        let detail = self.acquire(task_id, shutdown).await?;
        Ok((task_id, detail))
    }
}
