//! Test harness for client integration tests.
//!
//! Spawns scripted control and node daemons as real tonic servers on
//! ephemeral ports, and records what the client sent them.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::StreamExt;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use srunx::config::ClientConfig;
use srunx::proto::slurm_ctl_xd_server::{SlurmCtlXd, SlurmCtlXdServer};
use srunx::proto::slurm_xd_server::{SlurmXd, SlurmXdServer};
use srunx::proto::{
    AllocateInteractiveTaskReply, AllocateInteractiveTaskRequest, InteractiveTaskAllocationDetail,
    QueryInteractiveTaskAllocDetailReply, QueryInteractiveTaskAllocDetailRequest, TaskStreamReply,
    TaskStreamRequest,
};
use srunx::stream::{Reply, Request as StreamRequest};

pub const TASK_ID: u32 = 7;
pub const RESOURCE_UUID: &str = "abc";

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().expect("listener has an address");
    (listener, addr)
}

// ============================================================================
// Control daemon
// ============================================================================

/// Scripted control daemon behaviour.
#[derive(Clone)]
pub struct CtldScript {
    pub alloc: AllocateInteractiveTaskReply,
    /// Detail queries answered with `ok=false` before the placement is handed out.
    pub pending_polls: usize,
    pub detail: InteractiveTaskAllocationDetail,
}

impl CtldScript {
    /// Accept the request and place the task on `node` after `pending_polls` queries.
    pub fn placing_on(node: SocketAddr, pending_polls: usize) -> Self {
        Self {
            alloc: AllocateInteractiveTaskReply {
                ok: true,
                task_id: TASK_ID,
                reason: String::new(),
            },
            pending_polls,
            detail: InteractiveTaskAllocationDetail {
                ipv4_addr: node.ip().to_string(),
                port: u32::from(node.port()),
                resource_uuid: RESOURCE_UUID.to_string(),
            },
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            alloc: AllocateInteractiveTaskReply {
                ok: false,
                task_id: 0,
                reason: reason.to_string(),
            },
            pending_polls: 0,
            detail: InteractiveTaskAllocationDetail::default(),
        }
    }
}

#[derive(Clone)]
struct CtldService {
    script: CtldScript,
    alloc_calls: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

#[tonic::async_trait]
impl SlurmCtlXd for CtldService {
    async fn allocate_interactive_task(
        &self,
        _request: Request<AllocateInteractiveTaskRequest>,
    ) -> Result<Response<AllocateInteractiveTaskReply>, Status> {
        self.alloc_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::new(self.script.alloc.clone()))
    }

    async fn query_interactive_task_alloc_detail(
        &self,
        request: Request<QueryInteractiveTaskAllocDetailRequest>,
    ) -> Result<Response<QueryInteractiveTaskAllocDetailReply>, Status> {
        if request.into_inner().task_id != self.script.alloc.task_id {
            return Err(Status::not_found("unknown task"));
        }

        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        let reply = if seen < self.script.pending_polls {
            QueryInteractiveTaskAllocDetailReply {
                ok: false,
                detail: None,
            }
        } else {
            QueryInteractiveTaskAllocDetailReply {
                ok: true,
                detail: Some(self.script.detail.clone()),
            }
        };
        Ok(Response::new(reply))
    }
}

/// Handle to a running mock control daemon.
pub struct MockCtld {
    pub addr: SocketAddr,
    alloc_calls: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockCtld {
    pub async fn start(script: CtldScript) -> Self {
        let (listener, addr) = bind().await;
        let alloc_calls = Arc::new(AtomicUsize::new(0));
        let polls = Arc::new(AtomicUsize::new(0));
        let service = CtldService {
            script,
            alloc_calls: alloc_calls.clone(),
            polls: polls.clone(),
        };

        let handle = tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(SlurmCtlXdServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
            {
                tracing::error!("Mock control daemon error: {}", e);
            }
        });

        Self {
            addr,
            alloc_calls,
            polls,
            handle,
        }
    }

    pub fn alloc_calls(&self) -> usize {
        self.alloc_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Drop for MockCtld {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Node daemon
// ============================================================================

/// Scripted node daemon behaviour. Each request kind is answered with the
/// listed replies, in order.
#[derive(Clone)]
pub struct NodeScript {
    pub negotiation: Vec<Reply>,
    pub check_resource: Vec<Reply>,
    pub on_exec: Vec<Reply>,
    pub on_signal: Vec<Reply>,
}

impl Default for NodeScript {
    fn default() -> Self {
        Self {
            negotiation: vec![Reply::ok()],
            check_resource: vec![Reply::ok()],
            on_exec: Vec::new(),
            on_signal: Vec::new(),
        }
    }
}

impl NodeScript {
    /// Run a task that prints `output` and exits with `code`.
    pub fn printing(output: &[u8], code: u32) -> Self {
        Self {
            on_exec: vec![
                Reply::ok(),
                Reply::IoRedirection(output.to_vec()),
                Reply::ExitStatus(srunx::task::ExitStatus::Normal(code)),
            ],
            ..Self::default()
        }
    }
}

type ReplyStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<TaskStreamReply, Status>> + Send>>;

#[derive(Clone)]
struct NodeService {
    script: NodeScript,
    received: Arc<Mutex<Vec<StreamRequest>>>,
    inbound_closed: Arc<AtomicBool>,
    streams: Arc<AtomicUsize>,
}

impl NodeService {
    fn replies_for(&self, request: &StreamRequest) -> Vec<Reply> {
        match request {
            StreamRequest::Negotiation { .. } => self.script.negotiation.clone(),
            StreamRequest::CheckResource { .. } => self.script.check_resource.clone(),
            StreamRequest::ExecutiveInfo(_) => self.script.on_exec.clone(),
            StreamRequest::Signal { .. } => self.script.on_signal.clone(),
        }
    }
}

#[tonic::async_trait]
impl SlurmXd for NodeService {
    type TaskStreamStream = ReplyStream;

    async fn task_stream(
        &self,
        request: Request<Streaming<TaskStreamRequest>>,
    ) -> Result<Response<Self::TaskStreamStream>, Status> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(32);
        let service = self.clone();

        tokio::spawn(async move {
            while let Some(Ok(raw)) = inbound.next().await {
                let Ok(request) = StreamRequest::try_from(raw) else {
                    break;
                };
                let replies = service.replies_for(&request);
                service
                    .received
                    .lock()
                    .expect("received lock")
                    .push(request);

                for reply in replies {
                    // The client may already be gone; keep draining inbound.
                    let _ = tx.send(Ok(TaskStreamReply::from(reply))).await;
                }
            }
            service.inbound_closed.store(true, Ordering::SeqCst);
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Handle to a running mock node daemon.
pub struct MockNode {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<StreamRequest>>>,
    inbound_closed: Arc<AtomicBool>,
    streams: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockNode {
    pub async fn start(script: NodeScript) -> Self {
        let (listener, addr) = bind().await;
        let service = NodeService {
            script,
            received: Arc::new(Mutex::new(Vec::new())),
            inbound_closed: Arc::new(AtomicBool::new(false)),
            streams: Arc::new(AtomicUsize::new(0)),
        };
        let received = service.received.clone();
        let inbound_closed = service.inbound_closed.clone();
        let streams = service.streams.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = Server::builder()
                .add_service(SlurmXdServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
            {
                tracing::error!("Mock node daemon error: {}", e);
            }
        });

        Self {
            addr,
            received,
            inbound_closed,
            streams,
            handle,
        }
    }

    /// Requests received so far, in arrival order.
    pub fn received(&self) -> Vec<StreamRequest> {
        self.received.lock().expect("received lock").clone()
    }

    pub fn signals(&self) -> usize {
        self.received()
            .iter()
            .filter(|r| matches!(r, StreamRequest::Signal { .. }))
            .count()
    }

    /// Whether the client closed its side of the task stream.
    pub fn inbound_closed(&self) -> bool {
        self.inbound_closed.load(Ordering::SeqCst)
    }

    pub fn streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client configuration aimed at `ctld` with a fast polling cadence.
pub fn fast_config(ctld: &MockCtld) -> ClientConfig {
    ClientConfig::new(ctld.addr.to_string()).with_poll_interval(Duration::from_millis(10))
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}
