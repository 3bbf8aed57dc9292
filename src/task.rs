//! Task-level value types shared by the allocation client and the stream engine.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Result, SrunxError};
use crate::proto::InteractiveTaskAllocationDetail;

/// Scheduler-assigned handle for an accepted allocation request.
pub type TaskId = u32;

/// Concrete placement of an interactive task: the node daemon to stream to and
/// the one-time resource handle proving the grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationDetail {
    pub addr: SocketAddrV4,
    pub resource_uuid: String,
}

impl AllocationDetail {
    pub fn new(addr: SocketAddrV4, resource_uuid: impl Into<String>) -> Self {
        Self {
            addr,
            resource_uuid: resource_uuid.into(),
        }
    }
}

impl TryFrom<InteractiveTaskAllocationDetail> for AllocationDetail {
    type Error = SrunxError;

    fn try_from(detail: InteractiveTaskAllocationDetail) -> Result<Self> {
        let ip: Ipv4Addr = detail.ipv4_addr.parse().map_err(|_| {
            SrunxError::InvalidAllocation(format!("bad IPv4 address {:?}", detail.ipv4_addr))
        })?;
        let port = u16::try_from(detail.port)
            .map_err(|_| SrunxError::InvalidAllocation(format!("bad port {}", detail.port)))?;

        Ok(Self {
            addr: SocketAddrV4::new(ip, port),
            resource_uuid: detail.resource_uuid,
        })
    }
}

/// Command to run on the allocated node: executable path plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub path: String,
    pub args: Vec<String>,
}

impl RemoteCommand {
    /// Build from an argv-style sequence. The first element is the executable.
    pub fn from_argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let path = argv
            .next()
            .filter(|p: &String| !p.is_empty())
            .ok_or_else(|| SrunxError::InvalidArgument("remote command is empty".to_string()))?;

        Ok(Self {
            path,
            args: argv.collect(),
        })
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How the remote task terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Normal(u32),
    Signal(u32),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Normal(code) => write!(f, "exited with value {}", code),
            ExitStatus::Signal(signum) => write!(f, "was killed by signal {}", signum),
        }
    }
}
