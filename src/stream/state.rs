use std::fmt;

/// Client state while driving one task stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Negotiation,
    CheckResource,
    ExecutiveInfo,
    Running,
    Abort,
    Finish,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Negotiation => "Negotiation",
            StreamState::CheckResource => "CheckResource",
            StreamState::ExecutiveInfo => "ExecutiveInfo",
            StreamState::Running => "Running",
            StreamState::Abort => "Abort",
            StreamState::Finish => "Finish",
        };
        f.write_str(name)
    }
}
