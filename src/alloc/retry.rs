use std::time::Duration;

/// Polling policy for allocation detail queries.
///
/// The default polls every second with no attempt cap and no timeout, waiting
/// as long as the cluster needs to place the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
        }
    }

    /// Whether another attempt may follow `attempts` completed ones, `elapsed`
    /// after the first.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return false;
            }
        }
        if let Some(timeout) = self.timeout {
            if elapsed + self.interval > timeout {
                return false;
            }
        }
        true
    }
}
