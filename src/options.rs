//! Session configuration.

use crate::constants::DEFAULT_BUFFER_SIZE;

/// Configuration for a write session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Capacity of the buffered writer over the main file handle.
    pub buffer_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// What happens to the remaining rehydration tasks once one of them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the remaining tasks and wait until each one has stopped before
    /// reporting. Objects that finished in the meantime are reported through
    /// [`TaskListener::on_discarded`](crate::TaskListener::on_discarded) and
    /// dropped, so no rehydration outlives the failed restore.
    #[default]
    Drain,
    /// Abort the remaining tasks and report immediately. Tasks that are past
    /// their last await point still run to completion in the background, and
    /// their objects are dropped unreported.
    Abandon,
}

/// Configuration for a restore session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOptions {
    /// Handling of in-flight rehydrations after the first failure.
    pub failure_policy: FailurePolicy,
}

impl RestoreOptions {
    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}
