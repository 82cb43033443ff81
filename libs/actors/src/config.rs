//! Actor Context Configuration

use std::time::Duration;

/// Calls running longer than this are reported
pub const DEFAULT_CALL_TIMEOUT_THRESHOLD: Duration = Duration::from_secs(60);
/// Longest message representation written to a diagnostic
pub const DEFAULT_MAX_REPR_LEN: usize = 500;

/// Call diagnostics settings
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Log calls exceeding this duration; `None` disables the diagnostic.
    /// The call itself is never aborted.
    pub call_timeout_threshold: Option<Duration>,
    /// Fail waiting sends back into the current call chain
    pub detect_cycle_send: bool,
    /// Truncation length of message representations in logs
    pub max_repr_len: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            call_timeout_threshold: Some(DEFAULT_CALL_TIMEOUT_THRESHOLD),
            detect_cycle_send: true,
            max_repr_len: DEFAULT_MAX_REPR_LEN,
        }
    }
}

impl ContextConfig {
    pub fn with_call_timeout_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.call_timeout_threshold = threshold;
        self
    }

    pub fn with_detect_cycle_send(mut self, enabled: bool) -> Self {
        self.detect_cycle_send = enabled;
        self
    }

    pub fn with_max_repr_len(mut self, len: usize) -> Self {
        self.max_repr_len = len;
        self
    }
}
