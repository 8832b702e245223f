use serde::{Deserialize, Serialize};

/// Configuration of the hosted runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Notifications processed concurrently
    /// Default: 16
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Buffered notifications before senders wait
    /// Default: 1024
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
