use std::sync::Arc;
use std::time::Duration;

/// Fine-grained server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) read_buffer_size: usize,
    pub(crate) max_request_size: usize,
    pub(crate) idle_timeout: Duration,
    pub(crate) backlog: i32,
}

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            read_buffer_size: 16 * 1024,
            max_request_size: 10 * 1024 * 1024,
            idle_timeout: Duration::from_secs(75),
            backlog: 128,
        }
    }

    /// Initial per-connection parse buffer size; grows up to
    /// `max_request_size` as needed.
    pub fn read_buffer_size(&mut self, value: usize) -> &mut Self {
        self.read_buffer_size = value;
        self
    }

    pub fn max_request_size(&mut self, value: usize) -> &mut Self {
        self.max_request_size = value;
        self
    }

    /// Keep-alive connections idle longer than this should be closed by
    /// the caller's timeout wheel (the core has no built-in timers, §5).
    pub fn idle_timeout(&mut self, value: Duration) -> &mut Self {
        self.idle_timeout = value;
        self
    }

    pub fn backlog(&mut self, value: i32) -> &mut Self {
        self.backlog = value;
        self
    }

    /// Create an `Arc`'d config clone to pass to the constructor
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
