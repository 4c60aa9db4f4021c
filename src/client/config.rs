use std::sync::Arc;
use std::time::Duration;

/// Fine-grained client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) max_redirects: u32,
    pub(crate) enable_cookies: bool,
    pub(crate) read_buffer_size: usize,
    pub(crate) max_response_size: usize,
}

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            connect_timeout: Some(Duration::from_secs(10)),
            max_redirects: 5,
            enable_cookies: true,
            read_buffer_size: 16 * 1024,
            max_response_size: 10 * 1024 * 1024,
        }
    }

    /// Timeout for the synchronous connect (DNS + TCP handshake). `None`
    /// means block until the OS gives up.
    pub fn connect_timeout(&mut self, value: Option<Duration>) -> &mut Self {
        self.connect_timeout = value;
        self
    }

    /// Maximum number of redirects to follow before failing with
    /// `ClientRedirectLimit`.
    pub fn max_redirects(&mut self, value: u32) -> &mut Self {
        self.max_redirects = value;
        self
    }

    /// Whether to track `Set-Cookie` responses and attach `Cookie`
    /// headers on subsequent same-origin requests.
    pub fn enable_cookies(&mut self, value: bool) -> &mut Self {
        self.enable_cookies = value;
        self
    }

    /// Initial size of the response read buffer; it grows up to
    /// `max_response_size` as needed.
    pub fn read_buffer_size(&mut self, value: usize) -> &mut Self {
        self.read_buffer_size = value;
        self
    }

    pub fn max_response_size(&mut self, value: usize) -> &mut Self {
        self.max_response_size = value;
        self
    }

    /// Wrap in an `Arc` to hand to the constructor
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
