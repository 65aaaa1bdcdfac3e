/// Port the receiver's HTTP control service listens on
pub const DEFAULT_PORT: u16 = 7000;

/// Client identification sent on every request
pub const DEFAULT_USER_AGENT: &str = "iTunes/11.0.2";

/// Configuration for client behavior
///
/// There is deliberately no timeout: a request to an unresponsive device
/// waits until the caller gives up on the future.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control port on the device (default: 7000)
    pub port: u16,

    /// `User-Agent` header value (default: `iTunes/11.0.2`)
    pub user_agent: String,

    /// Largest response or event body accepted (default: 16 MiB)
    pub max_body_size: usize,

    /// Buffered events per async subscriber before it lags (default: 100)
    pub event_capacity: usize,

    /// Enable debug logging of protocol messages
    pub debug_protocol: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_size: 16 * 1024 * 1024,
            event_capacity: 100,
            debug_protocol: false,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for `ClientConfig`
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the device control port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Override the `User-Agent` header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set the body size limit
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the per-subscriber event buffer
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Enable protocol debug logging
    #[must_use]
    pub fn debug_protocol(mut self, enable: bool) -> Self {
        self.config.debug_protocol = enable;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
