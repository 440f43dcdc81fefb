//! Server configuration from the environment
use kdx_core::Mode;

/// Listen address variable; defaults to [`DEFAULT_ADDR`].
pub const ADDR_VAR: &str = "KDX_ADDR";
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub mode: Mode,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var(ADDR_VAR).unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            mode: Mode::from_env(),
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            mode: Mode::build_default(),
        }
    }
}
