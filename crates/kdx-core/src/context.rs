//! Execution Context: where the caller runs, decided by an injected provider
use serde::{Deserialize, Serialize};

/// Environment variable carrying the deployment host (no scheme).
pub const DEPLOYMENT_HOST_VAR: &str = "VERCEL_URL";

/// Environment variable carrying the run mode.
pub const MODE_VAR: &str = "NODE_ENV";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionContext {
    /// Running inside a page; requests resolve against the page origin.
    Browser,
    /// Server-side rendering on a deployment with a known public host.
    ServerRender { host: String },
    /// Server-side rendering on a developer machine.
    LocalDev,
}

/// Source of the execution context. Implementations must be cheap; the
/// context is recomputed for every resolution.
pub trait ContextProvider: Send + Sync {
    fn detect(&self) -> ExecutionContext;
}

/// Always returns the same context.
#[derive(Debug, Clone)]
pub struct StaticContextProvider(pub ExecutionContext);

impl ContextProvider for StaticContextProvider {
    fn detect(&self) -> ExecutionContext {
        self.0.clone()
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the ambient signals: a browser build target and the deployment
/// host variable.
pub struct EnvContextProvider {
    browser: bool,
    lookup: Lookup,
}

impl EnvContextProvider {
    pub fn new() -> Self {
        Self {
            browser: cfg!(all(target_arch = "wasm32", target_os = "unknown")),
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup, e.g. with a fixed map in tests.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn with_browser(mut self, browser: bool) -> Self {
        self.browser = browser;
        self
    }
}

impl Default for EnvContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for EnvContextProvider {
    fn detect(&self) -> ExecutionContext {
        if self.browser {
            return ExecutionContext::Browser;
        }
        match (self.lookup)(DEPLOYMENT_HOST_VAR) {
            Some(host) if !host.trim().is_empty() => ExecutionContext::ServerRender {
                host: host.trim().to_string(),
            },
            _ => ExecutionContext::LocalDev,
        }
    }
}

/// Run mode, gating diagnostic verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
    Test,
}

impl Mode {
    /// Parse a mode value; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Mode::Development),
            "production" | "prod" => Some(Mode::Production),
            "test" => Some(Mode::Test),
            _ => None,
        }
    }

    /// `NODE_ENV`, falling back to the build profile.
    pub fn from_env() -> Self {
        std::env::var(MODE_VAR)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_else(Self::build_default)
    }

    pub fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    pub fn is_development(self) -> bool {
        self == Mode::Development
    }
}
