//! Client configuration, read from the environment or built by hand
use std::sync::Arc;
use std::time::Duration;

use kdx_core::{
    endpoint_url, BaseUrlResolver, ContextProvider, DataTransformer, EnvContextProvider, KdxError,
    Mode, PlainJson, SuperJson, RPC_ENDPOINT,
};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerKind {
    SuperJson,
    PlainJson,
}

impl TransformerKind {
    pub fn build(self) -> Arc<dyn DataTransformer> {
        match self {
            TransformerKind::SuperJson => Arc::new(SuperJson),
            TransformerKind::PlainJson => Arc::new(PlainJson),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub mode: Mode,
    /// Origin the client targets; empty means "the page origin"
    pub base_url: String,
    pub endpoint_path: String,
    /// Needed when `base_url` is empty (browser context)
    pub page_origin: Option<Url>,
    pub max_batch_size: Option<usize>,
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
    pub transformer: TransformerKind,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            mode: Mode::build_default(),
            base_url: base_url.into(),
            endpoint_path: RPC_ENDPOINT.to_string(),
            page_origin: None,
            max_batch_size: None,
            timeout: None,
            headers: Vec::new(),
            transformer: TransformerKind::SuperJson,
        }
    }

    /// Base URL from `VERCEL_URL` / build target, mode from `NODE_ENV`.
    pub fn from_env() -> Self {
        Self::from_provider(EnvContextProvider::new()).with_mode(Mode::from_env())
    }

    pub fn from_provider<P: ContextProvider>(provider: P) -> Self {
        Self::new(BaseUrlResolver::new(provider).resolve())
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    pub fn with_page_origin(mut self, origin: Url) -> Self {
        self.page_origin = Some(origin);
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_transformer(mut self, kind: TransformerKind) -> Self {
        self.transformer = kind;
        self
    }

    /// Absolute endpoint URL. A relative base is joined to the page origin.
    pub fn endpoint(&self) -> Result<Url, KdxError> {
        let joined = endpoint_url(&self.base_url, &self.endpoint_path);
        if self.base_url.is_empty() {
            let origin = self.page_origin.as_ref().ok_or_else(|| {
                KdxError::Config(format!(
                    "relative endpoint {} needs a page origin",
                    joined
                ))
            })?;
            return origin
                .join(&joined)
                .map_err(|e| KdxError::Config(format!("invalid endpoint {}: {}", joined, e)));
        }
        Url::parse(&joined).map_err(|e| KdxError::Config(format!("invalid endpoint {}: {}", joined, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdx_core::{ExecutionContext, StaticContextProvider};

    #[test]
    fn test_from_provider_resolves_base() {
        let config = ClientConfig::from_provider(StaticContextProvider(ExecutionContext::LocalDev));
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.endpoint().unwrap().as_str(), "http://localhost:3000/api/trpc");
    }

    #[test]
    fn test_browser_needs_page_origin() {
        let config = ClientConfig::from_provider(StaticContextProvider(ExecutionContext::Browser));
        assert!(matches!(config.endpoint(), Err(KdxError::Config(_))));

        let config = config.with_page_origin(Url::parse("https://app.kodix.com.br/dashboard").unwrap());
        assert_eq!(config.endpoint().unwrap().as_str(), "https://app.kodix.com.br/api/trpc");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("https://kdx.vercel.app")
            .with_mode(Mode::Production)
            .with_max_batch_size(0)
            .with_header("x-trpc-source", "rust")
            .with_transformer(TransformerKind::PlainJson);
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.max_batch_size, Some(1));
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.transformer, TransformerKind::PlainJson);
    }
}
