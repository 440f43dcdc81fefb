//! Base URL Resolver: picks the origin an RPC client targets
use crate::context::{ContextProvider, ExecutionContext};

/// Port used when the server renders on a developer machine.
pub const DEFAULT_PORT: u16 = 3000;

/// Mount point of the RPC endpoint.
pub const RPC_ENDPOINT: &str = "/api/trpc";

/// Base URL for a context. The browser gets an empty base so requests
/// resolve against the page origin.
pub fn resolve_base_url(ctx: &ExecutionContext, default_port: u16) -> String {
    match ctx {
        ExecutionContext::Browser => String::new(),
        ExecutionContext::ServerRender { host } => format!("https://{}", host),
        ExecutionContext::LocalDev => format!("http://localhost:{}", default_port),
    }
}

/// Join a base URL (possibly empty) and an endpoint path.
pub fn endpoint_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub struct BaseUrlResolver<P> {
    provider: P,
    default_port: u16,
}

impl<P: ContextProvider> BaseUrlResolver<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            default_port: DEFAULT_PORT,
        }
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Detects the context afresh and resolves it.
    pub fn resolve(&self) -> String {
        let ctx = self.provider.detect();
        let base = resolve_base_url(&ctx, self.default_port);
        tracing::trace!(?ctx, %base, "resolved base url");
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContextProvider;

    #[test]
    fn test_browser_is_relative() {
        let resolver = BaseUrlResolver::new(StaticContextProvider(ExecutionContext::Browser));
        assert_eq!(resolver.resolve(), "");
    }

    #[test]
    fn test_server_render_uses_https_host() {
        let ctx = ExecutionContext::ServerRender { host: "kdx-git-main.vercel.app".to_string() };
        let resolver = BaseUrlResolver::new(StaticContextProvider(ctx));
        assert_eq!(resolver.resolve(), "https://kdx-git-main.vercel.app");
    }

    #[test]
    fn test_local_dev_uses_localhost() {
        let resolver = BaseUrlResolver::new(StaticContextProvider(ExecutionContext::LocalDev));
        assert_eq!(resolver.resolve(), "http://localhost:3000");

        let resolver = resolver.with_default_port(8080);
        assert_eq!(resolver.resolve(), "http://localhost:8080");
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("", RPC_ENDPOINT), "/api/trpc");
        assert_eq!(endpoint_url("http://localhost:3000/", RPC_ENDPOINT), "http://localhost:3000/api/trpc");
        assert_eq!(endpoint_url("https://a.b", "api/test"), "https://a.b/api/test");
    }
}
