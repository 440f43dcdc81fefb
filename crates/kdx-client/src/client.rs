//! Typed client facade over a link chain
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kdx_core::{
    FromRich, IntoRich, KdxError, Link, LinkChain, Operation, OperationKind, Procedure,
};

use crate::batch::HttpBatchLink;
use crate::config::ClientConfig;
use crate::logger::LoggerLink;

/// Cheap to clone; build one per process and hand out clones.
#[derive(Clone, Debug)]
pub struct KdxClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    chain: LinkChain,
    next_id: AtomicU64,
}

impl KdxClient {
    /// The default pipeline: logger, then HTTP batching.
    pub fn new(config: ClientConfig) -> Result<Self, KdxError> {
        let links: Vec<Arc<dyn Link>> = vec![
            Arc::new(LoggerLink::for_mode(config.mode)),
            Arc::new(HttpBatchLink::new(&config)?),
        ];
        let chain = LinkChain::new(links)?;
        tracing::debug!(chain = chain.chain_id(), base_url = %config.base_url, "rpc client ready");
        Ok(Self::from_chain(chain))
    }

    /// A client over a custom chain.
    pub fn from_chain(chain: LinkChain) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                chain,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn chain(&self) -> &LinkChain {
        &self.inner.chain
    }

    /// Call any procedure of the contract.
    pub async fn call<P: Procedure>(&self, input: P::Input) -> Result<P::Output, KdxError> {
        let input = input.into_rich()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let op = Operation::new(id, P::KIND, P::PATH, input);
        let data = self.inner.chain.execute(op).await?;
        P::Output::from_rich(data)
    }

    pub async fn query<P: Procedure>(&self, input: P::Input) -> Result<P::Output, KdxError> {
        expect_kind::<P>(OperationKind::Query)?;
        self.call::<P>(input).await
    }

    pub async fn mutate<P: Procedure>(&self, input: P::Input) -> Result<P::Output, KdxError> {
        expect_kind::<P>(OperationKind::Mutation)?;
        self.call::<P>(input).await
    }
}

fn expect_kind<P: Procedure>(kind: OperationKind) -> Result<(), KdxError> {
    if P::KIND == kind {
        Ok(())
    } else {
        Err(KdxError::Chain(format!(
            "{} is a {}, not a {}",
            P::PATH,
            P::KIND,
            kind
        )))
    }
}
