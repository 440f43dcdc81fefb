//! Link Trait: one interceptor stage of the outbound pipeline
use async_trait::async_trait;
use std::sync::Arc;

use crate::data_model::{Operation, OperationResult};
use crate::error::KdxError;

/// A request/response interceptor.
///
/// A forwarding link hands the operation to `next` and may look at the
/// result on the way back. A terminating link performs the call itself and
/// never touches `next`; it must be the last link of a chain.
#[async_trait]
pub trait Link: Send + Sync {
    /// Short identifier (ex: "logger", "httpBatch")
    fn id(&self) -> &'static str;

    /// Whether this link ends the chain (default: false)
    fn terminating(&self) -> bool {
        false
    }

    async fn handle(&self, op: Operation, next: Next<'_>) -> OperationResult;
}

/// The remainder of a chain, as seen from inside a link.
pub struct Next<'a> {
    links: &'a [Arc<dyn Link>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(links: &'a [Arc<dyn Link>]) -> Self {
        Self { links }
    }

    /// Number of links still ahead.
    pub fn remaining(&self) -> usize {
        self.links.len()
    }

    pub async fn run(self, op: Operation) -> OperationResult {
        match self.links.split_first() {
            Some((link, rest)) => link.handle(op, Next::new(rest)).await,
            None => Err(KdxError::Chain(format!(
                "operation #{} ({}) ran past the last link",
                op.id, op.path
            ))),
        }
    }
}
