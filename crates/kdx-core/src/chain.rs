//! Link Chain: runs every operation through an ordered list of links
use std::sync::Arc;

use crate::data_model::{Operation, OperationResult};
use crate::error::KdxError;
use crate::link::{Link, Next};

#[derive(Clone)]
pub struct LinkChain {
    links: Vec<Arc<dyn Link>>,
    chain_id: String,
}

impl LinkChain {
    /// Links closer to the caller come first. The last link, and only the
    /// last, must be terminating.
    pub fn new(links: Vec<Arc<dyn Link>>) -> Result<Self, KdxError> {
        let Some(last) = links.last() else {
            return Err(KdxError::Chain("a link chain needs at least one link".to_string()));
        };
        if !last.terminating() {
            return Err(KdxError::Chain(format!(
                "last link '{}' does not terminate the chain",
                last.id()
            )));
        }
        if let Some(early) = links[..links.len() - 1].iter().find(|l| l.terminating()) {
            return Err(KdxError::Chain(format!(
                "terminating link '{}' is followed by other links",
                early.id()
            )));
        }

        let chain_id = links.iter().map(|l| l.id()).collect::<Vec<_>>().join("→");

        Ok(Self { links, chain_id })
    }

    pub async fn execute(&self, op: Operation) -> OperationResult {
        Next::new(&self.links).run(op).await
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }
}

impl std::fmt::Debug for LinkChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkChain").field("chain_id", &self.chain_id).finish()
    }
}
