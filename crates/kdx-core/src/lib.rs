//! KDX Core: Link Trait, Chain, Contract and Data Model
//!
//! Network-free building blocks shared by the RPC client and server.

pub mod base_url;
pub mod chain;
pub mod context;
pub mod data_model;
pub mod error;
pub mod link;
pub mod procedure;
pub mod transformer;

pub use base_url::{endpoint_url, resolve_base_url, BaseUrlResolver, DEFAULT_PORT, RPC_ENDPOINT};
pub use chain::LinkChain;
pub use context::{ContextProvider, EnvContextProvider, ExecutionContext, Mode, StaticContextProvider};
pub use data_model::{Operation, OperationKind, OperationResult, RichValue};
pub use error::{ErrorCode, KdxError, RpcError};
pub use link::{Link, Next};
pub use procedure::{FromRich, IntoRich, Json, Procedure};
pub use transformer::{take_field, DataTransformer, PlainJson, SuperJson};

/// KDX RPC engine version
pub const KDX_VERSION: &str = "1.0.0";
