//! KDX Client: the outbound RPC pipeline
//!
//! ```text
//! KdxClient::call::<P>  →  LoggerLink  →  HttpBatchLink  →  /api/trpc
//! ```
//!
//! Build one client per process:
//!
//! ```no_run
//! use kdx_client::{ClientConfig, KdxClient};
//!
//! let client = KdxClient::new(ClientConfig::from_env())?;
//! # Ok::<(), kdx_core::KdxError>(())
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod logger;

pub use batch::HttpBatchLink;
pub use client::KdxClient;
pub use config::{ClientConfig, TransformerKind};
pub use logger::{Direction, LogEvent, LoggerLink};
