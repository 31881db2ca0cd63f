//! Peaceful Pie client library
//!
//! Drive a running simulation from a trainer or script over JSON-RPC:
//!
//! - `rpc` - client, transport, retry policy and local server supervision
//! - `schema` / `codec` - self-describing result schemas and argument encoding
//! - `config` - endpoint and retry configuration
//! - `diagnostics` - timestamped log of unexpected call failures
//! - `models` - records shared with the simulation
//!
//! ```ignore
//! use peaceful_pie::{ClientConfig, RpcClient};
//! use peaceful_pie::models::{RlResult, Vector3};
//!
//! let mut client = RpcClient::new(ClientConfig::local(9000))?;
//! client.method("translate").arg("translate", Vector3::new(0.0, 1.0, 0.0)).invoke()?;
//!
//! let mut session = client.blocking_listen()?;
//! let step: Option<RlResult> = session.method("rlStep").arg("actions", ["forward"]).invoke_as()?;
//! ```

pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod models;
pub mod rpc;
pub mod schema;

pub use codec::{DecodeError, EncodeError, FieldValue, Record};
pub use config::ClientConfig;
pub use rpc::{CallOutcome, RpcClient, RpcError};
pub use schema::{FieldKind, Schema};
