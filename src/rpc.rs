//! JSON-RPC client for a running simulation.
//!
//! This module is the controller-side boundary: a trainer or script drives
//! the simulation process by calling remote methods by name.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      HTTP POST /jsonrpc       ┌─────────────────────┐
//! │ trainer / script │  ◄─────────────────────────►  │  simulation process │
//! │   (RpcClient)    │   JSON-RPC 2.0, one at a time │                     │
//! └──────────────────┘                               └─────────────────────┘
//! ```
//!
//! - [`RpcClient`] builds envelopes, owns the retry policy and decodes results
//! - [`Transport`] performs one exchange; [`HttpTransport`] is the real one
//! - [`ServerProcess`] optionally launches the simulation and kills it on drop
//! - [`BlockingListenGuard`] keeps the simulation in blocking-listen mode for a scope
//!
//! # Usage
//!
//! ```ignore
//! use peaceful_pie::rpc::RpcClient;
//! use peaceful_pie::ClientConfig;
//!
//! let mut client = RpcClient::new(ClientConfig::local(9000))?;
//! let height = client.method("getHeight").invoke()?;
//! ```

mod client;
mod envelope;
mod listen;
mod supervisor;
mod transport;

pub use client::{CallOutcome, Caller, ClientOptions, RpcClient, RpcError};
pub use envelope::{Envelope, RemoteException, RpcErrorBody, RpcResponse, JSONRPC_VERSION};
pub use listen::{BlockingListenGuard, SET_BLOCKING_LISTEN};
pub use supervisor::ServerProcess;
pub use transport::{Endpoint, HttpTransport, Transport, TransportError, RPC_PATH};
